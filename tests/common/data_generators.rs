pub fn make_f64_data(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64 * 0.1).collect()
}
pub fn make_f32_data(n: usize) -> Vec<f32> {
    (0..n).map(|i| i as f32 * 0.1).collect()
}
pub fn make_i32_data(n: usize) -> Vec<i32> {
    (0..n).map(|i| i as i32 - (n / 2) as i32).collect()
}
pub fn make_i16_data(n: usize) -> Vec<i16> {
    (0..n).map(|i| (i as i16).wrapping_mul(7)).collect()
}
pub fn make_i8_data(n: usize) -> Vec<i8> {
    (0..n).map(|i| (i % 128) as i8).collect()
}
pub fn make_u32_data(n: usize) -> Vec<u32> {
    (0..n).map(|i| i as u32 * 5).collect()
}
pub fn make_u16_data(n: usize) -> Vec<u16> {
    (0..n).map(|i| (i as u16).wrapping_mul(7)).collect()
}
pub fn make_u8_data(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 256) as u8).collect()
}
pub fn make_bin_data(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 3 == 0) as u8).collect()
}
pub fn make_scomplex_data(n: usize) -> Vec<[f32; 2]> {
    (0..n).map(|i| [i as f32, -(i as f32) * 0.5]).collect()
}
pub fn make_dcomplex_data(n: usize) -> Vec<[f64; 2]> {
    (0..n).map(|i| [i as f64 * 0.25, i as f64]).collect()
}

/// A 2-D `u16` plane whose value encodes its coordinates: `x + 100 * y`.
pub fn make_coordinate_plane(width: usize, height: usize) -> Vec<u16> {
    (0..height)
        .flat_map(|y| (0..width).map(move |x| (x + 100 * y) as u16))
        .collect()
}
