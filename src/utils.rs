//! Utility functions for stride bookkeeping and byte order.

/// Strides (in samples) of a dense array stored with the first axis
/// varying fastest: axis 0 has stride 1, each subsequent axis the product
/// of all prior sizes.
pub fn dense_strides(sizes: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(sizes.len());
    let mut stride = 1;
    for &size in sizes {
        strides.push(stride);
        stride *= size;
    }
    strides
}

/// Indices that sort `values` ascending. Equal values keep their order.
pub fn sorted_indices<T: Ord>(values: &[T]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|&a, &b| values[a].cmp(&values[b]));
    indices
}

/// Reorders `values` so that element `ii` of the result is `values[order[ii]]`.
pub fn permute<T: Clone>(values: &[T], order: &[usize]) -> Vec<T> {
    order.iter().map(|&ii| values[ii].clone()).collect()
}

/// Returns true if the host system is little-endian.
#[inline]
pub const fn is_little_endian() -> bool {
    cfg!(target_endian = "little")
}

/// Swaps byte order of multi-byte elements in place.
pub fn swap_endianness_in_place(buffer: &mut [u8], element_size: usize) {
    if element_size <= 1 {
        return;
    }
    for chunk in buffer.chunks_exact_mut(element_size) {
        chunk.reverse();
    }
}
