#![no_main]
use libfuzzer_sys::fuzz_target;
use std::io::Write;
use icsio::{IcsCodec, Range, ReadOptions};

fuzz_target!(|data: &[u8]| {
    let mut tmp = tempfile::Builder::new()
        .suffix(".ics")
        .tempfile()
        .unwrap();
    tmp.write_all(data).unwrap();

    let codec = IcsCodec::default();
    let info = match codec.read_info(tmp.path()) {
        Ok(info) => info,
        Err(_) => return,
    };
    // keep allocations bounded
    let samples = info
        .sizes
        .iter()
        .fold(info.tensor_elements, |acc, &s| acc.saturating_mul(s));
    if samples > 1 << 20 {
        return;
    }

    let _ = codec.read(tmp.path(), ReadOptions { fast: true });
    let mut image = icsio::Image::default();
    let _ = codec.read_into(&mut image, tmp.path(), &[Range::new(-1, 0, 2)], None, ReadOptions::default());
});
