#![no_main]
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    if let Ok((header, _)) = icsio::container::IcsHeader::parse(&mut Cursor::new(data)) {
        let _ = header.data_size();
        let _ = header.to_text();
    }
});
