#![no_main]

use gguf_container::{check_magic, parse_header};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let has_magic = check_magic(data);
    if let Ok(header) = parse_header(data) {
        assert!(has_magic);
        // A parsed header re-encodes to the bytes it came from.
        assert_eq!(&header.encode()[..], &data[..24]);
    }
});
