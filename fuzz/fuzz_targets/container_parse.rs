#![no_main]

use gguf_container::{ContainerReader, ReaderConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Tight limits keep hostile counts from turning into long loops.
    let config = ReaderConfig {
        max_string_len: 1 << 16,
        max_array_len: 1 << 16,
        max_kv_count: 1 << 12,
        max_tensor_count: 1 << 12,
        ..ReaderConfig::default()
    };

    // Parsing must never panic; errors are fine.
    if let Ok(reader) = ContainerReader::from_bytes_with(data.to_vec(), config) {
        let _ = reader.metadata().architecture();
        let _ = reader.metadata().alignment();
        for entry in reader.metadata() {
            let _ = entry.value.encode();
        }
        for record in reader.tensors() {
            if let Ok(bytes) = reader.read_tensor_bytes(record) {
                assert_eq!(bytes.len() as u64, record.byte_len());
            }
        }
    }
});
