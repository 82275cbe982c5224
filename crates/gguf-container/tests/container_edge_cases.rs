//! Edge-case tests for parsing malformed or unusual containers.
//!
//! Tests cover:
//! - Header failures (bad magic, versions, truncation right after the header)
//! - Metadata failures (unknown tags, bad bools, nested arrays, reserved keys)
//! - Descriptor failures (unknown dtypes, too many dims, bad layouts)
//! - Tensor data truncation detected lazily
//! - Empty tensors and configuration parsing

use gguf_container::{
    ContainerError, ContainerReader, ErrorCategory, ReaderConfig, TensorType, WriterConfig, align_up,
    new_writer,
};

// ---------------------------------------------------------------------------
// Byte builders
// ---------------------------------------------------------------------------

struct Builder {
    buf: Vec<u8>,
}

impl Builder {
    fn new(version: u32, tensor_count: u64, kv_count: u64) -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"GGUF");
        buf.extend_from_slice(&version.to_le_bytes());
        buf.extend_from_slice(&tensor_count.to_le_bytes());
        buf.extend_from_slice(&kv_count.to_le_bytes());
        Self { buf }
    }

    fn string(mut self, s: &str) -> Self {
        self.buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn bytes(mut self, b: &[u8]) -> Self {
        self.buf.extend_from_slice(b);
        self
    }

    /// `general.architecture = arch` as a STRING entry.
    fn arch(self, arch: &str) -> Self {
        self.string("general.architecture").u32(8).string(arch)
    }

    fn tensor(self, name: &str, shape: &[u64], dtype: u32, offset: u64) -> Self {
        let mut b = self.string(name).u32(shape.len() as u32);
        for &d in shape {
            b = b.u64(d);
        }
        b.u32(dtype).u64(offset)
    }

    fn pad_to(mut self, align: u64) -> Self {
        let len = align_up(self.buf.len() as u64, align) as usize;
        self.buf.resize(len, 0);
        self
    }

    fn parse(self) -> Result<ContainerReader, ContainerError> {
        ContainerReader::from_bytes(self.buf)
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[test]
fn empty_input_is_not_a_container() {
    let err = ContainerReader::from_bytes(Vec::new()).unwrap_err();
    assert!(matches!(err, ContainerError::NotAContainer(_)));
    assert_eq!(err.category(), ErrorCategory::Format);
}

#[test]
fn ggml_magic_is_rejected() {
    let mut data = Builder::new(3, 0, 0).buf;
    data[..4].copy_from_slice(b"GGML");
    let err = ContainerReader::from_bytes(data).unwrap_err();
    assert!(matches!(err, ContainerError::NotAContainer(m) if &m == b"GGML"));
}

#[test]
fn version_one_is_rejected() {
    let err = Builder::new(1, 0, 0).parse().unwrap_err();
    assert!(matches!(err, ContainerError::UnsupportedVersion(1)));
}

#[test]
fn version_two_is_accepted() {
    let r = Builder::new(2, 0, 1).arch("old").pad_to(32).parse().unwrap();
    assert_eq!(r.version(), 2);
}

#[test]
fn truncated_after_header_is_malformed() {
    let err = Builder::new(3, 1, 1).parse().unwrap_err();
    assert!(matches!(err, ContainerError::MalformedValue { offset: 24, .. }), "{err}");
}

#[test]
fn header_only_with_zero_counts_parses() {
    let r = Builder::new(3, 0, 0).parse().unwrap();
    assert!(r.metadata().is_empty());
    assert!(r.tensors().is_empty());
    assert_eq!(r.data_start(), 32);
}

#[test]
fn tensor_count_limit_is_enforced() {
    let data = Builder::new(3, 10, 0).buf;
    let cfg = ReaderConfig { max_tensor_count: 4, ..ReaderConfig::default() };
    let err = ContainerReader::from_bytes_with(data, cfg).unwrap_err();
    assert!(matches!(err, ContainerError::LimitExceeded { what: "tensor", count: 10, limit: 4 }));
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[test]
fn unknown_value_tag_reports_offset() {
    let b = Builder::new(3, 0, 1).string("k");
    let tag_offset = b.buf.len() as u64;
    let err = b.u32(13).u32(0).parse().unwrap_err();
    assert!(matches!(err, ContainerError::UnknownValueType { tag: 13, offset } if offset == tag_offset));
}

#[test]
fn bool_other_than_zero_or_one_is_malformed() {
    let err = Builder::new(3, 0, 1).string("b").u32(7).bytes(&[2]).parse().unwrap_err();
    assert!(matches!(err, ContainerError::MalformedValue { .. }));
}

#[test]
fn nested_array_is_malformed() {
    let err = Builder::new(3, 0, 1).string("a").u32(9).u32(9).u64(0).parse().unwrap_err();
    assert!(matches!(err, ContainerError::MalformedValue { .. }));
}

#[test]
fn array_count_past_end_is_malformed() {
    let err = Builder::new(3, 0, 1).string("a").u32(9).u32(4).u64(1_000_000).u32(1).parse().unwrap_err();
    assert!(matches!(err, ContainerError::MalformedValue { .. }));
}

#[test]
fn empty_array_keeps_element_type() {
    let r = Builder::new(3, 0, 1).string("a").u32(9).u32(6).u64(0).pad_to(32).parse().unwrap();
    let arr = r.metadata().get("a").unwrap().as_array().unwrap();
    assert!(arr.is_empty());
    assert_eq!(arr.elem_type(), gguf_container::ValueType::Float32);
}

#[test]
fn invalid_utf8_key_is_malformed() {
    let err = Builder::new(3, 0, 1).u64(2).bytes(&[0xff, 0xfe]).u32(4).u32(1).parse().unwrap_err();
    assert!(matches!(err, ContainerError::MalformedValue { .. }));
}

#[test]
fn oversized_string_is_malformed() {
    let data = Builder::new(3, 0, 1).u64(1 << 40).buf;
    let err = ContainerReader::from_bytes(data).unwrap_err();
    assert!(matches!(err, ContainerError::MalformedValue { offset: 24, .. }));
}

#[test]
fn header_pseudo_key_in_file_is_malformed() {
    let err = Builder::new(3, 0, 1).string("GGUF.kv_count").u32(10).u64(1).parse().unwrap_err();
    assert!(matches!(err, ContainerError::MalformedValue { .. }));
}

#[test]
fn duplicate_key_in_file_is_malformed() {
    let err = Builder::new(3, 0, 2).arch("a").arch("b").parse().unwrap_err();
    assert!(matches!(err, ContainerError::MalformedValue { .. }));
}

#[test]
fn non_power_of_two_alignment_in_file() {
    let err = Builder::new(3, 0, 2).arch("a").string("general.alignment").u32(4).u32(24).parse().unwrap_err();
    assert!(matches!(err, ContainerError::InvalidAlignment(24)));
}

// ---------------------------------------------------------------------------
// Tensor descriptors
// ---------------------------------------------------------------------------

#[test]
fn unknown_tensor_dtype() {
    let err = Builder::new(3, 1, 1).arch("a").tensor("w", &[4], 31, 0).parse().unwrap_err();
    assert!(matches!(err, ContainerError::UnknownTensorType { tag: 31, ref name } if name == "w"));
}

#[test]
fn five_dimensions_are_rejected() {
    let err = Builder::new(3, 1, 1).arch("a").tensor("w", &[1, 1, 1, 1, 1], 0, 0).parse().unwrap_err();
    assert!(matches!(err, ContainerError::MalformedValue { .. }));
}

#[test]
fn zero_extent_is_invalid_shape() {
    let err = Builder::new(3, 1, 1).arch("a").tensor("w", &[4, 0], 0, 0).parse().unwrap_err();
    assert!(matches!(err, ContainerError::InvalidShape { .. }));
}

#[test]
fn quantized_row_must_fill_blocks() {
    let err = Builder::new(3, 1, 1).arch("a").tensor("q", &[48], 8, 0).parse().unwrap_err();
    assert!(matches!(err, ContainerError::InvalidShape { .. }));
}

#[test]
fn misaligned_offset_is_rejected() {
    let err = Builder::new(3, 1, 1).arch("a").tensor("w", &[4], 0, 8).parse().unwrap_err();
    assert!(matches!(err, ContainerError::MisalignedTensor { offset: 8, alignment: 32, .. }));
}

#[test]
fn overlapping_tensors_are_rejected() {
    let err = Builder::new(3, 2, 1)
        .arch("a")
        .tensor("a", &[16], 0, 0)
        .tensor("b", &[4], 0, 32)
        .parse()
        .unwrap_err();
    assert!(matches!(err, ContainerError::OverlappingTensors { .. }));
}

#[test]
fn duplicate_tensor_name_in_file() {
    let err = Builder::new(3, 2, 1)
        .arch("a")
        .tensor("w", &[4], 0, 0)
        .tensor("w", &[4], 0, 32)
        .parse()
        .unwrap_err();
    assert!(matches!(err, ContainerError::MalformedValue { .. }));
}

// ---------------------------------------------------------------------------
// Tensor data
// ---------------------------------------------------------------------------

#[test]
fn missing_payload_is_detected_on_read() {
    let r = Builder::new(3, 1, 1).arch("a").tensor("w", &[4], 0, 0).pad_to(32).bytes(&[0; 10]).parse().unwrap();
    let err = r.tensor_bytes("w").unwrap_err();
    match err {
        ContainerError::TruncatedTensorData { name, offset, expected, available } => {
            assert_eq!(name, "w");
            assert_eq!(offset, r.data_start());
            assert_eq!(expected, 16);
            assert_eq!(available, 10);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn empty_tensor_has_no_bytes() {
    let mut w = new_writer("unused.gguf", "e");
    w.add_tensor("empty", Vec::<u8>::new(), vec![], TensorType::F32).unwrap();
    w.add_tensor("next", vec![0u8; 4], vec![1], TensorType::F32).unwrap();
    let r = ContainerReader::from_bytes(w.to_bytes().unwrap()).unwrap();
    let empty = r.tensors().lookup("empty").unwrap();
    assert_eq!(empty.n_dims(), 0);
    assert_eq!(empty.byte_len(), 0);
    assert!(r.read_tensor_bytes(empty).unwrap().is_empty());
    assert_eq!(r.tensors().lookup("next").unwrap().offset(), 0);
}

#[test]
fn lookup_of_missing_tensor_is_usage_error() {
    let r = Builder::new(3, 0, 1).arch("a").pad_to(32).parse().unwrap();
    let err = r.tensor_bytes("nope").unwrap_err();
    assert!(matches!(err, ContainerError::TensorNotFound(_)));
    assert_eq!(err.category(), ErrorCategory::Usage);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn configs_deserialize_with_defaults() {
    let r: ReaderConfig = serde_json::from_str(r#"{ "use_mmap": false }"#).unwrap();
    assert!(!r.use_mmap);
    assert_eq!(r.max_array_len, ReaderConfig::default().max_array_len);

    let w: WriterConfig = serde_json::from_str(r#"{ "alignment": 64 }"#).unwrap();
    assert_eq!(w.alignment, 64);
    assert_eq!(w.version, 3);
}
