//! Property-based tests for the container layout and value codec.
//!
//! Covers:
//!   - Arbitrary metadata values surviving write then read byte-exactly
//!   - Tensor offsets being aligned and pairwise disjoint for any alignment
//!   - Tensor payloads coming back unchanged, in insertion order
//!   - The reader never panicking on mutated containers

use gguf_container::{ContainerReader, TensorType, Value, align_up, new_writer};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn scalar_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<u8>().prop_map(Value::U8),
        any::<i8>().prop_map(Value::I8),
        any::<u16>().prop_map(Value::U16),
        any::<i16>().prop_map(Value::I16),
        any::<u32>().prop_map(Value::U32),
        any::<i32>().prop_map(Value::I32),
        any::<f32>().prop_map(Value::F32),
        any::<bool>().prop_map(Value::Bool),
        "[a-z0-9 ._-]{0,24}".prop_map(Value::String),
        any::<u64>().prop_map(Value::U64),
        any::<i64>().prop_map(Value::I64),
        any::<f64>().prop_map(Value::F64),
    ]
}

fn any_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => scalar_value(),
        1 => prop::collection::vec(any::<i32>(), 0..16).prop_map(|v| {
            let items = v.into_iter().map(Value::I32).collect();
            Value::Array(gguf_container::Array::new(gguf_container::ValueType::Int32, items).unwrap())
        }),
        1 => prop::collection::vec("[a-z]{0,8}", 0..8).prop_map(Value::string_array),
    ]
}

fn tensor_type() -> impl Strategy<Value = TensorType> {
    prop_oneof![Just(TensorType::F32), Just(TensorType::F16), Just(TensorType::I8), Just(TensorType::Q8_0)]
}

/// (elements in the first extent, second extent, dtype, fill byte)
fn tensor_case() -> impl Strategy<Value = (u64, u64, TensorType, u8)> {
    (1u64..40, 1u64..4, tensor_type(), any::<u8>())
}

fn alignment() -> impl Strategy<Value = u64> {
    prop_oneof![Just(1u64), Just(8), Just(32), Just(64), Just(256)]
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    /// Every metadata value reads back with the same type and encoding.
    #[test]
    fn prop_metadata_values_survive(values in prop::collection::vec(any_value(), 0..12)) {
        let mut w = new_writer("unused.gguf", "prop");
        for (i, v) in values.iter().enumerate() {
            w.add_key_value(format!("k.{i}"), v.clone()).unwrap();
        }
        let r = ContainerReader::from_bytes(w.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(r.metadata().len(), values.len() + 1);
        for (i, v) in values.iter().enumerate() {
            let got = r.metadata().get(&format!("k.{i}")).unwrap();
            prop_assert_eq!(got.value_type(), v.value_type());
            prop_assert_eq!(got.encode(), v.encode());
        }
    }

    /// Offsets are multiples of the alignment, ranges never overlap and
    /// payloads come back unchanged.
    #[test]
    fn prop_tensor_layout(cases in prop::collection::vec(tensor_case(), 0..10), align in alignment()) {
        let mut w = new_writer("unused.gguf", "prop");
        w.add_key_value("general.alignment", align).unwrap();

        let mut payloads = Vec::new();
        for (i, &(ne0, ne1, ty, fill)) in cases.iter().enumerate() {
            let ne0 = ne0 * ty.block_size();
            let shape = vec![ne0, ne1];
            let len = ty.byte_len(&shape).unwrap() as usize;
            payloads.push(vec![fill; len]);
            w.add_tensor(format!("t{i}"), payloads[i].clone(), shape, ty).unwrap();
        }

        let bytes = w.to_bytes().unwrap();
        let r = ContainerReader::from_bytes(bytes).unwrap();
        prop_assert_eq!(r.data_start() % align, 0);

        let mut prev_end = 0u64;
        for (i, t) in r.tensors().iter().enumerate() {
            prop_assert_eq!(t.name(), format!("t{i}"));
            prop_assert_eq!(t.offset() % align, 0);
            prop_assert!(t.offset() >= prev_end);
            prop_assert_eq!(t.offset(), align_up(prev_end, align));
            prev_end = t.end();
            prop_assert_eq!(r.read_tensor_bytes(t).unwrap(), &payloads[i][..]);
        }
    }

    /// Flipping any single byte of a valid container never panics the reader.
    #[test]
    fn prop_mutated_container_never_panics(pos in any::<prop::sample::Index>(), byte in any::<u8>()) {
        let mut w = new_writer("unused.gguf", "fuzz");
        w.add_key_value("fuzz.tokens", Value::string_array(["a", "bb", "ccc"])).unwrap();
        w.add_key_value("fuzz.n", 3u32).unwrap();
        w.add_tensor("t", vec![7u8; 16], vec![4], TensorType::F32).unwrap();
        let mut bytes = w.to_bytes().unwrap();
        let i = pos.index(bytes.len());
        bytes[i] = byte;

        if let Ok(r) = ContainerReader::from_bytes(bytes) {
            for t in r.tensors() {
                let _ = r.read_tensor_bytes(t);
            }
        }
    }

    /// Truncating a valid container anywhere fails cleanly or defers the
    /// failure to the tensor read.
    #[test]
    fn prop_truncation_is_reported(cut in 0usize..160) {
        let mut w = new_writer("unused.gguf", "cut");
        w.add_tensor("t", vec![1u8; 32], vec![8], TensorType::F32).unwrap();
        let mut bytes = w.to_bytes().unwrap();
        let full = bytes.len();
        bytes.truncate(cut.min(full));

        match ContainerReader::from_bytes(bytes) {
            Ok(r) => {
                let res = r.tensor_bytes("t");
                prop_assert_eq!(res.is_ok(), cut >= full);
            }
            Err(e) => prop_assert!(e.category() == gguf_container::ErrorCategory::Format),
        }
    }
}
