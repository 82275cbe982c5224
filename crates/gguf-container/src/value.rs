//! Metadata value types and their on-disk codec.
//!
//! Scalars are fixed-width little-endian in their declared width. Strings are
//! `u64 byte_len || utf8`, no terminator. Arrays are
//! `u32 element_type || u64 count || elements`, where each element is encoded
//! without its own tag. Arrays never nest. The `u32` element tag is the
//! width other GGUF readers and writers use.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cursor::ByteCursor;
use crate::error::{ContainerError, Result};

// ---------------------------------------------------------------------------
// Value-type discriminant
// ---------------------------------------------------------------------------

/// Discriminant tag for metadata values. Numeric values are the on-disk tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ValueType {
    Uint8 = 0,
    Int8 = 1,
    Uint16 = 2,
    Int16 = 3,
    Uint32 = 4,
    Int32 = 5,
    Float32 = 6,
    Bool = 7,
    String = 8,
    Array = 9,
    Uint64 = 10,
    Int64 = 11,
    Float64 = 12,
}

impl ValueType {
    /// Convert from the raw u32 discriminant in the file.
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Uint8),
            1 => Some(Self::Int8),
            2 => Some(Self::Uint16),
            3 => Some(Self::Int16),
            4 => Some(Self::Uint32),
            5 => Some(Self::Int32),
            6 => Some(Self::Float32),
            7 => Some(Self::Bool),
            8 => Some(Self::String),
            9 => Some(Self::Array),
            10 => Some(Self::Uint64),
            11 => Some(Self::Int64),
            12 => Some(Self::Float64),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Encoded width of a scalar, `None` for strings and arrays.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Uint8 | Self::Int8 | Self::Bool => Some(1),
            Self::Uint16 | Self::Int16 => Some(2),
            Self::Uint32 | Self::Int32 | Self::Float32 => Some(4),
            Self::Uint64 | Self::Int64 | Self::Float64 => Some(8),
            Self::String | Self::Array => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Uint8 => "UINT8",
            Self::Int8 => "INT8",
            Self::Uint16 => "UINT16",
            Self::Int16 => "INT16",
            Self::Uint32 => "UINT32",
            Self::Int32 => "INT32",
            Self::Float32 => "FLOAT32",
            Self::Bool => "BOOL",
            Self::String => "STRING",
            Self::Array => "ARRAY",
            Self::Uint64 => "UINT64",
            Self::Int64 => "INT64",
            Self::Float64 => "FLOAT64",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Array
// ---------------------------------------------------------------------------

/// Homogeneous, non-nested array of values.
///
/// The element type is stored separately so that empty arrays keep it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ArrayRepr", into = "ArrayRepr")]
pub struct Array {
    elem_type: ValueType,
    items: Vec<Value>,
}

#[derive(Serialize, Deserialize)]
struct ArrayRepr {
    elem_type: ValueType,
    items: Vec<Value>,
}

impl TryFrom<ArrayRepr> for Array {
    type Error = ContainerError;

    fn try_from(repr: ArrayRepr) -> Result<Self> {
        Array::new(repr.elem_type, repr.items)
    }
}

impl From<Array> for ArrayRepr {
    fn from(a: Array) -> Self {
        Self { elem_type: a.elem_type, items: a.items }
    }
}

impl Array {
    /// Builds an array, checking that every item has type `elem_type` and
    /// that `elem_type` is not itself an array.
    pub fn new(elem_type: ValueType, items: Vec<Value>) -> Result<Self> {
        if elem_type == ValueType::Array {
            return Err(ContainerError::MixedArray("ARRAY (nested arrays are not allowed)"));
        }
        if items.iter().any(|v| v.value_type() != elem_type) {
            return Err(ContainerError::MixedArray(elem_type.name()));
        }
        Ok(Self { elem_type, items })
    }

    pub fn elem_type(&self) -> ValueType {
        self.elem_type
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A typed metadata payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
    Bool(bool),
    String(String),
    Array(Array),
    U64(u64),
    I64(i64),
    F64(f64),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::U8(_) => ValueType::Uint8,
            Self::I8(_) => ValueType::Int8,
            Self::U16(_) => ValueType::Uint16,
            Self::I16(_) => ValueType::Int16,
            Self::U32(_) => ValueType::Uint32,
            Self::I32(_) => ValueType::Int32,
            Self::F32(_) => ValueType::Float32,
            Self::Bool(_) => ValueType::Bool,
            Self::String(_) => ValueType::String,
            Self::Array(_) => ValueType::Array,
            Self::U64(_) => ValueType::Uint64,
            Self::I64(_) => ValueType::Int64,
            Self::F64(_) => ValueType::Float64,
        }
    }

    /// Array of strings, the shape used for token vocabularies.
    pub fn string_array<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items.into_iter().map(|s| Self::String(s.into())).collect();
        Self::Array(Array { elem_type: ValueType::String, items })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any unsigned integer, widened. Signed values are accepted when
    /// non-negative.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::U8(v) => Some(v.into()),
            Self::U16(v) => Some(v.into()),
            Self::U32(v) => Some(v.into()),
            Self::U64(v) => Some(v),
            Self::I8(v) => u64::try_from(v).ok(),
            Self::I16(v) => u64::try_from(v).ok(),
            Self::I32(v) => u64::try_from(v).ok(),
            Self::I64(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(v.into()),
            Self::I16(v) => Some(v.into()),
            Self::I32(v) => Some(v.into()),
            Self::I64(v) => Some(v),
            Self::U8(v) => Some(v.into()),
            Self::U16(v) => Some(v.into()),
            Self::U32(v) => Some(v.into()),
            Self::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(v) => Some(v.into()),
            Self::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Number of bytes [`encode`](Self::encode) produces.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::String(s) => 8 + s.len(),
            Self::Array(a) => 4 + 8 + a.items.iter().map(Value::encoded_len).sum::<usize>(),
            other => other.value_type().fixed_size().unwrap_or(0),
        }
    }

    /// Canonical payload bytes, without the leading type tag.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::U8(v) => out.push(*v),
            Self::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Bool(v) => out.push(u8::from(*v)),
            Self::String(s) => encode_str(s, out),
            Self::Array(a) => {
                out.extend_from_slice(&a.elem_type.as_u32().to_le_bytes());
                out.extend_from_slice(&(a.items.len() as u64).to_le_bytes());
                for item in &a.items {
                    item.encode_into(out);
                }
            }
            Self::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    /// Decodes one payload of type `ty`, advancing `cur` exactly past it.
    ///
    /// On failure the cursor is left where the value started.
    pub fn decode(cur: &mut ByteCursor<'_>, ty: ValueType) -> Result<Self> {
        let start = cur.position();
        let mut probe = cur.clone();
        let value = decode_payload(&mut probe, ty)?;
        debug_assert!(probe.position() >= start);
        *cur = probe;
        Ok(value)
    }
}

/// Writes `u64 len || bytes`.
pub(crate) fn encode_str(s: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(&(s.len() as u64).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn decode_scalar(cur: &mut ByteCursor<'_>, ty: ValueType) -> Result<Value> {
    Ok(match ty {
        ValueType::Uint8 => Value::U8(cur.read_u8()?),
        ValueType::Int8 => Value::I8(cur.read_i8()?),
        ValueType::Uint16 => Value::U16(cur.read_u16()?),
        ValueType::Int16 => Value::I16(cur.read_i16()?),
        ValueType::Uint32 => Value::U32(cur.read_u32()?),
        ValueType::Int32 => Value::I32(cur.read_i32()?),
        ValueType::Float32 => Value::F32(cur.read_f32()?),
        ValueType::Bool => Value::Bool(cur.read_bool()?),
        ValueType::String => Value::String(cur.read_string()?),
        ValueType::Uint64 => Value::U64(cur.read_u64()?),
        ValueType::Int64 => Value::I64(cur.read_i64()?),
        ValueType::Float64 => Value::F64(cur.read_f64()?),
        ValueType::Array => {
            return Err(ContainerError::malformed(cur.position(), "nested arrays are not allowed"));
        }
    })
}

fn decode_payload(cur: &mut ByteCursor<'_>, ty: ValueType) -> Result<Value> {
    if ty != ValueType::Array {
        return decode_scalar(cur, ty);
    }

    let tag_at = cur.position();
    let raw = cur.read_u32()?;
    let elem_type = ValueType::from_u32(raw)
        .ok_or(ContainerError::UnknownValueType { tag: raw, offset: tag_at as u64 })?;
    if elem_type == ValueType::Array {
        return Err(ContainerError::malformed(tag_at, "nested arrays are not allowed"));
    }

    let count_at = cur.position();
    let count = cur.read_u64()?;
    if count > cur.max_array_len() {
        return Err(ContainerError::malformed(
            count_at,
            format!("array length {count} exceeds limit {}", cur.max_array_len()),
        ));
    }
    // Every element needs at least its fixed width (8 for a string length),
    // so a count that cannot fit in the remaining bytes is rejected before
    // allocating.
    let min_elem = elem_type.fixed_size().unwrap_or(8) as u64;
    if count.saturating_mul(min_elem) > cur.remaining() as u64 {
        return Err(ContainerError::malformed(
            count_at,
            format!(
                "array of {count} {elem_type} elements runs past end of data ({} bytes left)",
                cur.remaining()
            ),
        ));
    }

    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        items.push(decode_scalar(cur, elem_type)?);
    }
    Ok(Value::Array(Array { elem_type, items }))
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

macro_rules! impl_from_scalar {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    u8 => U8, i8 => I8, u16 => U16, i16 => I16, u32 => U32, i32 => I32,
    f32 => F32, bool => Bool, u64 => U64, i64 => I64, f64 => F64,
    String => String, Array => Array,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Array(a) => write!(f, "[{}; {}]", a.elem_type, a.len()),
            Self::U64(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
