//! Tensor element types and the tensor descriptor table.
//!
//! The table holds only names, shapes, dtypes and offsets into the trailing
//! data region. Parsing it costs O(tensor_count) regardless of payload size.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::cursor::ByteCursor;
use crate::error::{ContainerError, Result};
use crate::value::encode_str;

/// Maximum number of dimensions a tensor may declare.
pub const MAX_DIMS: usize = 4;

// ---------------------------------------------------------------------------
// Tensor types
// ---------------------------------------------------------------------------

/// Tensor element storage type. Numeric values are the on-disk tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
#[repr(u32)]
pub enum TensorType {
    F32 = 0,
    F16 = 1,
    Q4_0 = 2,
    Q4_1 = 3,
    Q5_0 = 6,
    Q5_1 = 7,
    Q8_0 = 8,
    Q8_1 = 9,
    Q2_K = 10,
    Q3_K = 11,
    Q4_K = 12,
    Q5_K = 13,
    Q6_K = 14,
    Q8_K = 15,
    IQ2_XXS = 16,
    IQ2_XS = 17,
    IQ3_XXS = 18,
    IQ1_S = 19,
    IQ4_NL = 20,
    IQ3_S = 21,
    IQ2_S = 22,
    IQ4_XS = 23,
    I8 = 24,
    I16 = 25,
    I32 = 26,
    I64 = 27,
    F64 = 28,
    IQ1_M = 29,
    BF16 = 30,
    TQ1_0 = 34,
    TQ2_0 = 35,
}

impl TensorType {
    pub const ALL: [TensorType; 31] = [
        Self::F32,
        Self::F16,
        Self::Q4_0,
        Self::Q4_1,
        Self::Q5_0,
        Self::Q5_1,
        Self::Q8_0,
        Self::Q8_1,
        Self::Q2_K,
        Self::Q3_K,
        Self::Q4_K,
        Self::Q5_K,
        Self::Q6_K,
        Self::Q8_K,
        Self::IQ2_XXS,
        Self::IQ2_XS,
        Self::IQ3_XXS,
        Self::IQ1_S,
        Self::IQ4_NL,
        Self::IQ3_S,
        Self::IQ2_S,
        Self::IQ4_XS,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::F64,
        Self::IQ1_M,
        Self::BF16,
        Self::TQ1_0,
        Self::TQ2_0,
    ];

    pub fn from_u32(tag: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_u32() == tag)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Number of elements packed into one block (1 for plain types).
    pub const fn block_size(self) -> u64 {
        match self {
            Self::F32
            | Self::F16
            | Self::BF16
            | Self::F64
            | Self::I8
            | Self::I16
            | Self::I32
            | Self::I64 => 1,
            Self::Q4_0
            | Self::Q4_1
            | Self::Q5_0
            | Self::Q5_1
            | Self::Q8_0
            | Self::Q8_1
            | Self::IQ4_NL => 32,
            _ => 256,
        }
    }

    /// Bytes per block.
    pub const fn type_size(self) -> u64 {
        match self {
            Self::F32 => 4,
            Self::F16 => 2,
            Self::Q4_0 => 18,
            Self::Q4_1 => 20,
            Self::Q5_0 => 22,
            Self::Q5_1 => 24,
            Self::Q8_0 => 34,
            Self::Q8_1 => 36,
            Self::Q2_K => 84,
            Self::Q3_K => 110,
            Self::Q4_K => 144,
            Self::Q5_K => 176,
            Self::Q6_K => 210,
            Self::Q8_K => 292,
            Self::IQ2_XXS => 66,
            Self::IQ2_XS => 74,
            Self::IQ3_XXS => 98,
            Self::IQ1_S => 50,
            Self::IQ4_NL => 18,
            Self::IQ3_S => 110,
            Self::IQ2_S => 82,
            Self::IQ4_XS => 136,
            Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 => 4,
            Self::I64 => 8,
            Self::F64 => 8,
            Self::IQ1_M => 56,
            Self::BF16 => 2,
            Self::TQ1_0 => 54,
            Self::TQ2_0 => 66,
        }
    }

    pub const fn is_quantized(self) -> bool {
        self.block_size() > 1
    }

    /// Whether the innermost extent packs into whole blocks. Block-quantized
    /// types cannot describe a row that ends mid-block.
    pub fn is_row_aligned(self, shape: &[u64]) -> bool {
        shape.first().is_none_or(|&ne0| ne0 % self.block_size() == 0)
    }

    /// Bytes occupied by a tensor of this type and shape.
    ///
    /// An empty shape describes an empty tensor and takes zero bytes. Returns
    /// `None` if the shape has a zero extent, too many dimensions, a row that
    /// is not block-aligned, or a size that overflows `u64`.
    pub fn byte_len(self, shape: &[u64]) -> Option<u64> {
        check_shape(self, shape).ok()?;
        if shape.is_empty() {
            return Some(0);
        }
        let elements = shape.iter().try_fold(1u64, |acc, &d| acc.checked_mul(d))?;
        (elements / self.block_size()).checked_mul(self.type_size())
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "F32",
            Self::F16 => "F16",
            Self::Q4_0 => "Q4_0",
            Self::Q4_1 => "Q4_1",
            Self::Q5_0 => "Q5_0",
            Self::Q5_1 => "Q5_1",
            Self::Q8_0 => "Q8_0",
            Self::Q8_1 => "Q8_1",
            Self::Q2_K => "Q2_K",
            Self::Q3_K => "Q3_K",
            Self::Q4_K => "Q4_K",
            Self::Q5_K => "Q5_K",
            Self::Q6_K => "Q6_K",
            Self::Q8_K => "Q8_K",
            Self::IQ2_XXS => "IQ2_XXS",
            Self::IQ2_XS => "IQ2_XS",
            Self::IQ3_XXS => "IQ3_XXS",
            Self::IQ1_S => "IQ1_S",
            Self::IQ4_NL => "IQ4_NL",
            Self::IQ3_S => "IQ3_S",
            Self::IQ2_S => "IQ2_S",
            Self::IQ4_XS => "IQ4_XS",
            Self::I8 => "I8",
            Self::I16 => "I16",
            Self::I32 => "I32",
            Self::I64 => "I64",
            Self::F64 => "F64",
            Self::IQ1_M => "IQ1_M",
            Self::BF16 => "BF16",
            Self::TQ1_0 => "TQ1_0",
            Self::TQ2_0 => "TQ2_0",
        }
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TensorType {
    type Err = ContainerError;

    /// Case-insensitive. The `_M`/`_S` suffixes of k-quant file types map to
    /// their base tensor type.
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let base = match upper.as_str() {
            "Q4_K_M" | "Q4_K_S" => "Q4_K",
            "Q5_K_M" | "Q5_K_S" => "Q5_K",
            other => other,
        };
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == base)
            .ok_or_else(|| ContainerError::UnknownTensorTypeName(s.to_owned()))
    }
}

fn check_shape(ty: TensorType, shape: &[u64]) -> std::result::Result<(), String> {
    if shape.len() > MAX_DIMS {
        return Err(format!("{} dimensions exceeds maximum of {MAX_DIMS}", shape.len()));
    }
    if shape.contains(&0) {
        return Err("zero extent".to_owned());
    }
    if !ty.is_row_aligned(shape) {
        return Err(format!("first extent is not a multiple of the {ty} block size {}", ty.block_size()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tensor record
// ---------------------------------------------------------------------------

/// Descriptor for one tensor: everything except its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorRecord {
    name: String,
    shape: Vec<u64>,
    ty: TensorType,
    offset: u64,
    byte_len: u64,
}

impl TensorRecord {
    /// Validates the shape against the dtype and derives the byte length.
    pub fn new(name: impl Into<String>, shape: Vec<u64>, ty: TensorType, offset: u64) -> Result<Self> {
        let name = name.into();
        if let Err(reason) = check_shape(ty, &shape) {
            return Err(ContainerError::InvalidShape { name, shape, reason });
        }
        let byte_len = ty.byte_len(&shape).ok_or_else(|| ContainerError::InvalidShape {
            name: name.clone(),
            shape: shape.clone(),
            reason: "byte size overflows u64".to_owned(),
        })?;
        Ok(Self { name, shape, ty, offset, byte_len })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn n_dims(&self) -> u32 {
        self.shape.len() as u32
    }

    pub fn tensor_type(&self) -> TensorType {
        self.ty
    }

    /// Offset relative to the start of the tensor-data region.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    /// One past the last byte, relative to the data region.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.byte_len)
    }

    pub fn n_elements(&self) -> u64 {
        if self.shape.is_empty() { 0 } else { self.shape.iter().product() }
    }

    pub(crate) fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Appends `string name || u32 n_dims || u64 dims[n_dims] || u32 dtype || u64 offset`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        encode_str(&self.name, out);
        out.extend_from_slice(&self.n_dims().to_le_bytes());
        for d in &self.shape {
            out.extend_from_slice(&d.to_le_bytes());
        }
        out.extend_from_slice(&self.ty.as_u32().to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
    }

    pub fn decode(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let name = cur.read_string()?;
        let dims_at = cur.position();
        let n_dims = cur.read_u32()?;
        if n_dims as usize > MAX_DIMS {
            return Err(ContainerError::malformed(
                dims_at,
                format!("tensor `{name}` declares {n_dims} dimensions (max {MAX_DIMS})"),
            ));
        }
        let shape = (0..n_dims).map(|_| cur.read_u64()).collect::<Result<Vec<_>>>()?;
        let tag = cur.read_u32()?;
        let ty = TensorType::from_u32(tag)
            .ok_or_else(|| ContainerError::UnknownTensorType { tag, name: name.clone() })?;
        let offset = cur.read_u64()?;
        Self::new(name, shape, ty, offset)
    }
}

// ---------------------------------------------------------------------------
// Tensor table
// ---------------------------------------------------------------------------

/// Ordered tensor descriptors with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorTable {
    records: Vec<TensorRecord>,
    index: HashMap<String, usize>,
}

impl TensorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: TensorRecord) -> Result<()> {
        if self.index.contains_key(record.name()) {
            return Err(ContainerError::DuplicateTensorName(record.name));
        }
        self.index.insert(record.name.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&TensorRecord> {
        self.index
            .get(name)
            .map(|&i| &self.records[i])
            .ok_or_else(|| ContainerError::TensorNotFound(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TensorRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn records_mut(&mut self) -> std::slice::IterMut<'_, TensorRecord> {
        self.records.iter_mut()
    }

    /// Size of the data region the table addresses (largest end offset).
    pub fn data_len(&self) -> u64 {
        self.records.iter().map(TensorRecord::end).max().unwrap_or(0)
    }

    /// Checks that every offset is a multiple of `alignment` and that no two
    /// non-empty byte ranges overlap.
    pub fn validate_layout(&self, alignment: u64) -> Result<()> {
        for r in &self.records {
            if r.offset % alignment != 0 {
                return Err(ContainerError::MisalignedTensor {
                    name: r.name.clone(),
                    offset: r.offset,
                    alignment,
                });
            }
        }
        let mut by_offset: Vec<&TensorRecord> =
            self.records.iter().filter(|r| r.byte_len > 0).collect();
        by_offset.sort_by_key(|r| r.offset);
        for pair in by_offset.windows(2) {
            if pair[0].end() > pair[1].offset {
                return Err(ContainerError::OverlappingTensors {
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn decode(cur: &mut ByteCursor<'_>, count: u64) -> Result<Self> {
        let mut table = Self::new();
        for _ in 0..count {
            let at = cur.position();
            let record = TensorRecord::decode(cur)?;
            tracing::trace!(
                name = record.name(),
                ty = %record.tensor_type(),
                shape = ?record.shape(),
                offset = record.offset(),
                "tensor descriptor"
            );
            if table.contains(record.name()) {
                return Err(ContainerError::malformed(at, format!("duplicate tensor name `{}`", record.name())));
            }
            table.add(record)?;
        }
        Ok(table)
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        for r in &self.records {
            r.encode_into(out);
        }
    }
}

impl<'a> IntoIterator for &'a TensorTable {
    type Item = &'a TensorRecord;
    type IntoIter = std::slice::Iter<'a, TensorRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
