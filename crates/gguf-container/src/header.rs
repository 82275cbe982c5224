//! The fixed 24-byte container header.

use serde::{Deserialize, Serialize};

use crate::cursor::ByteCursor;
use crate::error::{ContainerError, Result};
use crate::{GGUF_MAGIC, GGUF_VERSION_MAX, GGUF_VERSION_MIN};

/// Size of the header in bytes: magic + version + two counts.
pub const HEADER_LEN: usize = 24;

/// Parsed container header.
///
/// The counts are owned by the header, never by the metadata store. Writers
/// derive them from the final table sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub version: u32,
    pub tensor_count: u64,
    pub kv_count: u64,
}

impl ContainerHeader {
    pub fn decode(cur: &mut ByteCursor<'_>) -> Result<Self> {
        if cur.remaining() < 4 {
            let mut magic = [0u8; 4];
            let got = cur.take(cur.remaining())?;
            magic[..got.len()].copy_from_slice(got);
            return Err(ContainerError::NotAContainer(magic));
        }
        let magic: [u8; 4] = cur.take(4)?.try_into().map_err(|_| ContainerError::malformed(0, "magic"))?;
        if magic != GGUF_MAGIC {
            return Err(ContainerError::NotAContainer(magic));
        }
        let version = cur.read_u32()?;
        if !(GGUF_VERSION_MIN..=GGUF_VERSION_MAX).contains(&version) {
            return Err(ContainerError::UnsupportedVersion(version));
        }
        let tensor_count = cur.read_u64()?;
        let kv_count = cur.read_u64()?;
        Ok(Self { version, tensor_count, kv_count })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&GGUF_MAGIC);
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..16].copy_from_slice(&self.tensor_count.to_le_bytes());
        out[16..24].copy_from_slice(&self.kv_count.to_le_bytes());
        out
    }
}

/// Returns `true` if `data` starts with the GGUF magic bytes.
#[inline]
pub fn check_magic(data: &[u8]) -> bool {
    data.get(0..4) == Some(&GGUF_MAGIC[..])
}

/// Parse only the header from the start of `data`.
pub fn parse_header(data: &[u8]) -> Result<ContainerHeader> {
    ContainerHeader::decode(&mut ByteCursor::new(data))
}
