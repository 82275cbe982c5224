//! Reader and writer configuration.

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_ALIGNMENT, GGUF_VERSION_WRITE};

/// Options controlling how a container is opened and how far parsing trusts
/// the counts and lengths it finds in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Memory-map the file instead of reading it into a buffer.
    pub use_mmap: bool,
    /// Largest string (key, value or tensor name) accepted, in bytes.
    pub max_string_len: u64,
    /// Largest array element count accepted.
    pub max_array_len: u64,
    /// Largest `kv_count` accepted from the header.
    pub max_kv_count: u64,
    /// Largest `tensor_count` accepted from the header.
    pub max_tensor_count: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            use_mmap: true,
            max_string_len: 16 * 1024 * 1024,
            max_array_len: 1 << 28,
            max_kv_count: 1 << 20,
            max_tensor_count: 1 << 20,
        }
    }
}

/// Options for a [`ContainerWriter`](crate::ContainerWriter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Tensor offset alignment used unless a `general.alignment` entry is added.
    pub alignment: u64,
    /// Version number written into the header.
    pub version: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self { alignment: DEFAULT_ALIGNMENT, version: GGUF_VERSION_WRITE }
    }
}
