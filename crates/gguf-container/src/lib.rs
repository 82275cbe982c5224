//! Reader and writer for GGUF model containers.
//!
//! A container is a single seekable file holding a header, an ordered set of
//! typed key-value metadata entries, a table of tensor descriptors and the
//! raw tensor payloads, each starting on an alignment boundary:
//!
//! ```text
//! offset 0   magic "GGUF" | version u32 | tensor_count u64 | kv_count u64
//! offset 24  kv_count x { key string | type_tag u32 | value }
//!            tensor_count x { name string | n_dims u32 | dims u64[n_dims] | dtype u32 | offset u64 }
//!            padding to alignment
//!            tensor_count x { padding | raw bytes }
//! ```
//!
//! All integers are little-endian; `string` is `u64 len || utf8 bytes`.
//!
//! # Example
//!
//! ```no_run
//! use gguf_container::{TensorType, new_writer, open_reader};
//!
//! let mut writer = new_writer("model.gguf", "llama");
//! writer.add_key_value("llama.context_length", 4096u32)?;
//! writer.add_tensor("token_embd.weight", vec![0u8; 2 * 3 * 4], vec![3, 2], TensorType::F32)?;
//! writer.write()?;
//!
//! let reader = open_reader("model.gguf")?;
//! assert_eq!(reader.metadata().architecture()?, "llama");
//! let record = reader.tensors().lookup("token_embd.weight")?;
//! assert_eq!(reader.read_tensor_bytes(record)?.len(), 24);
//! # Ok::<(), gguf_container::ContainerError>(())
//! ```

use std::path::Path;

pub mod config;
pub mod copy;
pub mod cursor;
pub mod error;
pub mod header;
pub mod metadata;
pub mod reader;
pub mod tensor;
pub mod value;
pub mod writer;

pub use config::{ReaderConfig, WriterConfig};
pub use copy::{RenameReport, copy_metadata, copy_tensor, rename_architecture};
pub use cursor::ByteCursor;
pub use error::{ContainerError, ErrorCategory, Result};
pub use header::{ContainerHeader, HEADER_LEN, check_magic, parse_header};
pub use metadata::{MetadataEntry, MetadataStore};
pub use reader::ContainerReader;
pub use tensor::{TensorRecord, TensorTable, TensorType};
pub use value::{Array, Value, ValueType};
pub use writer::ContainerWriter;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// The four-byte magic that every container starts with.
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";
/// Minimum supported version on read.
pub const GGUF_VERSION_MIN: u32 = 2;
/// Maximum supported version on read (inclusive).
pub const GGUF_VERSION_MAX: u32 = 3;
/// Version written by [`ContainerWriter`].
pub const GGUF_VERSION_WRITE: u32 = 3;
/// Tensor alignment used when no `general.alignment` entry is present.
pub const DEFAULT_ALIGNMENT: u64 = 32;

/// Mandatory architecture-name entry.
pub const KEY_ARCHITECTURE: &str = "general.architecture";
/// Optional alignment override entry.
pub const KEY_ALIGNMENT: &str = "general.alignment";

/// Pseudo-keys some tools expose for header fields. They are never stored as
/// metadata entries.
pub const HEADER_KEYS: [&str; 3] = ["GGUF.version", "GGUF.tensor_count", "GGUF.kv_count"];

/// Whether `key` names a header field rather than a metadata entry.
pub fn is_header_key(key: &str) -> bool {
    HEADER_KEYS.contains(&key)
}

/// Rounds `off` up to the next multiple of `align` (a power of two).
#[inline]
pub fn align_up(off: u64, align: u64) -> u64 {
    if align == 0 {
        return off;
    }
    debug_assert!(align.is_power_of_two(), "alignment should be power-of-two");
    (off + align - 1) & !(align - 1)
}

/// Accepts `align` if it is a non-zero power of two.
pub fn validate_alignment(align: u64) -> Result<u64> {
    if align.is_power_of_two() { Ok(align) } else { Err(ContainerError::InvalidAlignment(align)) }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Opens and fully parses the container at `path`.
pub fn open_reader(path: impl AsRef<Path>) -> Result<ContainerReader> {
    ContainerReader::open(path)
}

/// Starts a container for `path` whose first entry is
/// `general.architecture = architecture`. Nothing touches the file system
/// until [`ContainerWriter::write`].
pub fn new_writer<'a>(path: impl AsRef<Path>, architecture: &str) -> ContainerWriter<'a> {
    ContainerWriter::create(path, architecture)
}
