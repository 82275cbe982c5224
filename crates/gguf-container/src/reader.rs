//! Container parsing and lazy tensor access.

use memmap2::Mmap;
use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::ReaderConfig;
use crate::cursor::ByteCursor;
use crate::error::{ContainerError, Result};
use crate::header::ContainerHeader;
use crate::metadata::MetadataStore;
use crate::tensor::{TensorRecord, TensorTable};
use crate::{KEY_ARCHITECTURE, align_up};

/// Bytes backing a reader: a read-only file mapping or an owned buffer.
enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(m) => m,
            Self::Owned(v) => v,
        }
    }
}

struct Parsed {
    header: ContainerHeader,
    metadata: MetadataStore,
    tensors: TensorTable,
    alignment: u64,
    data_start: u64,
}

fn parse(data: &[u8], config: &ReaderConfig) -> Result<Parsed> {
    let mut cur = ByteCursor::with_limits(data, config);

    let header = ContainerHeader::decode(&mut cur)?;
    check_limit("kv", header.kv_count, config.max_kv_count)?;
    check_limit("tensor", header.tensor_count, config.max_tensor_count)?;
    debug!(offset = cur.position(), version = header.version, "container header parsed");

    let metadata = MetadataStore::decode(&mut cur, header.kv_count)?;
    let alignment = metadata.alignment()?;
    if !metadata.contains_key(KEY_ARCHITECTURE) {
        warn!("container has no `{KEY_ARCHITECTURE}` entry");
    }
    debug!(offset = cur.position(), kv_count = metadata.len(), alignment, "container metadata parsed");

    let tensors = TensorTable::decode(&mut cur, header.tensor_count)?;
    tensors.validate_layout(alignment)?;
    debug!(offset = cur.position(), tensor_count = tensors.len(), "container tensor descriptors parsed");

    // The gap up to the next alignment boundary is padding, not data.
    let data_start = align_up(cur.position() as u64, alignment);
    let available = (data.len() as u64).saturating_sub(data_start);
    if tensors.data_len() > available {
        warn!(
            needed = tensors.data_len(),
            available, "tensor data region is shorter than the descriptor table declares"
        );
    }

    Ok(Parsed { header, metadata, tensors, alignment, data_start })
}

fn check_limit(what: &'static str, count: u64, limit: u64) -> Result<()> {
    if count > limit {
        return Err(ContainerError::LimitExceeded { what, count, limit });
    }
    Ok(())
}

/// A fully parsed container.
///
/// Metadata and descriptors are parsed eagerly at open; tensor payloads stay
/// in the backing file until [`read_tensor_bytes`](Self::read_tensor_bytes)
/// borrows them. Tensor reads take `&self` and touch disjoint ranges, so a
/// reader can be shared across threads once open.
pub struct ContainerReader {
    backing: Backing,
    path: Option<PathBuf>,
    header: ContainerHeader,
    metadata: MetadataStore,
    tensors: TensorTable,
    alignment: u64,
    data_start: u64,
}

impl ContainerReader {
    /// Memory-maps and parses the container at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ReaderConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, config: ReaderConfig) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), mmap = config.use_mmap, "opening container");
        let backing = if config.use_mmap {
            let file = File::open(path)?;
            // SAFETY: the mapping is read-only and never handed out mutably.
            Backing::Mapped(unsafe { Mmap::map(&file)? })
        } else {
            Backing::Owned(std::fs::read(path)?)
        };
        let mut reader = Self::from_backing(backing, &config)?;
        reader.path = Some(path.to_path_buf());
        Ok(reader)
    }

    /// Parses a container held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with(data, ReaderConfig::default())
    }

    pub fn from_bytes_with(data: Vec<u8>, config: ReaderConfig) -> Result<Self> {
        Self::from_backing(Backing::Owned(data), &config)
    }

    fn from_backing(backing: Backing, config: &ReaderConfig) -> Result<Self> {
        let parsed = parse(&backing, config)?;
        debug!(
            version = parsed.header.version,
            kv_count = parsed.header.kv_count,
            tensor_count = parsed.header.tensor_count,
            alignment = parsed.alignment,
            data_start = parsed.data_start,
            "container ready"
        );
        Ok(Self {
            backing,
            path: None,
            header: parsed.header,
            metadata: parsed.metadata,
            tensors: parsed.tensors,
            alignment: parsed.alignment,
            data_start: parsed.data_start,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn tensors(&self) -> &TensorTable {
        &self.tensors
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Absolute file offset of the tensor-data region.
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Source path, if opened from a file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Total size of the backing bytes.
    pub fn file_len(&self) -> u64 {
        self.backing.len() as u64
    }

    /// Borrows the raw bytes of `record` from the backing file.
    ///
    /// Reads exactly `record.byte_len()` bytes at `data_start + offset`, or
    /// fails with `TruncatedTensorData` if the file ends first.
    pub fn read_tensor_bytes(&self, record: &TensorRecord) -> Result<&[u8]> {
        let data: &[u8] = &self.backing;
        let expected = record.byte_len();
        let truncated = |offset: u64, available: u64| ContainerError::TruncatedTensorData {
            name: record.name().to_owned(),
            offset,
            expected,
            available,
        };

        let Some(start) = self.data_start.checked_add(record.offset()) else {
            return Err(truncated(u64::MAX, 0));
        };
        let available = (data.len() as u64).saturating_sub(start);
        if expected > available {
            return Err(truncated(start, available));
        }
        let start = start as usize;
        Ok(&data[start..start + expected as usize])
    }

    /// Looks up `name` and borrows its bytes.
    pub fn tensor_bytes(&self, name: &str) -> Result<&[u8]> {
        let record = self.tensors.lookup(name)?;
        self.read_tensor_bytes(record)
    }
}

impl std::fmt::Debug for ContainerReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerReader")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("alignment", &self.alignment)
            .field("data_start", &self.data_start)
            .field("file_len", &self.file_len())
            .finish_non_exhaustive()
    }
}
