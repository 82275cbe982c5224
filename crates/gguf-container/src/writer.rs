//! Container construction and serialization.

use std::borrow::Cow;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, trace};

use crate::config::WriterConfig;
use crate::error::{ContainerError, Result};
use crate::header::ContainerHeader;
use crate::metadata::MetadataStore;
use crate::tensor::{TensorRecord, TensorTable, TensorType};
use crate::value::Value;
use crate::{
    DEFAULT_ALIGNMENT, GGUF_VERSION_MAX, GGUF_VERSION_MIN, KEY_ALIGNMENT, align_up, validate_alignment,
};

/// Builds a container in memory and serializes it in one pass.
///
/// Tensor payloads are held as [`Cow`] so bytes borrowed from a
/// [`ContainerReader`](crate::ContainerReader) are written without an
/// intermediate copy. `add_*` calls are sequential; [`write`](Self::write)
/// consumes the writer, so a failed write cannot be resumed.
pub struct ContainerWriter<'a> {
    path: PathBuf,
    version: u32,
    alignment: u64,
    metadata: MetadataStore,
    tensors: TensorTable,
    payloads: Vec<Cow<'a, [u8]>>,
}

impl<'a> ContainerWriter<'a> {
    /// A writer for `path` with default settings.
    pub fn create(path: impl AsRef<Path>, architecture: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            version: crate::GGUF_VERSION_WRITE,
            alignment: crate::DEFAULT_ALIGNMENT,
            metadata: MetadataStore::with_architecture(architecture),
            tensors: TensorTable::new(),
            payloads: Vec::new(),
        }
    }

    /// A writer for `path` using `config`.
    ///
    /// A non-default alignment is recorded as a `general.alignment` entry
    /// right after the architecture, so readers lay the data region out the
    /// same way. Adding another `general.alignment` entry later is then a
    /// [`ContainerError::DuplicateKey`].
    pub fn with_config(path: impl AsRef<Path>, architecture: &str, config: WriterConfig) -> Result<Self> {
        if !(GGUF_VERSION_MIN..=GGUF_VERSION_MAX).contains(&config.version) {
            return Err(ContainerError::UnsupportedVersion(config.version));
        }
        let alignment = validate_alignment(config.alignment)?;
        let mut writer = Self { version: config.version, ..Self::create(path, architecture) };
        if alignment != DEFAULT_ALIGNMENT {
            let value = u32::try_from(alignment).map_or(Value::U64(alignment), Value::U32);
            writer.add_key_value(KEY_ALIGNMENT, value)?;
        }
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn tensors(&self) -> &TensorTable {
        &self.tensors
    }

    /// Alignment applied to tensor offsets and the data-region start.
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Appends a metadata entry.
    ///
    /// A `general.alignment` entry must hold an unsigned power of two; it
    /// replaces the configured alignment and re-lays-out tensors already
    /// added.
    pub fn add_key_value(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        let new_alignment = if key == KEY_ALIGNMENT {
            let align = value.as_u64().ok_or_else(|| ContainerError::TypeMismatch {
                key: key.clone(),
                expected: "unsigned integer",
                actual: value.value_type().name(),
            })?;
            Some(validate_alignment(align)?)
        } else {
            None
        };

        self.metadata.insert(key, value)?;
        if let Some(align) = new_alignment {
            self.alignment = align;
            self.relayout();
        }
        Ok(())
    }

    /// Appends a tensor whose descriptor offset is the previous tensor's end
    /// rounded up to the alignment.
    pub fn add_tensor(
        &mut self,
        name: impl Into<String>,
        data: impl Into<Cow<'a, [u8]>>,
        shape: Vec<u64>,
        ty: TensorType,
    ) -> Result<()> {
        let data = data.into();
        let offset = align_up(self.tensors.iter().last().map_or(0, TensorRecord::end), self.alignment);
        let record = TensorRecord::new(name, shape, ty, offset)?;
        if data.len() as u64 != record.byte_len() {
            return Err(ContainerError::ShapeMismatch {
                name: record.name().to_owned(),
                expected: record.byte_len(),
                actual: data.len() as u64,
            });
        }
        trace!(name = record.name(), ty = %ty, offset, len = data.len(), "tensor added");
        self.tensors.add(record)?;
        self.payloads.push(data);
        Ok(())
    }

    fn relayout(&mut self) {
        let mut end = 0;
        for record in self.tensors.records_mut() {
            let offset = align_up(end, self.alignment);
            record.set_offset(offset);
            end = offset + record.byte_len();
        }
    }

    fn header(&self) -> ContainerHeader {
        ContainerHeader {
            version: self.version,
            tensor_count: self.tensors.len() as u64,
            kv_count: self.metadata.len() as u64,
        }
    }

    /// Serializes the container to `sink`, returning the number of bytes
    /// written.
    ///
    /// Phases run in order, each flushed before the next: header, metadata,
    /// tensor descriptors, then padding and tensor payloads.
    pub fn write_to<W: Write>(&self, sink: &mut W) -> Result<u64> {
        let mut pos = 0u64;

        let header = self.header().encode();
        sink.write_all(&header)?;
        pos += header.len() as u64;
        sink.flush()?;

        let mut buf = Vec::new();
        self.metadata.encode_into(&mut buf);
        sink.write_all(&buf)?;
        pos += buf.len() as u64;
        sink.flush()?;

        buf.clear();
        self.tensors.encode_into(&mut buf);
        sink.write_all(&buf)?;
        pos += buf.len() as u64;
        sink.flush()?;

        let data_start = align_up(pos, self.alignment);
        debug!(metadata_end = pos, data_start, "writing tensor data");
        pos += write_zeros(sink, data_start - pos)?;
        for (record, payload) in self.tensors.iter().zip(&self.payloads) {
            let start = data_start + record.offset();
            pos += write_zeros(sink, start - pos)?;
            sink.write_all(payload)?;
            pos += payload.len() as u64;
        }
        sink.flush()?;
        Ok(pos)
    }

    /// Serializes the container into memory.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Writes the container to its path.
    ///
    /// Output goes to a uniquely named temporary file in the target's
    /// directory that is synced and then renamed over the target, so the
    /// target path only ever holds a complete container. The temporary file
    /// is removed if any step fails. Returns the number of bytes written.
    pub fn write(self) -> Result<u64> {
        let tmp = self.temp_file()?;
        let n = {
            let mut w = BufWriter::new(tmp.as_file());
            self.write_to(&mut w)?
        };
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        info!(
            path = %self.path.display(),
            bytes = n,
            kv_count = self.metadata.len(),
            tensor_count = self.tensors.len(),
            "container written"
        );
        Ok(n)
    }

    fn temp_file(&self) -> io::Result<NamedTempFile> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut prefix = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        prefix.push(".");
        tempfile::Builder::new().prefix(&prefix).suffix(".tmp").tempfile_in(dir)
    }
}

impl std::fmt::Debug for ContainerWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerWriter")
            .field("path", &self.path)
            .field("version", &self.version)
            .field("alignment", &self.alignment)
            .field("kv_count", &self.metadata.len())
            .field("tensor_count", &self.tensors.len())
            .finish()
    }
}

fn write_zeros<W: Write>(sink: &mut W, n: u64) -> io::Result<u64> {
    const ZEROS: [u8; 64] = [0; 64];
    let mut left = n;
    while left > 0 {
        let chunk = left.min(ZEROS.len() as u64) as usize;
        sink.write_all(&ZEROS[..chunk])?;
        left -= chunk as u64;
    }
    Ok(n)
}
