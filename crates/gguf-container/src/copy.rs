//! Copying entries and tensors between containers.
//!
//! These helpers are the whole surface a rewrite tool needs: open the input,
//! start a writer with the new architecture, copy everything else across and
//! write.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::reader::ContainerReader;
use crate::tensor::TensorRecord;
use crate::writer::ContainerWriter;
use crate::{KEY_ARCHITECTURE, is_header_key};

/// Summary of a [`rename_architecture`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub old_architecture: String,
    pub new_architecture: String,
    pub kv_copied: usize,
    pub tensors_copied: usize,
    pub bytes_written: u64,
}

/// Copies every metadata entry from `reader` into `writer` except the
/// architecture entry, header fields and any key in `skip`. Returns the
/// number of entries copied.
pub fn copy_metadata(reader: &ContainerReader, writer: &mut ContainerWriter<'_>, skip: &[&str]) -> Result<usize> {
    let mut copied = 0;
    for entry in reader.metadata() {
        let key = entry.key.as_str();
        if key == KEY_ARCHITECTURE || is_header_key(key) || skip.contains(&key) {
            debug!(key, "skipping metadata entry");
            continue;
        }
        writer.add_key_value(key, entry.value.clone())?;
        copied += 1;
    }
    Ok(copied)
}

/// Adds `record` to `writer` with the same name, shape and type, borrowing
/// its payload from `reader`.
pub fn copy_tensor<'a>(
    reader: &'a ContainerReader,
    record: &TensorRecord,
    writer: &mut ContainerWriter<'a>,
) -> Result<()> {
    let bytes = reader.read_tensor_bytes(record)?;
    writer.add_tensor(record.name(), bytes, record.shape().to_vec(), record.tensor_type())
}

/// Rewrites `input` to `output` with `general.architecture` set to
/// `new_architecture`. Every other entry and every tensor is copied
/// unchanged and in order.
pub fn rename_architecture(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    new_architecture: &str,
) -> Result<RenameReport> {
    let (input, output) = (input.as_ref(), output.as_ref());
    info!(input = %input.display(), "loading container");
    let reader = ContainerReader::open(input)?;
    let old_architecture = reader.metadata().architecture()?.to_owned();

    let mut writer = ContainerWriter::create(output, new_architecture);
    let kv_copied = copy_metadata(&reader, &mut writer, &[])?;
    info!(count = reader.tensors().len(), "copying tensors");
    for record in reader.tensors() {
        copy_tensor(&reader, record, &mut writer)?;
    }
    let tensors_copied = writer.tensors().len();

    info!(output = %output.display(), from = %old_architecture, to = new_architecture, "writing container");
    let bytes_written = writer.write()?;

    Ok(RenameReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        old_architecture,
        new_architecture: new_architecture.to_owned(),
        kv_copied,
        tensors_copied,
        bytes_written,
    })
}
