use std::io;
use thiserror::Error;

/// Broad class of a [`ContainerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The bytes are not a well-formed container. Never partially recovered.
    Format,
    /// The caller misused the API. The object is left unchanged.
    Usage,
    /// The underlying read, write or seek failed.
    Io,
}

/// Errors returned when reading, building or writing a container.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ContainerError {
    // ---- format ----
    #[error("not a GGUF container: bad magic {0:02x?}")]
    NotAContainer([u8; 4]),
    #[error("unsupported GGUF version: {0} (supported: 2-3)")]
    UnsupportedVersion(u32),
    #[error("malformed value at offset {offset}: {reason}")]
    MalformedValue { offset: u64, reason: String },
    #[error("unknown value type tag {tag} at offset {offset}")]
    UnknownValueType { tag: u32, offset: u64 },
    #[error("unknown tensor type tag {tag} for tensor `{name}`")]
    UnknownTensorType { tag: u32, name: String },
    #[error(
        "truncated tensor data for `{name}`: need {expected} bytes at offset {offset}, only {available} available"
    )]
    TruncatedTensorData { name: String, offset: u64, expected: u64, available: u64 },
    #[error("invalid alignment {0}: must be a non-zero power of two")]
    InvalidAlignment(u64),
    #[error("tensor `{name}` offset {offset} is not a multiple of alignment {alignment}")]
    MisalignedTensor { name: String, offset: u64, alignment: u64 },
    #[error("tensor `{first}` overlaps tensor `{second}` in the data region")]
    OverlappingTensors { first: String, second: String },
    #[error("{what} count {count} exceeds limit {limit}")]
    LimitExceeded { what: &'static str, count: u64, limit: u64 },

    // ---- usage ----
    #[error("duplicate metadata key `{0}`")]
    DuplicateKey(String),
    #[error("duplicate tensor name `{0}`")]
    DuplicateTensorName(String),
    #[error("metadata key `{0}` not found")]
    KeyNotFound(String),
    #[error("tensor `{0}` not found")]
    TensorNotFound(String),
    #[error("shape mismatch for tensor `{name}`: shape implies {expected} bytes, got {actual}")]
    ShapeMismatch { name: String, expected: u64, actual: u64 },
    #[error("invalid shape {shape:?} for tensor `{name}`: {reason}")]
    InvalidShape { name: String, shape: Vec<u64>, reason: String },
    #[error("metadata key `{0}` is reserved for the container header")]
    ReservedKey(String),
    #[error("metadata key `{key}` has type {actual}, expected {expected}")]
    TypeMismatch { key: String, expected: &'static str, actual: &'static str },
    #[error("array elements do not match declared element type {0}")]
    MixedArray(&'static str),
    #[error("unknown tensor type name `{0}`")]
    UnknownTensorTypeName(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ContainerError {
    /// Classifies the error per the format/usage/io taxonomy.
    pub fn category(&self) -> ErrorCategory {
        use ContainerError::*;
        match self {
            NotAContainer(_)
            | UnsupportedVersion(_)
            | MalformedValue { .. }
            | UnknownValueType { .. }
            | UnknownTensorType { .. }
            | TruncatedTensorData { .. }
            | InvalidAlignment(_)
            | MisalignedTensor { .. }
            | OverlappingTensors { .. }
            | LimitExceeded { .. } => ErrorCategory::Format,
            DuplicateKey(_)
            | DuplicateTensorName(_)
            | KeyNotFound(_)
            | TensorNotFound(_)
            | ShapeMismatch { .. }
            | InvalidShape { .. }
            | ReservedKey(_)
            | TypeMismatch { .. }
            | MixedArray(_)
            | UnknownTensorTypeName(_) => ErrorCategory::Usage,
            Io(_) => ErrorCategory::Io,
        }
    }

    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedValue { offset: offset as u64, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_taxonomy() {
        assert_eq!(ContainerError::NotAContainer(*b"GGML").category(), ErrorCategory::Format);
        assert_eq!(ContainerError::DuplicateKey("a".into()).category(), ErrorCategory::Usage);
        let io = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(ContainerError::from(io).category(), ErrorCategory::Io);
    }

    #[test]
    fn truncated_message_carries_counts() {
        let err = ContainerError::TruncatedTensorData {
            name: "w".into(),
            offset: 96,
            expected: 24,
            available: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("24") && msg.contains("96") && msg.contains('8'));
    }
}
