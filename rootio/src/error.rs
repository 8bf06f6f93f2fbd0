//! Error types for reading and writing ROOT files

use std::sync::Arc;

use rootio_core::FormatError;
use thiserror::Error;

/// Errors raised by codec, compression, schema and file operations
///
/// The type is `Clone` so a buffer can hand back the first error it recorded
/// on every later call.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Byte-count mismatch, bad magic, truncated read or inconsistent header
    #[error("{context}: {detail}")]
    StructuralCorruption { context: String, detail: String },

    /// A concrete type was required but the class is not known
    #[error("unknown class {0:?}")]
    UnknownClass(String),

    /// Same class and version registered with two checksums
    #[error(
        "schema conflict for {class} (version {version}): checksum {existing:#010x} registered, got {incoming:#010x}"
    )]
    SchemaConflict {
        class: String,
        version: i32,
        existing: u32,
        incoming: u32,
    },

    /// Compression algorithm, element type or container shape not implemented
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Failure of the underlying byte source or sink
    #[error("i/o error: {0}")]
    Io(Arc<std::io::Error>),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("key {0:?} not found")]
    KeyNotFound(String),

    #[error("branch {0:?} not found")]
    BranchNotFound(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file was opened read-only")]
    ReadOnly,

    #[error("file is closed")]
    Closed,

    /// Another error, annotated with the key or branch involved
    #[error("{what}: {source}")]
    Context {
        what: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn corrupt(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::StructuralCorruption {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Innermost error, skipping context annotations
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the error describes corrupted bytes rather than misuse
    pub fn is_corruption(&self) -> bool {
        matches!(
            self.root_cause(),
            Error::StructuralCorruption { .. } | Error::Format(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

/// Attach the name of the key, branch or class being processed
pub trait ResultExt<T> {
    fn context<S: Into<String>>(self, what: impl FnOnce() -> S) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<S: Into<String>>(self, what: impl FnOnce() -> S) -> Result<T> {
        self.map_err(|source| Error::Context {
            what: what().into(),
            source: Box::new(source),
        })
    }
}

/// Result type for rootio operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let err: Result<()> = Err(Error::corrupt("TNamed", "read too few bytes (got 10, want 12)"));
        let err = err.context(|| "key \"greeting\"").unwrap_err();
        assert_eq!(
            err.to_string(),
            "key \"greeting\": TNamed: read too few bytes (got 10, want 12)"
        );
        assert!(err.is_corruption());
    }

    #[test]
    fn test_io_is_clone() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"));
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
        assert!(!copy.is_corruption());
    }
}
