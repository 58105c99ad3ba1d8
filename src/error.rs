//! Shared error types for the compiler pipeline, annotator and predictor.

use std::io;
use std::path::PathBuf;

/// Errors surfaced by any stage of the pipeline.
///
/// Every variant carries a human-readable message; nothing is swallowed.
/// Worker threads report their first error through [`Error::Concurrency`]
/// after the parallel region joins.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed parameter JSON, unknown key, type mismatch or out-of-range value.
    #[error("invalid compiler parameter: {0}")]
    InvalidParam(String),

    /// The model violates a structural requirement (leaf-vector shape,
    /// postprocessor name, sigmoid alpha, ...).
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// An optimization pass was invoked out of order or twice.
    #[error("invalid pipeline state: {0}")]
    InvalidState(String),

    /// Filesystem failure, annotated with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed JSON payload (annotation file or parameter string).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The shared library is missing a symbol or reports an unrecognized type.
    #[error("ABI error: {0}")]
    Abi(String),

    /// First error captured from a worker thread.
    #[error("worker thread failed: {0}")]
    Concurrency(String),
}

impl Error {
    /// Wrap an I/O error with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
