use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovhtmlError {
    /// Bad invocation, e.g. no trace files at all.
    #[error("usage error: {0}")]
    Usage(String),

    /// Malformed trace file syntax.
    #[error("{}:{line}: {message}", trace.display())]
    Format {
        trace: PathBuf,
        line: usize,
        message: String,
    },

    /// Malformed or inconsistent configuration.
    #[error("config error in '{}': {message}", path.display())]
    Config { path: PathBuf, message: String },

    /// Checksum conflict while merging in strict mode.
    #[error("checksum mismatch for '{}': {found} disagrees with {expected}", path.display())]
    Aggregation {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl CovhtmlError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CovhtmlError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CovhtmlError>;
