//! Error types for the DSF compiler

use thiserror::Error;

/// Main error type for the compiler
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed mesh at line {line}: {reason}")]
    MalformedMesh { line: usize, reason: String },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Partition error: {0}")]
    Partition(String),

    #[error("Point pool {pool} overflowed 16-bit addressing ({len} entries)")]
    PoolOverflow { pool: usize, len: usize },

    #[error("Invalid DSF: {0}")]
    InvalidDsf(String),

    #[error("Texture fetch error: {0}")]
    Fetch(String),

    #[error("Compilation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Error::MalformedMesh { line, reason: reason.into() }
    }
}
