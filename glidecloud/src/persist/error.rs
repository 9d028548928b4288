//! Persistence errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reading or writing a state snapshot.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file does not start with the snapshot magic.
    #[error("Not a glidecloud database (magic {0:#010x})")]
    BadMagic(u32),

    #[error("Unsupported database version {0}")]
    UnsupportedVersion(u32),

    /// The data ended inside a record.
    #[error("Database is truncated")]
    Truncated,

    /// A field holds a value that cannot be restored.
    #[error("Invalid {0} in database")]
    Invalid(&'static str),
}
