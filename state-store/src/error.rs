//! Error types for state-store

use thiserror::Error;

/// Errors that can occur while loading or persisting a record
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the backing medium failed
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The persisted document was written by a newer schema
    #[error("Unsupported schema version {found} (this build supports up to {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },

    /// The persisted document is not a valid record
    #[error("Corrupt state document: {0}")]
    Corrupt(String),
}

/// Result type for state-store operations
pub type Result<T> = std::result::Result<T, StoreError>;
