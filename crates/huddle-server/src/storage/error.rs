//! Storage error types.
//!
//! Defines errors that can occur during storage operations:
//! - `NotFound`: Updated or deleted row doesn't exist
//! - `Duplicate`: Unique name already taken
//! - `Serialization`: Failed to encode/decode a stored row
//! - `Io`: Underlying storage system errors

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Row addressed by id does not exist
    #[error("{entity} not found: id {id}")]
    NotFound {
        /// Kind of row ("account", "membership", ...)
        entity: &'static str,
        /// Id that was not found
        id: u64,
    },

    /// Unique key already present
    #[error("{entity} already exists: {key}")]
    Duplicate {
        /// Kind of row ("account", "group")
        entity: &'static str,
        /// Conflicting unique key
        key: String,
    },

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),
}

impl StorageError {
    /// Whether the store itself failed, as opposed to a well-formed answer
    /// about missing or conflicting rows.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Io(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
