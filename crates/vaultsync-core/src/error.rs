//! Error types for vaultsync core
//!
//! Storage faults are kept distinct from "not found" and "conflict": a missing
//! document is `Ok(None)` and a version mismatch is a normal
//! [`WriteOutcome`](crate::service::WriteOutcome), so anything that reaches
//! `Err` is either a client input error or a real failure of the backend.

use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Main error type for vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// `new_version` was absent, zero or negative
    #[error("new_version must be > 0, got {0}")]
    InvalidVersion(i64),

    /// The SQLite backend failed
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A stored document could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored row is inconsistent with its own document
    #[error("Corrupt row for '{user_id}': {reason}")]
    Corrupt {
        /// Key of the offending row
        user_id: String,
        /// What was inconsistent
        reason: String,
    },

    /// Internal failure not attributable to the caller or the backend
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// True for errors caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, VaultError::InvalidVersion(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_version_is_client_error() {
        let err = VaultError::InvalidVersion(0);
        assert!(err.is_client_error());
        assert!(err.to_string().contains("new_version must be > 0"));
    }

    #[test]
    fn test_storage_error_is_not_client_error() {
        let err = VaultError::from(rusqlite::Error::InvalidQuery);
        assert!(!err.is_client_error());
        assert!(err.to_string().starts_with("Storage error"));
    }
}
