//! Error types for the merge engine.
//!
//! Errors are categorized by whether the external transport should redeliver
//! the change record that triggered them.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Storage` | Yes | Transient storage collaborator failure |
//! | `ConflictDetected` | No | Local state diverged; surfaced to the operator/dead-letter path |
//! | `MalformedReference` | No | Encoded reference cannot be parsed or names an unknown kind |
//! | `HashIntegrity` | No | Existing record has no stored hash (prior corruption) |
//! | `UnresolvedKind` | No | Record kind is not registered |
//! | `Config` | No | Configuration invalid |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! Use [`SyncError::is_retryable()`] to decide whether the transport should
//! redeliver. A rejected merge leaves both the local record and its stored
//! hash exactly as they were before the call.

use thiserror::Error;

/// Result type alias for merge operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while merging an incoming change record.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The local record diverged from the last-known-synchronized state and
    /// from the incoming change.
    ///
    /// Not retried automatically. The operator (or a dead-letter path) must
    /// decide how to reconcile; no state was mutated.
    #[error("Conflict detected for {kind} with uuid {uuid}")]
    ConflictDetected { kind: String, uuid: String },

    /// An encoded cross-site reference could not be decoded.
    ///
    /// Either the string does not match `"<type>(<uuid>)"` or the type does
    /// not resolve to a registered record kind. Fatal for this record.
    #[error("Malformed reference in field {field}: {value}")]
    MalformedReference { field: String, value: String },

    /// An existing merged record has no corresponding stored hash.
    ///
    /// A merged record always has a hash, so this indicates prior data
    /// corruption. Never silently repaired.
    #[error("No stored hash found for existing {kind} with uuid {uuid}")]
    HashIntegrity { kind: String, uuid: String },

    /// A record kind has no registry entry.
    ///
    /// Fatal: without a registry entry there is no storage, hash, or
    /// placeholder mapping for the record.
    #[error("Unknown record kind: {0}")]
    UnresolvedKind(String),

    /// Storage collaborator failure.
    ///
    /// Transient; propagated to the transport layer which owns redelivery.
    #[error("Storage error ({operation}): {message}")]
    Storage { operation: String, message: String },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal error.
    ///
    /// Catch-all for states that should not happen; indicates a bug.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Create a storage error for a named operation.
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(kind: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self::ConflictDetected {
            kind: kind.into(),
            uuid: uuid.into(),
        }
    }

    /// Create a malformed-reference error.
    pub fn malformed_reference(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::MalformedReference {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check if this error is retryable by the transport.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage { .. } => true, // Transient collaborator failures
            Self::ConflictDetected { .. } => false,
            Self::MalformedReference { .. } => false,
            Self::HashIntegrity { .. } => false,
            Self::UnresolvedKind(_) => false,
            Self::Config(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if this error is a conflict rejection.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConflictDetected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_storage() {
        let err = SyncError::storage("save", "connection reset");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("save"));
    }

    #[test]
    fn test_not_retryable_conflict() {
        let err = SyncError::conflict("Person", "u1");
        assert!(!err.is_retryable());
        assert!(err.is_conflict());
        assert!(err.to_string().contains("Person"));
        assert!(err.to_string().contains("u1"));
    }

    #[test]
    fn test_not_retryable_malformed_reference() {
        let err = SyncError::malformed_reference("creator_ref", "not-a-reference");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("creator_ref"));
    }

    #[test]
    fn test_not_retryable_hash_integrity() {
        let err = SyncError::HashIntegrity {
            kind: "User".to_string(),
            uuid: "u2".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("u2"));
    }

    #[test]
    fn test_not_retryable_unresolved_kind() {
        let err = SyncError::UnresolvedKind("Widget".to_string());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Widget"));
    }

    #[test]
    fn test_not_retryable_config() {
        let err = SyncError::Config("empty separator".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_retryable_internal() {
        let err = SyncError::Internal("unexpected state".to_string());
        assert!(!err.is_retryable());
        assert!(!err.is_conflict());
    }
}
