//! Error types for registry operations
//!
//! Every failure a registry operation can produce is a [`RegistryError`].
//! Each variant carries:
//! - A human-readable message naming the namespace/owner involved
//! - A stable error code (e.g. `NOT_FOUND`) for programmatic handling
//! - A category for grouping
//! - An HTTP status code for the server shim
//!
//! # Example
//!
//! ```rust
//! use matchdir_core::error::{ErrorCategory, RegistryError};
//!
//! fn describe(err: &RegistryError) -> &'static str {
//!     match err.category() {
//!         ErrorCategory::NotFound => "no such match",
//!         ErrorCategory::Validation => "bad request",
//!         ErrorCategory::Unavailable => "backend down",
//!         _ => "other",
//!     }
//! }
//!
//! let err = RegistryError::NotFound {
//!     namespace: "arena".to_string(),
//!     owner_id: "srv1".to_string(),
//! };
//! assert_eq!(describe(&err), "no such match");
//! assert_eq!(err.http_status_code(), 404);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Record absent or not live (404)
    NotFound,
    /// Input could not be parsed (400)
    Validation,
    /// Concurrent writer won the race (409)
    Conflict,
    /// Stored data is unusable (422)
    Integrity,
    /// Store or oracle unreachable (503)
    Unavailable,
    /// Internal error (500)
    Internal,
}

/// Errors that can occur in registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    // ═══════════════════════════════════════════════════════════════════════
    // Request errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Request payload could not be parsed into the expected shape
    #[error("Malformed request: {reason}")]
    MalformedRequest { reason: String },

    /// No live record exists for the key
    #[error("No live match registered for owner '{owner_id}' in namespace '{namespace}'. Create it with CreateMatch first.")]
    NotFound { namespace: String, owner_id: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Record errors
    // ═══════════════════════════════════════════════════════════════════════

    /// Stored value cannot be decoded into a match record
    #[error("Corrupt payload for owner '{owner_id}' in namespace '{namespace}': {reason}")]
    CorruptPayload {
        namespace: String,
        owner_id: String,
        reason: String,
    },

    /// The match a record points at no longer exists
    #[error("Match '{match_id}' advertised by owner '{owner_id}' no longer exists")]
    RecordOrphaned { owner_id: String, match_id: String },

    /// A conditional write lost against a concurrent writer
    #[error("Version conflict writing owner '{owner_id}' in namespace '{namespace}'. The record changed concurrently.")]
    VersionConflict { namespace: String, owner_id: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Infrastructure errors (store, oracle, accounts)
    // ═══════════════════════════════════════════════════════════════════════

    /// Storage backend call failed
    #[error("Storage backend '{backend}' unavailable: {reason}")]
    StorageUnavailable { backend: String, reason: String },

    /// Match existence oracle could not be reached
    #[error("Match oracle unavailable: {reason}")]
    OracleUnavailable { reason: String },

    /// Owner account removal failed
    #[error("Failed to remove account '{owner_id}': {reason}")]
    AccountCleanupFailed { owner_id: String, reason: String },

    /// JSON serialization or deserialization failed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Storage backend lock is poisoned (panic occurred while holding lock)
    #[error("Storage backend lock poisoned. This is a bug; please report it.")]
    StorageLocked,

    /// Internal error that shouldn't happen
    #[error("Internal error: {reason}. This is a bug; please report it.")]
    InternalError { reason: String },
}

impl RegistryError {
    /// Shorthand for a storage failure on the named backend
    pub fn storage(backend: &str, reason: impl std::fmt::Display) -> Self {
        RegistryError::StorageUnavailable {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if this error might succeed on retry
    ///
    /// The registry itself never retries backend failures; this is a hint
    /// for callers.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RegistryError::VersionConflict { .. }
                | RegistryError::StorageUnavailable { .. }
                | RegistryError::OracleUnavailable { .. }
                | RegistryError::StorageLocked
        )
    }

    /// Returns true if this error is a client error (4xx equivalent)
    pub fn is_client_error(&self) -> bool {
        matches!(self.http_status_code(), 400..=499)
    }

    /// Returns true if this error is a server error (5xx equivalent)
    pub fn is_server_error(&self) -> bool {
        matches!(self.http_status_code(), 500..=599)
    }

    /// Returns the error category for grouping
    pub fn category(&self) -> ErrorCategory {
        match self {
            RegistryError::NotFound { .. } | RegistryError::RecordOrphaned { .. } => {
                ErrorCategory::NotFound
            }

            RegistryError::MalformedRequest { .. } => ErrorCategory::Validation,

            RegistryError::VersionConflict { .. } => ErrorCategory::Conflict,

            RegistryError::CorruptPayload { .. } | RegistryError::JsonError(_) => {
                ErrorCategory::Integrity
            }

            RegistryError::StorageUnavailable { .. }
            | RegistryError::OracleUnavailable { .. }
            | RegistryError::AccountCleanupFailed { .. } => ErrorCategory::Unavailable,

            RegistryError::StorageLocked | RegistryError::InternalError { .. } => {
                ErrorCategory::Internal
            }
        }
    }

    /// Returns the stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::MalformedRequest { .. } => "MALFORMED_REQUEST",
            RegistryError::NotFound { .. } => "NOT_FOUND",
            RegistryError::CorruptPayload { .. } => "CORRUPT_PAYLOAD",
            RegistryError::RecordOrphaned { .. } => "RECORD_ORPHANED",
            RegistryError::VersionConflict { .. } => "VERSION_CONFLICT",
            RegistryError::StorageUnavailable { .. } => "STORAGE_UNAVAILABLE",
            RegistryError::OracleUnavailable { .. } => "ORACLE_UNAVAILABLE",
            RegistryError::AccountCleanupFailed { .. } => "ACCOUNT_CLEANUP_FAILED",
            RegistryError::JsonError(_) => "JSON_ERROR",
            RegistryError::StorageLocked => "STORAGE_LOCKED",
            RegistryError::InternalError { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error
    pub fn http_status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::Validation => 400,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Conflict => 409,
            ErrorCategory::Integrity => 422,
            ErrorCategory::Internal => 500,
            ErrorCategory::Unavailable => 503,
        }
    }

    /// Converts this error to a JSON-serializable response object
    ///
    /// ```json
    /// {
    ///   "error": {
    ///     "code": "NOT_FOUND",
    ///     "message": "No live match registered for owner 'srv1' ...",
    ///     "category": "not_found",
    ///     "recoverable": false
    ///   }
    /// }
    /// ```
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                category: self.category(),
                recoverable: self.is_recoverable(),
            },
        }
    }
}

/// JSON-serializable error response for APIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail for JSON responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable error code (e.g., "NOT_FOUND")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    pub category: ErrorCategory,
    /// Whether retry might succeed
    pub recoverable: bool,
}
