//! Sync Error Types
//!
//! One variant per failure class the engine distinguishes. Whether an error
//! aborts a transfer depends on where it is raised: anything on the main
//! entity propagates to the caller, anything on a part is recorded in the
//! [`TransferReport`](super::report::TransferReport) and skipped.

use thiserror::Error;

use super::store::StoreError;

/// Sync error types
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    // === Fatal for the whole transfer ===
    #[error("Source entity not found: {0}")]
    SourceNotFound(String),

    // === Record-level lookup errors ===
    #[error("Ambiguous match on {record_type}: {count} records match {criteria}")]
    AmbiguousMatch {
        record_type: String,
        criteria: String,
        count: usize,
    },

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    // === Programmer errors (never retried) ===
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // === Store errors ===
    #[error("Remote operation failed: {0}")]
    Remote(#[from] StoreError),

    // === Setup errors ===
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Stable error code, used as the skip reason in transfer reports
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            SyncError::AmbiguousMatch { .. } => "AMBIGUOUS_MATCH",
            SyncError::UnresolvedReference(_) => "UNRESOLVED_REFERENCE",
            SyncError::NotFound(_) => "NOT_FOUND",
            SyncError::AlreadyExists(_) => "ALREADY_EXISTS",
            SyncError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            SyncError::Remote(_) => "REMOTE_OPERATION",
            SyncError::UnknownClass(_) => "UNKNOWN_CLASS",
            SyncError::Config(_) => "CONFIG",
        }
    }

    /// Errors caused by misuse of the record API rather than by data
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            SyncError::NotFound(_)
                | SyncError::AlreadyExists(_)
                | SyncError::InvalidStateTransition(_)
        )
    }
}
