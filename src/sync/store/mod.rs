//! Record Stores
//!
//! The remote data store boundary. The engine never talks to a store
//! except through [`RecordStore`]; every call is its own remote operation
//! and is immediately visible to later reads in the same job.

pub mod memory;

pub use memory::{MemoryStore, StoreOp, StoreOpKind, StoreSnapshot};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::{Attributes, EntryId};

use super::criteria::Criteria;
use super::record::Record;

/// Store-level failures
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    #[error("Entry {entry_id} not found in {record_type}")]
    MissingEntry {
        record_type: String,
        entry_id: EntryId,
    },

    #[error("Write rejected on {record_type}: {message}")]
    Rejected {
        record_type: String,
        message: String,
    },

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// Write mode of a store connection
///
/// `System` bypasses normal validation and is how the engine signals
/// remote reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    #[default]
    Normal,
    System,
}

impl OperationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationMode::Normal => "NORMAL",
            OperationMode::System => "SYSTEM",
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record store capability
///
/// Implementations treat a connection as single-owner for the duration of
/// a transfer. No transaction demarcation is expected.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &str;

    /// Entry ids of all records of `record_type` matching `criteria`
    async fn search(
        &self,
        record_type: &str,
        criteria: &Criteria,
    ) -> Result<Vec<EntryId>, StoreError>;

    /// Fetch one stored record
    async fn fetch(&self, record_type: &str, entry_id: &str) -> Result<Record, StoreError>;

    /// Create a new entry, returning its store-assigned id
    async fn create(
        &self,
        record_type: &str,
        attributes: &Attributes,
    ) -> Result<EntryId, StoreError>;

    /// Overwrite the given attributes of an existing entry
    async fn update(
        &self,
        record_type: &str,
        entry_id: &str,
        attributes: &Attributes,
    ) -> Result<(), StoreError>;

    /// Switch the connection's write mode
    async fn set_operation_mode(&self, mode: OperationMode) -> Result<(), StoreError>;
}
