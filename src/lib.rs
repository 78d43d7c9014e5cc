//! cmdb_sync - Configuration Record Synchronization
//!
//! Mirrors configuration items and their dependent records between two
//! record stores, resolving identities across the stores and tolerating
//! per-record failures.
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (FieldId, EntryId, Attributes)
//! - [`fields`] - Well-known field identifiers per record type
//! - [`config`] - YAML application config and flat sync config
//! - [`logging`] - tracing subscriber setup
//! - [`sync`] - The synchronization engine

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod fields;
pub mod logging;
pub mod sync;

// Convenient re-exports at crate root
pub use config::{AppConfig, SyncConfig};
pub use core_types::{Attributes, EntryId, FieldId};
pub use sync::{
    EntitySelector, ManagedEntity, MemoryStore, Record, RecordStore, SyncError, TransferOrchestrator,
    TransferReport, Value,
};
