//! Configuration Record Synchronization
//!
//! Mirrors a managed entity and its parts (work history, relationships,
//! people associations, impacted areas) from a source store into a target
//! store.
//!
//! # Architecture
//!
//! ```text
//! TransferOrchestrator
//!   ├─ Record / FieldMapper   read source, map into target records
//!   ├─ PartRegistry           discover parts per part code
//!   ├─ IdentityResolver       bind foreign references (person, site, ...)
//!   ├─ CommitEngine           probe → create / update / merge
//!   └─ ConsistencyWaiter      trigger reconciliation, poll for result
//! ```
//!
//! # Commit State Machine
//!
//! ```text
//! UNBOUND → PROBING → CREATING ─┐
//!              │    → UPDATING ─┼→ BOUND
//!              │    → MERGING  ─┘
//!              └───────────────→ BOUND
//! any non-terminal state → FAILED
//! ```
//!
//! # Failure Policy
//!
//! 1. **Main entity is the anchor**: any error reading or committing it aborts
//! 2. **Parts are isolated**: a failing part is recorded as skipped, the
//!    transfer continues
//! 3. **No rollback**: a partially successful transfer stays partial
//! 4. **Dependencies first**: foreign records are created before the records
//!    that reference them

pub mod catalog;
pub mod commit;
pub mod criteria;
pub mod entity;
pub mod error;
pub mod mapper;
pub mod merge;
pub mod orchestrator;
pub mod parts;
pub mod record;
pub mod report;
pub mod resolver;
pub mod state;
pub mod store;
pub mod waiter;


// Re-exports for convenience
pub use catalog::{ClassCatalog, ClassSelector};
pub use commit::{CommitEngine, CommitKind, CommitOutcome};
pub use criteria::{Criteria, Literal};
pub use entity::{ManagedEntity, PartRef};
pub use error::SyncError;
pub use mapper::FieldMapping;
pub use merge::{MergeDescriptor, MergeType};
pub use orchestrator::{EntitySelector, TransferOrchestrator};
pub use parts::{PartCode, PartHandler, PartRegistry};
pub use record::{Record, Value};
pub use report::{CommittedPart, SkippedPart, TransferReport};
pub use resolver::{ForeignKind, IdentityResolver, ProfileCatalog, Resolution, ResolutionCache};
pub use state::CommitState;
pub use store::{MemoryStore, OperationMode, RecordStore, StoreError};
pub use waiter::{ConsistencyWaiter, Sleeper, TokioSleeper, WaitPlan};
