//! Transfer Report
//!
//! Returned by every transfer that got the main entity committed. A
//! report with skipped parts means the transfer was partially successful:
//! nothing is rolled back.

use serde::Serialize;

use crate::core_types::EntryId;

use super::commit::{CommitKind, CommitOutcome};
use super::error::SyncError;
use super::parts::PartCode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedPart {
    pub part_code: PartCode,
    pub entry_id: EntryId,
    pub outcome: CommitKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPart {
    pub part_code: PartCode,
    /// Descriptive string of the offending record, if one was reached
    pub record: Option<String>,
    /// Error code, e.g. `UNRESOLVED_REFERENCE`
    pub reason: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub transfer_id: String,
    pub main_entity: EntryId,
    pub main_outcome: CommitKind,
    pub committed_parts: Vec<CommittedPart>,
    pub skipped_parts: Vec<SkippedPart>,
    /// Consistency wait result; `None` when no wait was run
    pub reconciled: Option<bool>,
}

impl TransferReport {
    pub fn new(main: &CommitOutcome) -> Self {
        Self {
            transfer_id: ulid::Ulid::new().to_string(),
            main_entity: main.entry_id.clone(),
            main_outcome: main.kind,
            committed_parts: Vec::new(),
            skipped_parts: Vec::new(),
            reconciled: None,
        }
    }

    pub fn committed(&mut self, part_code: PartCode, outcome: &CommitOutcome) {
        self.committed_parts.push(CommittedPart {
            part_code,
            entry_id: outcome.entry_id.clone(),
            outcome: outcome.kind,
        });
    }

    pub fn skipped(&mut self, part_code: PartCode, record: Option<String>, error: &SyncError) {
        self.skipped_parts.push(SkippedPart {
            part_code,
            record,
            reason: error.code(),
            message: error.to_string(),
        });
    }

    /// Every discovered part made it, and any wait succeeded
    pub fn is_complete(&self) -> bool {
        self.skipped_parts.is_empty() && self.reconciled != Some(false)
    }

    pub fn committed_for(&self, part_code: PartCode) -> impl Iterator<Item = &CommittedPart> {
        self.committed_parts
            .iter()
            .filter(move |p| p.part_code == part_code)
    }

    pub fn skipped_for(&self, part_code: PartCode) -> impl Iterator<Item = &SkippedPart> {
        self.skipped_parts
            .iter()
            .filter(move |p| p.part_code == part_code)
    }
}
