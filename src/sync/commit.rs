//! Commit Engine
//!
//! Persists one mapped record (main entity or part) into the target store:
//! probe for an existing record, then create, update or merge according to
//! the merge descriptor. Each call walks the [`CommitState`] machine once.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core_types::{EntryId, FieldId};
use crate::fields::{base, common};

use super::criteria::{Criteria, Literal};
use super::error::SyncError;
use super::merge::{MergeDescriptor, MergeType};
use super::record::Record;
use super::state::CommitState;
use super::store::RecordStore;

/// What the commit did to the target store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitKind {
    Created,
    Updated,
    Merged,
    /// Existing record left as is
    Unchanged,
}

impl CommitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitKind::Created => "created",
            CommitKind::Updated => "updated",
            CommitKind::Merged => "merged",
            CommitKind::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for CommitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub kind: CommitKind,
    pub entry_id: EntryId,
    /// States visited, starting at `Unbound`
    pub trail: Vec<CommitState>,
}

/// Tracks and validates transitions of one commit
struct CommitRun {
    state: CommitState,
    trail: Vec<CommitState>,
}

impl CommitRun {
    fn new() -> Self {
        Self {
            state: CommitState::Unbound,
            trail: vec![CommitState::Unbound],
        }
    }

    fn advance(&mut self, next: CommitState) -> Result<(), SyncError> {
        if !self.state.can_transition_to(next) {
            return Err(SyncError::InvalidStateTransition(format!(
                "{} -> {}",
                self.state, next
            )));
        }
        self.state = next;
        self.trail.push(next);
        Ok(())
    }

    fn finish(mut self, kind: CommitKind, entry_id: EntryId) -> Result<CommitOutcome, SyncError> {
        self.advance(CommitState::Bound)?;
        Ok(CommitOutcome {
            kind,
            entry_id,
            trail: self.trail,
        })
    }
}

pub struct CommitEngine<'a> {
    store: &'a dyn RecordStore,
    ignore_unchanged: bool,
}

impl<'a> CommitEngine<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            ignore_unchanged: false,
        }
    }

    /// Skip writing attributes whose value already matches the stored record
    pub fn ignore_unchanged(mut self, ignore: bool) -> Self {
        self.ignore_unchanged = ignore;
        self
    }

    /// Commit `record` to the target store.
    ///
    /// `fallback_keys` are probe fields used when the record lacks one of the
    /// descriptor's qualifiers; after them the instance id and request id
    /// are tried.
    pub async fn commit(
        &self,
        record: &mut Record,
        descriptor: &MergeDescriptor,
        fallback_keys: &[FieldId],
    ) -> Result<CommitOutcome, SyncError> {
        let mut run = CommitRun::new();
        match self.drive(&mut run, record, descriptor, fallback_keys).await {
            Ok((kind, entry_id)) => {
                let outcome = run.finish(kind, entry_id)?;
                debug!(
                    record = %record.describe(),
                    kind = %outcome.kind,
                    merge_type = %descriptor.merge_type,
                    "Commit bound"
                );
                Ok(outcome)
            }
            Err(e) => {
                let failed_in = run.state;
                // Failed is reachable from every non-terminal state
                let _ = run.advance(CommitState::Failed);
                warn!(
                    record = %record.describe(),
                    state = %failed_in,
                    error = %e,
                    "Commit failed"
                );
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        run: &mut CommitRun,
        record: &mut Record,
        descriptor: &MergeDescriptor,
        fallback_keys: &[FieldId],
    ) -> Result<(CommitKind, EntryId), SyncError> {
        run.advance(CommitState::Probing)?;
        let existing = match record.entry_id() {
            Some(id) => Some(id.to_string()),
            None => self.probe(record, descriptor, fallback_keys).await?,
        };

        let Some(entry_id) = existing else {
            if !descriptor.merge_type.allows_create() {
                return Err(SyncError::NotFound(format!(
                    "{} ({}, no existing record)",
                    record.describe(),
                    descriptor.merge_type
                )));
            }
            run.advance(CommitState::Creating)?;
            let entry_id = record.create(self.store).await?;
            info!(record = %record.describe(), "Created");
            return Ok((CommitKind::Created, entry_id));
        };

        match descriptor.merge_type {
            MergeType::CreateOnly => {
                record.bind(entry_id.clone());
                record.mark_clean();
                Ok((CommitKind::Unchanged, entry_id))
            }
            MergeType::UpdateOnly | MergeType::CreateOrUpdate => {
                run.advance(CommitState::Updating)?;
                record.bind(entry_id.clone());
                let kind = self.write(record, CommitKind::Updated).await?;
                Ok((kind, entry_id))
            }
            MergeType::MergeWithQualifiers => {
                run.advance(CommitState::Merging)?;
                record.bind(entry_id.clone());
                // All mapped attributes win, except the identifying qualifiers
                record.touch_all();
                record.retain_changed(|field, _| !descriptor.is_qualifier(field));
                let kind = self.write(record, CommitKind::Merged).await?;
                Ok((kind, entry_id))
            }
        }
    }

    /// Find the entry id of an existing record, if any
    async fn probe(
        &self,
        record: &Record,
        descriptor: &MergeDescriptor,
        fallback_keys: &[FieldId],
    ) -> Result<Option<EntryId>, SyncError> {
        let Some(criteria) = probe_criteria(record, descriptor, fallback_keys) else {
            debug!(record = %record.describe(), "No probe keys, treating as new");
            return Ok(None);
        };

        let mut hits = self.store.search(record.record_type(), &criteria).await?;
        match hits.len() {
            0 => Ok(None),
            1 => Ok(Some(hits.remove(0))),
            count => Err(SyncError::AmbiguousMatch {
                record_type: record.record_type().to_string(),
                criteria: criteria.to_string(),
                count,
            }),
        }
    }

    /// Write the changed set of a bound record, honoring `ignore_unchanged`
    async fn write(&self, record: &mut Record, kind: CommitKind) -> Result<CommitKind, SyncError> {
        if self.ignore_unchanged {
            if let Some(entry_id) = record.entry_id() {
                let stored = self.store.fetch(record.record_type(), entry_id).await?;
                record.retain_changed(|field, value| stored.get(field) != Some(value));
            }
        }

        if record.changed_fields().is_empty() {
            record.mark_clean();
            return Ok(CommitKind::Unchanged);
        }

        record.update(self.store).await?;
        info!(record = %record.describe(), kind = %kind, "Written");
        Ok(kind)
    }
}

/// Build the probe query for a record.
///
/// Qualifier fields come first, but only when the record carries a value for
/// every one of them; otherwise the fallback keys, then the instance id, then
/// the request id.
pub fn probe_criteria(
    record: &Record,
    descriptor: &MergeDescriptor,
    fallback_keys: &[FieldId],
) -> Option<Criteria> {
    if let Some(criteria) = keyed_criteria(record, &descriptor.qualifiers) {
        return Some(criteria);
    }
    if let Some(criteria) = keyed_criteria(record, fallback_keys) {
        return Some(criteria);
    }

    [base::INSTANCE_ID, common::REQUEST_ID]
        .into_iter()
        .find_map(|field| record.get_str(field).map(|v| Criteria::eq(field, v)))
}

/// `f1 = v1 AND f2 = v2 ...`, or `None` if any key is missing or null
fn keyed_criteria(record: &Record, keys: &[FieldId]) -> Option<Criteria> {
    let terms = keys
        .iter()
        .map(|f| {
            record
                .get(*f)
                .filter(|v| !v.is_null())
                .map(|v| Criteria::Eq(*f, Literal::from(v)))
        })
        .collect::<Option<Vec<_>>>()?;
    Criteria::all_of(terms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::record::Value;
    use crate::sync::store::{MemoryStore, StoreOpKind};

    const FORM: &str = "BMC.CORE:BMC_ComputerSystem";

    fn mapped(instance: &str, name: &str) -> Record {
        let mut r = Record::new(FORM);
        r.set(base::INSTANCE_ID, instance);
        r.set(base::NAME, name);
        r
    }

    fn seed(store: &MemoryStore, instance: &str, name: &str) -> EntryId {
        store.insert(
            FORM,
            [
                (base::INSTANCE_ID, Value::from(instance)),
                (base::NAME, Value::from(name)),
            ]
            .into_iter()
            .collect(),
        )
    }

    #[tokio::test]
    async fn test_creates_when_absent() {
        let store = MemoryStore::new("target");
        let engine = CommitEngine::new(&store);
        let mut record = mapped("CI-1", "web01");

        let outcome = engine
            .commit(&mut record, &MergeDescriptor::default(), &[])
            .await
            .unwrap();

        assert_eq!(outcome.kind, CommitKind::Created);
        assert_eq!(
            outcome.trail,
            vec![
                CommitState::Unbound,
                CommitState::Probing,
                CommitState::Creating,
                CommitState::Bound
            ]
        );
        assert_eq!(record.entry_id(), Some(outcome.entry_id.as_str()));
        assert_eq!(store.count(FORM), 1);
    }

    #[tokio::test]
    async fn test_updates_changed_fields_when_present() {
        let store = MemoryStore::new("target");
        let id = seed(&store, "CI-1", "old-name");
        let engine = CommitEngine::new(&store);
        let mut record = mapped("CI-1", "new-name");

        let outcome = engine
            .commit(&mut record, &MergeDescriptor::default(), &[])
            .await
            .unwrap();

        assert_eq!(outcome.kind, CommitKind::Updated);
        assert_eq!(outcome.entry_id, id);
        assert_eq!(
            store.get(FORM, &id).unwrap().get(&base::NAME),
            Some(&Value::from("new-name"))
        );
    }

    #[tokio::test]
    async fn test_update_only_fails_when_absent() {
        let store = MemoryStore::new("target");
        let engine = CommitEngine::new(&store);
        let mut record = mapped("CI-1", "x");
        let descriptor = MergeDescriptor::new(MergeType::UpdateOnly, vec![]);

        let err = engine.commit(&mut record, &descriptor, &[]).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
        assert_eq!(store.count(FORM), 0);
    }

    #[tokio::test]
    async fn test_create_only_leaves_existing() {
        let store = MemoryStore::new("target");
        let id = seed(&store, "CI-1", "keep");
        let engine = CommitEngine::new(&store);
        let mut record = mapped("CI-1", "ignored");
        let descriptor = MergeDescriptor::new(MergeType::CreateOnly, vec![]);

        let outcome = engine.commit(&mut record, &descriptor, &[]).await.unwrap();
        assert_eq!(outcome.kind, CommitKind::Unchanged);
        assert_eq!(outcome.entry_id, id);
        assert!(store.operations_on(StoreOpKind::Update, FORM).is_empty());
        assert_eq!(
            store.get(FORM, &id).unwrap().get(&base::NAME),
            Some(&Value::from("keep"))
        );
    }

    #[tokio::test]
    async fn test_merge_never_overwrites_qualifiers() {
        let store = MemoryStore::new("target");
        let id = store.insert(
            FORM,
            [
                (base::NAME, Value::from("web01")),
                (base::DATASET_ID, Value::from("BMC.ASSET")),
                (8, Value::from("stale")),
            ]
            .into_iter()
            .collect(),
        );
        let engine = CommitEngine::new(&store);
        let descriptor = MergeDescriptor::new(MergeType::MergeWithQualifiers, vec![base::NAME]);

        let mut record = Record::new(FORM);
        record.set(base::NAME, "web01");
        record.set(8, "fresh");
        record.mark_clean();
        record.set(base::DATASET_ID, "BMC.SANDBOX");

        let outcome = engine.commit(&mut record, &descriptor, &[]).await.unwrap();
        assert_eq!(outcome.kind, CommitKind::Merged);
        assert_eq!(outcome.trail[2], CommitState::Merging);

        let stored = store.get(FORM, &id).unwrap();
        assert_eq!(stored.get(&base::NAME), Some(&Value::from("web01")));
        // merged even though it was not in the changed set
        assert_eq!(stored.get(&8), Some(&Value::from("fresh")));
        assert_eq!(stored.get(&base::DATASET_ID), Some(&Value::from("BMC.SANDBOX")));
        let update = &store.operations_on(StoreOpKind::Update, FORM)[0];
        assert_eq!(update.entry_id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_ambiguous_probe_fails() {
        let store = MemoryStore::new("target");
        seed(&store, "CI-1", "a");
        seed(&store, "CI-1", "b");
        let engine = CommitEngine::new(&store);
        let mut record = mapped("CI-1", "c");

        let err = engine
            .commit(&mut record, &MergeDescriptor::default(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::AmbiguousMatch { count: 2, .. }));
        assert!(!record.is_bound());
    }

    #[tokio::test]
    async fn test_ignore_unchanged_skips_identical_write() {
        let store = MemoryStore::new("target");
        seed(&store, "CI-1", "same");
        let engine = CommitEngine::new(&store).ignore_unchanged(true);
        let mut record = mapped("CI-1", "same");

        let outcome = engine
            .commit(&mut record, &MergeDescriptor::default(), &[])
            .await
            .unwrap();
        assert_eq!(outcome.kind, CommitKind::Unchanged);
        assert!(store.operations_on(StoreOpKind::Update, FORM).is_empty());
    }

    #[test]
    fn test_probe_criteria_precedence() {
        let mut record = mapped("CI-1", "web01");
        record.set(base::DATASET_ID, "BMC.ASSET");

        let q = MergeDescriptor::new(
            MergeType::MergeWithQualifiers,
            vec![base::NAME, base::RECONCILIATION_ID],
        );
        // a missing qualifier disables the qualifier probe
        assert_eq!(
            probe_criteria(&record, &q, &[]).unwrap().to_string(),
            "'179' = \"CI-1\""
        );
        record.set(base::RECONCILIATION_ID, "RE-1");
        assert_eq!(
            probe_criteria(&record, &q, &[]).unwrap().to_string(),
            "'400127300' = \"web01\" AND '400129200' = \"RE-1\""
        );
        record.set(base::RECONCILIATION_ID, Value::Null);
        assert_eq!(
            probe_criteria(&record, &q, &[base::DATASET_ID])
                .unwrap()
                .to_string(),
            "'400127400' = \"BMC.ASSET\""
        );

        let d = MergeDescriptor::default();
        assert_eq!(
            probe_criteria(&record, &d, &[base::DATASET_ID])
                .unwrap()
                .to_string(),
            "'400127400' = \"BMC.ASSET\""
        );
        assert_eq!(
            probe_criteria(&record, &d, &[]).unwrap().to_string(),
            "'179' = \"CI-1\""
        );
        assert!(probe_criteria(&Record::new(FORM), &d, &[]).is_none());
    }
}
