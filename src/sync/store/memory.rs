//! In-memory record store
//!
//! Full [`RecordStore`] implementation over nested maps. Used by the CLI
//! (loaded from and saved to JSON snapshots) and by tests, which rely on its
//! operation log and fault injection.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core_types::{Attributes, EntryId, FieldId};
use crate::fields::common;
use crate::sync::criteria::Criteria;
use crate::sync::record::{Record, Value};

use super::{OperationMode, RecordStore, StoreError};

/// A field the store fills in on create, e.g. `PPL000000000001`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedField {
    pub field: FieldId,
    pub prefix: String,
}

/// Serializable store contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub forms: BTreeMap<String, BTreeMap<EntryId, Attributes>>,
    #[serde(default)]
    pub generated: BTreeMap<String, Vec<GeneratedField>>,
    /// Fields that may only be written in `System` mode
    #[serde(default)]
    pub protected: BTreeSet<FieldId>,
    #[serde(default)]
    pub next_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOpKind {
    Search,
    Fetch,
    Create,
    Update,
    SetMode,
}

/// One logged store call
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOp {
    pub kind: StoreOpKind,
    pub record_type: String,
    pub entry_id: Option<EntryId>,
    pub mode: OperationMode,
}

#[derive(Default)]
struct StoreState {
    snapshot: StoreSnapshot,
    mode: OperationMode,
    log: Vec<StoreOp>,
    faults: Vec<(StoreOpKind, String)>,
}

impl StoreState {
    fn record(&mut self, kind: StoreOpKind, record_type: &str, entry_id: Option<&str>) {
        self.log.push(StoreOp {
            kind,
            record_type: record_type.to_string(),
            entry_id: entry_id.map(str::to_string),
            mode: self.mode,
        });
    }

    fn check_fault(&self, kind: StoreOpKind, record_type: &str) -> Result<(), StoreError> {
        if self
            .faults
            .iter()
            .any(|(k, rt)| *k == kind && rt == record_type)
        {
            return Err(StoreError::Unavailable(format!(
                "injected {:?} failure on {}",
                kind, record_type
            )));
        }
        Ok(())
    }

    fn next_id(&mut self) -> u64 {
        self.snapshot.next_id += 1;
        self.snapshot.next_id
    }
}

/// In-memory store
pub struct MemoryStore {
    name: String,
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_snapshot(name, StoreSnapshot::default())
    }

    pub fn from_snapshot(name: impl Into<String>, snapshot: StoreSnapshot) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(StoreState {
                snapshot,
                ..StoreState::default()
            }),
        }
    }

    /// Load a store from a JSON snapshot file
    pub fn load_json(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Snapshot(format!("{}: {}", path.display(), e)))?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)
            .map_err(|e| StoreError::Snapshot(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_snapshot(name, snapshot))
    }

    /// Write the current contents as a JSON snapshot file
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| StoreError::Snapshot(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| StoreError::Snapshot(format!("{}: {}", path.display(), e)))
    }

    /// Fill `field` with a prefixed sequence value on every create of `record_type`
    pub fn with_generated_field(
        self,
        record_type: impl Into<String>,
        field: FieldId,
        prefix: impl Into<String>,
    ) -> Self {
        self.lock()
            .snapshot
            .generated
            .entry(record_type.into())
            .or_default()
            .push(GeneratedField {
                field,
                prefix: prefix.into(),
            });
        self
    }

    /// Reject writes of `field` outside `System` mode
    pub fn with_protected_field(self, field: FieldId) -> Self {
        self.lock().snapshot.protected.insert(field);
        self
    }

    /// Make every `kind` call on `record_type` fail
    pub fn fail_on(&self, kind: StoreOpKind, record_type: impl Into<String>) {
        self.lock().faults.push((kind, record_type.into()));
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Seed an entry directly, bypassing the log and protection
    pub fn insert(&self, record_type: &str, mut attributes: Attributes) -> EntryId {
        let mut state = self.lock();
        let entry_id = format_entry_id(state.next_id());
        attributes.insert(common::REQUEST_ID, Value::Char(entry_id.clone()));
        state
            .snapshot
            .forms
            .entry(record_type.to_string())
            .or_default()
            .insert(entry_id.clone(), attributes);
        entry_id
    }

    pub fn get(&self, record_type: &str, entry_id: &str) -> Option<Attributes> {
        self.lock()
            .snapshot
            .forms
            .get(record_type)
            .and_then(|entries| entries.get(entry_id))
            .cloned()
    }

    /// All stored records of a type, in entry id order
    pub fn records(&self, record_type: &str) -> Vec<Record> {
        self.lock()
            .snapshot
            .forms
            .get(record_type)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(id, attrs)| Record::fetched(record_type, id.clone(), attrs.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self, record_type: &str) -> usize {
        self.lock()
            .snapshot
            .forms
            .get(record_type)
            .map_or(0, BTreeMap::len)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn mode(&self) -> OperationMode {
        self.lock().mode
    }

    /// Every logged call so far
    pub fn operations(&self) -> Vec<StoreOp> {
        self.lock().log.clone()
    }

    /// Logged calls of one kind on one record type
    pub fn operations_on(&self, kind: StoreOpKind, record_type: &str) -> Vec<StoreOp> {
        self.lock()
            .log
            .iter()
            .filter(|op| op.kind == kind && op.record_type == record_type)
            .cloned()
            .collect()
    }

    pub fn clear_operations(&self) {
        self.lock().log.clear();
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // The state stays consistent across a panicking test thread
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn format_entry_id(n: u64) -> EntryId {
    format!("{:015}", n)
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        record_type: &str,
        criteria: &Criteria,
    ) -> Result<Vec<EntryId>, StoreError> {
        let mut state = self.lock();
        state.record(StoreOpKind::Search, record_type, None);
        state.check_fault(StoreOpKind::Search, record_type)?;

        let hits: Vec<EntryId> = state
            .snapshot
            .forms
            .get(record_type)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, attrs)| criteria.matches(attrs))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();

        trace!(store = %self.name, record_type, criteria = %criteria, hits = hits.len(), "search");
        Ok(hits)
    }

    async fn fetch(&self, record_type: &str, entry_id: &str) -> Result<Record, StoreError> {
        let mut state = self.lock();
        state.record(StoreOpKind::Fetch, record_type, Some(entry_id));
        state.check_fault(StoreOpKind::Fetch, record_type)?;

        state
            .snapshot
            .forms
            .get(record_type)
            .and_then(|entries| entries.get(entry_id))
            .map(|attrs| Record::fetched(record_type, entry_id, attrs.clone()))
            .ok_or_else(|| StoreError::MissingEntry {
                record_type: record_type.to_string(),
                entry_id: entry_id.to_string(),
            })
    }

    async fn create(
        &self,
        record_type: &str,
        attributes: &Attributes,
    ) -> Result<EntryId, StoreError> {
        let mut state = self.lock();
        state.record(StoreOpKind::Create, record_type, None);
        state.check_fault(StoreOpKind::Create, record_type)?;
        check_protected(&state, record_type, attributes)?;

        let n = state.next_id();
        let entry_id = format_entry_id(n);
        let mut stored: Attributes = attributes
            .iter()
            .filter(|(field, _)| !common::STORE_ASSIGNED.contains(*field))
            .map(|(field, value)| (*field, value.clone()))
            .collect();
        stored.insert(common::REQUEST_ID, Value::Char(entry_id.clone()));
        if let Some(generated) = state.snapshot.generated.get(record_type) {
            for g in generated {
                stored.insert(g.field, Value::Char(format!("{}{:012}", g.prefix, n)));
            }
        }

        state
            .snapshot
            .forms
            .entry(record_type.to_string())
            .or_default()
            .insert(entry_id.clone(), stored);

        if let Some(op) = state.log.last_mut() {
            op.entry_id = Some(entry_id.clone());
        }
        debug!(store = %self.name, record_type, entry_id = %entry_id, "created");
        Ok(entry_id)
    }

    async fn update(
        &self,
        record_type: &str,
        entry_id: &str,
        attributes: &Attributes,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.record(StoreOpKind::Update, record_type, Some(entry_id));
        state.check_fault(StoreOpKind::Update, record_type)?;
        check_protected(&state, record_type, attributes)?;

        let entry = state
            .snapshot
            .forms
            .get_mut(record_type)
            .and_then(|entries| entries.get_mut(entry_id))
            .ok_or_else(|| StoreError::MissingEntry {
                record_type: record_type.to_string(),
                entry_id: entry_id.to_string(),
            })?;
        for (field, value) in attributes {
            if *field != common::REQUEST_ID {
                entry.insert(*field, value.clone());
            }
        }

        debug!(store = %self.name, record_type, entry_id, fields = attributes.len(), "updated");
        Ok(())
    }

    async fn set_operation_mode(&self, mode: OperationMode) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.mode = mode;
        state.record(StoreOpKind::SetMode, "", None);
        Ok(())
    }
}

fn check_protected(
    state: &StoreState,
    record_type: &str,
    attributes: &Attributes,
) -> Result<(), StoreError> {
    if state.mode == OperationMode::System {
        return Ok(());
    }
    match attributes
        .keys()
        .find(|field| state.snapshot.protected.contains(*field))
    {
        Some(field) => Err(StoreError::Rejected {
            record_type: record_type.to_string(),
            message: format!("field {} requires system mode", field),
        }),
        None => Ok(()),
    }
}
