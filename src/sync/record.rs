//! Generic attribute-bag record with change tracking.
//!
//! A [`Record`] is *unbound* until it has an entry id in some store.
//! `read` binds it on a single unambiguous match, `create` binds a new
//! entry, and every successful store round-trip clears the changed set.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{Attributes, EntryId, FieldId};
use crate::fields::base;

use super::criteria::{Criteria, Literal};
use super::error::SyncError;
use super::store::RecordStore;

/// Typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Char(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Non-empty character value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Char(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub(crate) fn matches_literal(&self, literal: &Literal) -> bool {
        match (self, literal) {
            (Value::Null, Literal::Null) => true,
            (Value::Char(s), Literal::Str(l)) => s == l,
            (Value::Char(s), Literal::Int(i)) => s.parse::<i64>().is_ok_and(|v| v == *i),
            (Value::Integer(v), Literal::Int(i)) => v == i,
            (Value::Integer(v), Literal::Str(s)) => s.parse::<i64>().is_ok_and(|i| i == *v),
            (Value::Real(v), Literal::Real(r)) => v == r,
            (Value::Real(v), Literal::Int(i)) => *v == *i as f64,
            (Value::Timestamp(t), Literal::Int(i)) => t.timestamp() == *i,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("<null>"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Char(s) => f.write_str(s),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Char(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Char(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

/// Attribute bag bound (or not) to an entry in a store
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    record_type: String,
    attributes: Attributes,
    changed: BTreeSet<FieldId>,
    entry_id: Option<EntryId>,
}

impl Record {
    /// Create an empty, unbound record
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            attributes: Attributes::new(),
            changed: BTreeSet::new(),
            entry_id: None,
        }
    }

    /// Create an unbound record with every attribute marked changed
    pub fn with_attributes(record_type: impl Into<String>, attributes: Attributes) -> Self {
        let changed = attributes.keys().copied().collect();
        Self {
            record_type: record_type.into(),
            attributes,
            changed,
            entry_id: None,
        }
    }

    /// Record as fetched from a store: bound, nothing changed
    pub fn fetched(
        record_type: impl Into<String>,
        entry_id: impl Into<EntryId>,
        attributes: Attributes,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            attributes,
            changed: BTreeSet::new(),
            entry_id: Some(entry_id.into()),
        }
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn entry_id(&self) -> Option<&str> {
        self.entry_id.as_deref()
    }

    pub fn is_bound(&self) -> bool {
        self.entry_id.is_some()
    }

    pub fn get(&self, id: FieldId) -> Option<&Value> {
        self.attributes.get(&id)
    }

    /// Non-empty character value of a field
    pub fn get_str(&self, id: FieldId) -> Option<&str> {
        self.get(id).and_then(Value::as_str)
    }

    /// Set an attribute and mark it changed
    pub fn set(&mut self, id: FieldId, value: impl Into<Value>) {
        self.attributes.insert(id, value.into());
        self.changed.insert(id);
    }

    /// Remove an attribute entirely
    pub fn remove(&mut self, id: FieldId) -> Option<Value> {
        self.changed.remove(&id);
        self.attributes.remove(&id)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn changed_fields(&self) -> &BTreeSet<FieldId> {
        &self.changed
    }

    pub fn is_changed(&self, id: FieldId) -> bool {
        self.changed.contains(&id)
    }

    /// Attributes in the changed set
    pub fn changed_attributes(&self) -> Attributes {
        self.changed
            .iter()
            .filter_map(|id| self.attributes.get(id).map(|v| (*id, v.clone())))
            .collect()
    }

    /// Mark every present attribute changed
    pub fn touch_all(&mut self) {
        self.changed = self.attributes.keys().copied().collect();
    }

    /// Keep only the changed fields for which `keep` returns true
    pub fn retain_changed(&mut self, mut keep: impl FnMut(FieldId, &Value) -> bool) {
        let attributes = &self.attributes;
        self.changed
            .retain(|id| attributes.get(id).is_some_and(|v| keep(*id, v)));
    }

    /// Empty all attributes and unbind
    pub fn clear(&mut self) {
        self.attributes.clear();
        self.changed.clear();
        self.entry_id = None;
    }

    pub(crate) fn bind(&mut self, entry_id: EntryId) {
        self.entry_id = Some(entry_id);
    }

    pub(crate) fn mark_clean(&mut self) {
        self.changed.clear();
    }

    /// Look up this record by `criteria`.
    ///
    /// Returns `Ok(true)` and binds on exactly one match, `Ok(false)` on none.
    pub async fn read(
        &mut self,
        store: &dyn RecordStore,
        criteria: &Criteria,
    ) -> Result<bool, SyncError> {
        let mut hits = store.search(&self.record_type, criteria).await?;
        match hits.len() {
            0 => Ok(false),
            1 => {
                let entry_id = hits.remove(0);
                self.load(store, &entry_id).await?;
                Ok(true)
            }
            count => Err(SyncError::AmbiguousMatch {
                record_type: self.record_type.clone(),
                criteria: criteria.to_string(),
                count,
            }),
        }
    }

    /// Replace this record's contents with the stored entry
    pub async fn load(&mut self, store: &dyn RecordStore, entry_id: &str) -> Result<(), SyncError> {
        let fetched = store.fetch(&self.record_type, entry_id).await?;
        self.attributes = fetched.attributes;
        self.entry_id = Some(entry_id.to_string());
        self.changed.clear();
        Ok(())
    }

    /// Re-fetch a bound record, picking up store-assigned values
    pub async fn reload(&mut self, store: &dyn RecordStore) -> Result<(), SyncError> {
        let entry_id = self
            .entry_id
            .clone()
            .ok_or_else(|| SyncError::NotFound(self.describe()))?;
        self.load(store, &entry_id).await
    }

    /// Write all attributes as a new entry
    pub async fn create(&mut self, store: &dyn RecordStore) -> Result<EntryId, SyncError> {
        if self.is_bound() {
            return Err(SyncError::AlreadyExists(self.describe()));
        }
        let entry_id = store.create(&self.record_type, &self.attributes).await?;
        self.entry_id = Some(entry_id.clone());
        self.changed.clear();
        Ok(entry_id)
    }

    /// Write the changed attributes to the bound entry
    pub async fn update(&mut self, store: &dyn RecordStore) -> Result<(), SyncError> {
        let Some(entry_id) = self.entry_id.as_deref() else {
            return Err(SyncError::NotFound(self.describe()));
        };
        let changed = self.changed_attributes();
        store.update(&self.record_type, entry_id, &changed).await?;
        self.changed.clear();
        Ok(())
    }

    /// Short descriptive string for logs and reports
    pub fn describe(&self) -> String {
        let entry = self.entry_id.as_deref().unwrap_or("<unbound>");
        match self.get_str(base::INSTANCE_ID) {
            Some(instance) => format!("{} {} ({})", self.record_type, entry, instance),
            None => format!("{} {}", self.record_type, entry),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::store::MemoryStore;

    const FORM: &str = "TEST:Form";

    #[test]
    fn test_set_marks_changed() {
        let mut r = Record::new(FORM);
        r.set(8, "hello");
        assert!(r.is_changed(8));
        assert_eq!(r.get_str(8), Some("hello"));
        assert!(!r.is_bound());
    }

    #[test]
    fn test_clear_unbinds() {
        let mut r = Record::fetched(FORM, "000000000000001", Attributes::new());
        r.set(8, "x");
        r.clear();
        assert!(!r.is_bound());
        assert!(r.attributes().is_empty());
        assert!(r.changed_fields().is_empty());
    }

    #[test]
    fn test_empty_char_is_not_a_string_value() {
        let mut r = Record::new(FORM);
        r.set(8, "");
        assert_eq!(r.get_str(8), None);
    }

    #[tokio::test]
    async fn test_read_binds_single_match() {
        let store = MemoryStore::new("target");
        let id = store.insert(FORM, [(179, Value::from("CI-1"))].into_iter().collect());

        let mut r = Record::new(FORM);
        r.set(8, "pending");
        let found = r.read(&store, &Criteria::eq(179, "CI-1")).await.unwrap();
        assert!(found);
        assert_eq!(r.entry_id(), Some(id.as_str()));
        assert!(r.changed_fields().is_empty());
        assert_eq!(r.get_str(179), Some("CI-1"));
    }

    #[tokio::test]
    async fn test_read_no_match_leaves_unbound() {
        let store = MemoryStore::new("target");
        let mut r = Record::new(FORM);
        let found = r.read(&store, &Criteria::eq(179, "missing")).await.unwrap();
        assert!(!found);
        assert!(!r.is_bound());
    }

    #[tokio::test]
    async fn test_read_ambiguous() {
        let store = MemoryStore::new("target");
        store.insert(FORM, [(8, Value::from("dup"))].into_iter().collect());
        store.insert(FORM, [(8, Value::from("dup"))].into_iter().collect());

        let mut r = Record::new(FORM);
        let err = r.read(&store, &Criteria::eq(8, "dup")).await.unwrap_err();
        assert!(matches!(err, SyncError::AmbiguousMatch { count: 2, .. }));
        assert!(!r.is_bound());
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = MemoryStore::new("target");
        let mut r = Record::new(FORM);
        r.set(8, "new");
        r.create(&store).await.unwrap();
        assert!(r.changed_fields().is_empty());
        let err = r.create(&store).await.unwrap_err();
        assert!(matches!(err, SyncError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_unbound_fails() {
        let store = MemoryStore::new("target");
        let mut r = Record::new(FORM);
        r.set(8, "x");
        let err = r.update(&store).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_writes_changed_only() {
        let store = MemoryStore::new("target");
        let id = store.insert(
            FORM,
            [(8, Value::from("old")), (7, Value::Integer(1))]
                .into_iter()
                .collect(),
        );
        let mut r = Record::new(FORM);
        r.load(&store, &id).await.unwrap();
        r.set(8, "new");
        r.update(&store).await.unwrap();

        let stored = store.get(FORM, &id).unwrap();
        assert_eq!(stored.get(&8), Some(&Value::from("new")));
        assert_eq!(stored.get(&7), Some(&Value::Integer(1)));
        assert!(r.changed_fields().is_empty());
    }

    #[test]
    fn test_describe() {
        let mut r = Record::fetched(FORM, "000000000000007", Attributes::new());
        assert_eq!(r.describe(), "TEST:Form 000000000000007");
        r.set(base::INSTANCE_ID, "CI-9");
        assert_eq!(r.describe(), "TEST:Form 000000000000007 (CI-9)");
    }
}
