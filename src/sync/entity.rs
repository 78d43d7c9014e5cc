//! Managed entity: the anchor configuration record and its parts.
//!
//! The entity exclusively owns its part collections. Parts are addressed
//! by [`PartRef`] (code + index) and never hold a pointer to their owner.

use std::collections::BTreeMap;
use std::fmt;

use crate::fields::base;

use super::catalog::{ClassCatalog, ClassSelector};
use super::error::SyncError;
use super::parts::PartCode;
use super::record::Record;

/// Back-reference from a part to its slot in the owning entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartRef {
    pub code: PartCode,
    pub index: usize,
}

impl fmt::Display for PartRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.code, self.index)
    }
}

#[derive(Debug, Clone)]
pub struct ManagedEntity {
    class_id: String,
    record: Record,
    parts: BTreeMap<PartCode, Vec<Record>>,
}

impl ManagedEntity {
    pub fn new(class_id: impl Into<String>, form: impl Into<String>) -> Self {
        Self {
            class_id: class_id.into(),
            record: Record::new(form),
            parts: BTreeMap::new(),
        }
    }

    /// Create an empty entity, deriving the missing half of class/form
    pub fn from_selector(
        selector: &ClassSelector,
        catalog: &ClassCatalog,
    ) -> Result<Self, SyncError> {
        let (class_id, form) = catalog.resolve(selector)?;
        Ok(Self::new(class_id, form))
    }

    /// Empty entity of the same class, for the other side of a transfer
    pub fn empty_like(&self) -> Self {
        Self::new(self.class_id.clone(), self.form())
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn form(&self) -> &str {
        self.record.record_type()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    pub fn entry_id(&self) -> Option<&str> {
        self.record.entry_id()
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.record.get_str(base::INSTANCE_ID)
    }

    pub fn reconciliation_id(&self) -> Option<&str> {
        self.record.get_str(base::RECONCILIATION_ID)
    }

    pub fn dataset_id(&self) -> Option<&str> {
        self.record.get_str(base::DATASET_ID)
    }

    pub fn parts(&self, code: PartCode) -> &[Record] {
        self.parts.get(&code).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_parts(&mut self, code: PartCode, members: Vec<Record>) {
        self.parts.insert(code, members);
    }

    pub fn part(&self, part: PartRef) -> Option<&Record> {
        self.parts.get(&part.code).and_then(|m| m.get(part.index))
    }
}

impl fmt::Display for ManagedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.class_id, self.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_selector_derives_form() {
        let mut catalog = ClassCatalog::new();
        catalog.register("BMC_COMPUTERSYSTEM", "BMC.CORE:BMC_ComputerSystem");
        let entity = ManagedEntity::from_selector(
            &ClassSelector::ClassId("BMC_COMPUTERSYSTEM".into()),
            &catalog,
        )
        .unwrap();
        assert_eq!(entity.form(), "BMC.CORE:BMC_ComputerSystem");
        assert!(entity.entry_id().is_none());
    }

    #[test]
    fn test_part_refs_address_owned_parts() {
        let mut entity = ManagedEntity::new("C", "F");
        entity.set_parts(PartCode::WorkInfo, vec![Record::new("W"), Record::new("W")]);
        entity.set_parts(PartCode::CiRelation, vec![Record::new("R")]);

        let last = PartRef { code: PartCode::WorkInfo, index: 1 };
        assert_eq!(entity.part(last).unwrap().record_type(), "W");
        assert_eq!(entity.parts(PartCode::CiRelation).len(), 1);
        assert_eq!(last.to_string(), "workinfo[1]");
        assert!(entity.part(PartRef { code: PartCode::ImpactedArea, index: 0 }).is_none());
    }
}
