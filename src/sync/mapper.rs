//! Field Mapper
//!
//! Copies attribute values from a source record into a target record of a
//! possibly different record type, translating field ids through a
//! directional mapping table. Unmapped source fields are dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core_types::FieldId;

use super::record::{Record, Value};

/// Directional `source field -> target field` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<FieldId, FieldId>);

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (FieldId, FieldId)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    /// Map each field onto itself
    pub fn identity(fields: impl IntoIterator<Item = FieldId>) -> Self {
        Self(fields.into_iter().map(|f| (f, f)).collect())
    }

    /// Identity over a record's present fields, minus `excluded`
    pub fn identity_for(record: &Record, excluded: &[FieldId]) -> Self {
        Self::identity(
            record
                .attributes()
                .keys()
                .copied()
                .filter(|f| !excluded.contains(f)),
        )
    }

    pub fn insert(&mut self, source: FieldId, target: FieldId) {
        self.0.insert(source, target);
    }

    pub fn get(&self, source: FieldId) -> Option<FieldId> {
        self.0.get(&source).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldId, FieldId)> + '_ {
        self.0.iter().map(|(s, t)| (*s, *t))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Copy mapped attributes from `source` into `target`.
///
/// With `only_changed`, only fields in `source`'s changed set are copied.
/// A mapped field absent from `source` is written as [`Value::Null`].
/// Returns the number of attributes written.
pub fn transfer(
    source: &Record,
    target: &mut Record,
    mapping: &FieldMapping,
    only_changed: bool,
) -> usize {
    let mut written = 0;
    for (src, dst) in mapping.iter() {
        if only_changed && !source.is_changed(src) {
            continue;
        }
        let value = source.get(src).cloned().unwrap_or(Value::Null);
        target.set(dst, value);
        written += 1;
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Record {
        let mut r = Record::fetched("SRC", "000000000000001", Default::default());
        r.set(8, "description");
        r.set(179, "CI-1");
        r.mark_clean();
        r.set(7, Value::Integer(1));
        r
    }

    #[test]
    fn test_transfer_all_fields() {
        let src = source();
        let mut dst = Record::new("DST");
        let mapping = FieldMapping::from_pairs([(8, 1000), (179, 179), (7, 7)]);
        let written = transfer(&src, &mut dst, &mapping, false);

        assert_eq!(written, 3);
        for (s, d) in mapping.iter() {
            assert_eq!(dst.get(d), src.get(s));
            assert!(dst.is_changed(d));
        }
        assert!(dst.get(8).is_none());
    }

    #[test]
    fn test_transfer_only_changed() {
        let src = source();
        let mut dst = Record::new("DST");
        let mapping = FieldMapping::from_pairs([(8, 8), (179, 179), (7, 7)]);
        let written = transfer(&src, &mut dst, &mapping, true);

        assert_eq!(written, 1);
        assert_eq!(dst.get(7), Some(&Value::Integer(1)));
        assert!(dst.get(179).is_none());
    }

    #[test]
    fn test_absent_source_field_maps_to_null() {
        let src = source();
        let mut dst = Record::new("DST");
        transfer(&src, &mut dst, &FieldMapping::from_pairs([(9999, 42)]), false);
        assert_eq!(dst.get(42), Some(&Value::Null));
    }

    #[test]
    fn test_source_untouched() {
        let src = source();
        let before = src.clone();
        let mut dst = Record::new("DST");
        transfer(&src, &mut dst, &FieldMapping::identity([8, 179]), false);
        assert_eq!(src, before);
    }

    #[test]
    fn test_identity_for_excludes_fields() {
        let src = source();
        let mapping = FieldMapping::identity_for(&src, &[179]);
        assert_eq!(mapping.len(), 2);
        assert!(mapping.get(179).is_none());
        assert_eq!(mapping.get(8), Some(8));
    }
}
