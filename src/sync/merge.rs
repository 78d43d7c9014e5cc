//! Merge descriptors
//!
//! How an existing target record is treated when a probe finds it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core_types::FieldId;

use super::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeType {
    /// Create when absent, leave an existing record untouched
    CreateOnly,
    /// Update when present, fail when absent
    UpdateOnly,
    CreateOrUpdate,
    /// Like `CreateOrUpdate`, but qualifier fields are never overwritten
    MergeWithQualifiers,
}

impl MergeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeType::CreateOnly => "CREATE_ONLY",
            MergeType::UpdateOnly => "UPDATE_ONLY",
            MergeType::CreateOrUpdate => "CREATE_OR_UPDATE",
            MergeType::MergeWithQualifiers => "MERGE_WITH_QUALIFIERS",
        }
    }

    /// Whether a missing record may be created
    pub fn allows_create(&self) -> bool {
        !matches!(self, MergeType::UpdateOnly)
    }
}

impl fmt::Display for MergeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MergeType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATE_ONLY" => Ok(MergeType::CreateOnly),
            "UPDATE_ONLY" => Ok(MergeType::UpdateOnly),
            "CREATE_OR_UPDATE" => Ok(MergeType::CreateOrUpdate),
            "MERGE_WITH_QUALIFIERS" => Ok(MergeType::MergeWithQualifiers),
            other => Err(SyncError::Config(format!("unknown merge type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDescriptor {
    pub merge_type: MergeType,
    /// Probe keys; under `MergeWithQualifiers` also write-protected
    #[serde(default)]
    pub qualifiers: Vec<FieldId>,
}

impl MergeDescriptor {
    pub fn new(merge_type: MergeType, qualifiers: Vec<FieldId>) -> Self {
        Self {
            merge_type,
            qualifiers,
        }
    }

    pub fn is_qualifier(&self, field: FieldId) -> bool {
        self.qualifiers.contains(&field)
    }
}

impl Default for MergeDescriptor {
    fn default() -> Self {
        Self::new(MergeType::CreateOrUpdate, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_merge_type() {
        assert_eq!(
            "merge_with_qualifiers".parse::<MergeType>().unwrap(),
            MergeType::MergeWithQualifiers
        );
        assert!("REPLACE".parse::<MergeType>().is_err());
    }

    #[test]
    fn test_allows_create() {
        assert!(MergeType::CreateOnly.allows_create());
        assert!(MergeType::MergeWithQualifiers.allows_create());
        assert!(!MergeType::UpdateOnly.allows_create());
    }

    #[test]
    fn test_descriptor_yaml() {
        let d: MergeDescriptor =
            serde_yaml::from_str("merge_type: MERGE_WITH_QUALIFIERS\nqualifiers: [179, 400129200]")
                .unwrap();
        assert!(d.is_qualifier(179));
        assert_eq!(d.merge_type.to_string(), "MERGE_WITH_QUALIFIERS");
    }
}
