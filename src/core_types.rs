//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

use std::collections::BTreeMap;

use crate::sync::record::Value;

/// Field ID - numeric attribute identifier.
///
/// # Constraints:
/// - **Record-type scoped**: the same number may mean different things on
///   different record types
/// - **Stable**: field numbers never change once a record type is deployed
pub type FieldId = u32;

/// Entry ID - store-assigned identifier of a stored record.
///
/// Only meaningful within the store that assigned it.
pub type EntryId = String;

/// Attribute bag as exchanged with a store
pub type Attributes = BTreeMap<FieldId, Value>;
