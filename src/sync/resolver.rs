//! Identity Resolver
//!
//! Binds a foreign reference carried by a part (a person, a site, a cost
//! center) to the equivalent record in the target store.
//!
//! Lookup order for one reference:
//!
//! ```text
//! 1. primary key          ──found──→ Found
//! 2. secondary key        ──found──→ Found
//! 3. bridge (source side) → its primary/secondary keys → 1, 2
//! 4. create from the source-side record
//!      dependencies first (site before person), then the record itself
//! ```
//!
//! Without a bridge and without a local match the reference is unresolved.
//! Resolved ids are cached for the duration of one transfer only.

use std::collections::BTreeMap;
use std::fmt;

use futures::future::{BoxFuture, FutureExt};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core_types::{EntryId, FieldId};
use crate::fields::{common, cost_center, forms, people, site};

use super::criteria::Criteria;
use super::error::SyncError;
use super::record::Record;
use super::store::RecordStore;

/// Dependency chains deeper than this are treated as cycles
const MAX_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForeignKind {
    Person,
    Site,
    CostCenter,
}

impl ForeignKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForeignKind::Person => "person",
            ForeignKind::Site => "site",
            ForeignKind::CostCenter => "costcenter",
        }
    }
}

impl fmt::Display for ForeignKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A field of a foreign record that references another foreign record
#[derive(Debug, Clone, Copy)]
pub struct DependencyLink {
    pub kind: ForeignKind,
    pub field: FieldId,
}

/// How one kind of foreign record is looked up and bootstrapped
#[derive(Debug, Clone)]
pub struct ForeignProfile {
    pub kind: ForeignKind,
    pub record_type: String,
    /// Store-assigned id that other records reference this one by
    pub reference_key: FieldId,
    pub primary_key: FieldId,
    pub secondary_key: Option<FieldId>,
    /// Not copied when bootstrapping into another store
    pub store_assigned: Vec<FieldId>,
    /// Resolved and rewritten before this record is created
    pub dependencies: Vec<DependencyLink>,
}

impl ForeignProfile {
    fn lookup_keys(&self) -> impl Iterator<Item = FieldId> + '_ {
        std::iter::once(self.primary_key).chain(self.secondary_key)
    }

    fn is_store_assigned(&self, field: FieldId) -> bool {
        common::STORE_ASSIGNED.contains(&field) || self.store_assigned.contains(&field)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    profiles: BTreeMap<ForeignKind, ForeignProfile>,
}

impl ProfileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut catalog = Self::new();
        catalog.register(ForeignProfile {
            kind: ForeignKind::Person,
            record_type: forms::PEOPLE.to_string(),
            reference_key: people::PERSON_ID,
            primary_key: people::LOGIN_ID,
            secondary_key: Some(people::CORPORATE_ID),
            store_assigned: vec![people::PERSON_ID],
            dependencies: vec![
                DependencyLink {
                    kind: ForeignKind::Site,
                    field: people::SITE_ID,
                },
                DependencyLink {
                    kind: ForeignKind::CostCenter,
                    field: people::COST_CENTER_ID,
                },
            ],
        });
        catalog.register(ForeignProfile {
            kind: ForeignKind::Site,
            record_type: forms::SITE.to_string(),
            reference_key: site::SITE_ID,
            primary_key: site::NAME,
            secondary_key: None,
            store_assigned: vec![site::SITE_ID],
            dependencies: Vec::new(),
        });
        catalog.register(ForeignProfile {
            kind: ForeignKind::CostCenter,
            record_type: forms::COST_CENTER.to_string(),
            reference_key: cost_center::COST_CENTER_ID,
            primary_key: cost_center::CODE,
            secondary_key: None,
            store_assigned: vec![cost_center::COST_CENTER_ID],
            dependencies: Vec::new(),
        });
        catalog
    }

    pub fn register(&mut self, profile: ForeignProfile) {
        self.profiles.insert(profile.kind, profile);
    }

    pub fn get(&self, kind: ForeignKind) -> Result<&ForeignProfile, SyncError> {
        self.profiles
            .get(&kind)
            .ok_or_else(|| SyncError::Config(format!("no profile for foreign kind {}", kind)))
    }
}

/// Target entry ids resolved during one transfer
#[derive(Debug, Default)]
pub struct ResolutionCache {
    /// `(kind, key field, key value)` → target entry id
    keys: FxHashMap<(ForeignKind, FieldId, String), EntryId>,
    /// `(kind, source reference value)` → target entry id
    bridged: FxHashMap<(ForeignKind, String), EntryId>,
    hits: usize,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(&mut self, kind: ForeignKind, field: FieldId, value: &str) -> Option<EntryId> {
        let hit = self.keys.get(&(kind, field, value.to_string())).cloned();
        if hit.is_some() {
            self.hits += 1;
        }
        hit
    }

    fn bridged(&mut self, kind: ForeignKind, reference: &str) -> Option<EntryId> {
        let hit = self.bridged.get(&(kind, reference.to_string())).cloned();
        if hit.is_some() {
            self.hits += 1;
        }
        hit
    }

    fn remember(&mut self, profile: &ForeignProfile, record: &Record) {
        let Some(entry_id) = record.entry_id() else {
            return;
        };
        for field in profile.lookup_keys() {
            if let Some(value) = record.get_str(field) {
                self.keys
                    .insert((profile.kind, field, value.to_string()), entry_id.to_string());
            }
        }
    }

    fn remember_bridged(&mut self, kind: ForeignKind, reference: &str, entry_id: &str) {
        self.bridged
            .insert((kind, reference.to_string()), entry_id.to_string());
    }

    pub fn len(&self) -> usize {
        self.keys.len() + self.bridged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// Outcome of resolving one reference
#[derive(Debug, Clone)]
pub enum Resolution {
    Found(Record),
    Created(Record),
}

impl Resolution {
    pub fn record(&self) -> &Record {
        match self {
            Resolution::Found(r) | Resolution::Created(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Resolution::Created(_))
    }
}

pub struct IdentityResolver<'a> {
    target: &'a dyn RecordStore,
    /// Source-side connection used to complete partial references
    bridge: Option<&'a dyn RecordStore>,
    profiles: &'a ProfileCatalog,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(target: &'a dyn RecordStore, profiles: &'a ProfileCatalog) -> Self {
        Self {
            target,
            bridge: None,
            profiles,
        }
    }

    pub fn with_bridge(mut self, bridge: &'a dyn RecordStore) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Resolve a partial reference of `kind` to a bound target record.
    ///
    /// `reference` carries whatever is known: typically the source-side
    /// reference key plus key hints copied from the part.
    pub async fn resolve(
        &self,
        kind: ForeignKind,
        reference: &Record,
        cache: &mut ResolutionCache,
    ) -> Result<Resolution, SyncError> {
        self.resolve_at(kind, reference, cache, 0).await
    }

    fn resolve_at<'r>(
        &'r self,
        kind: ForeignKind,
        reference: &'r Record,
        cache: &'r mut ResolutionCache,
        depth: usize,
    ) -> BoxFuture<'r, Result<Resolution, SyncError>> {
        async move {
            let profile = self.profiles.get(kind)?;
            let reference_value = reference.get_str(profile.reference_key);

            if let Some(found) = self.lookup(profile, reference, cache).await? {
                return Ok(Resolution::Found(found));
            }

            if let Some(value) = reference_value {
                if let Some(entry_id) = cache.bridged(kind, value) {
                    let mut record = Record::new(profile.record_type.clone());
                    record.load(self.target, &entry_id).await?;
                    return Ok(Resolution::Found(record));
                }
            }

            let Some(bridge) = self.bridge else {
                return Err(SyncError::UnresolvedReference(format!(
                    "{} {}: no match in target and no bridging connection",
                    kind,
                    describe_keys(profile, reference)
                )));
            };

            let source = self
                .fetch_source(profile, reference, bridge)
                .await?
                .ok_or_else(|| {
                    SyncError::UnresolvedReference(format!(
                        "{} {}: not found in {}",
                        kind,
                        describe_keys(profile, reference),
                        bridge.name()
                    ))
                })?;

            let resolution = match self.lookup(profile, &source, cache).await? {
                Some(found) => Resolution::Found(found),
                None => {
                    if depth >= MAX_DEPTH {
                        return Err(SyncError::UnresolvedReference(format!(
                            "{} {}: dependency chain deeper than {}",
                            kind,
                            describe_keys(profile, reference),
                            MAX_DEPTH
                        )));
                    }
                    Resolution::Created(self.bootstrap(profile, &source, cache, depth).await?)
                }
            };

            let source_reference = reference_value.or_else(|| source.get_str(profile.reference_key));
            if let (Some(value), Some(entry_id)) = (source_reference, resolution.record().entry_id()) {
                cache.remember_bridged(kind, value, entry_id);
            }
            Ok(resolution)
        }
        .boxed()
    }

    /// Steps 1 and 2: primary then secondary key against the target
    async fn lookup(
        &self,
        profile: &ForeignProfile,
        keys_from: &Record,
        cache: &mut ResolutionCache,
    ) -> Result<Option<Record>, SyncError> {
        for field in profile.lookup_keys() {
            let Some(value) = keys_from.get_str(field) else {
                continue;
            };

            let mut record = Record::new(profile.record_type.clone());
            if let Some(entry_id) = cache.key(profile.kind, field, value) {
                record.load(self.target, &entry_id).await?;
                return Ok(Some(record));
            }

            if record.read(self.target, &Criteria::eq(field, value)).await? {
                debug!(kind = %profile.kind, field, value, "Resolved in target");
                cache.remember(profile, &record);
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Find the source-side record behind a reference
    async fn fetch_source(
        &self,
        profile: &ForeignProfile,
        reference: &Record,
        bridge: &dyn RecordStore,
    ) -> Result<Option<Record>, SyncError> {
        let keys = std::iter::once(profile.reference_key).chain(profile.lookup_keys());
        for field in keys {
            let Some(value) = reference.get_str(field) else {
                continue;
            };
            let mut record = Record::new(profile.record_type.clone());
            if record.read(bridge, &Criteria::eq(field, value)).await? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Step 4: create a target copy of `source`, dependencies first
    async fn bootstrap(
        &self,
        profile: &ForeignProfile,
        source: &Record,
        cache: &mut ResolutionCache,
        depth: usize,
    ) -> Result<Record, SyncError> {
        let mut record = Record::new(profile.record_type.clone());
        for (field, value) in source.attributes() {
            if !profile.is_store_assigned(*field) {
                record.set(*field, value.clone());
            }
        }

        for link in &profile.dependencies {
            let Some(value) = source.get_str(link.field) else {
                continue;
            };
            let dependency = self.profiles.get(link.kind)?;
            let mut dep_reference = Record::new(dependency.record_type.clone());
            dep_reference.set(dependency.reference_key, value);

            let resolved = self
                .resolve_at(link.kind, &dep_reference, cache, depth + 1)
                .await?;
            let target_value = resolved
                .record()
                .get(dependency.reference_key)
                .cloned()
                .ok_or_else(|| {
                    SyncError::UnresolvedReference(format!(
                        "{} {} has no {} in target",
                        link.kind,
                        resolved.record().describe(),
                        dependency.reference_key
                    ))
                })?;
            record.set(link.field, target_value);
        }

        record.create(self.target).await?;
        // pick up ids the store generated
        record.reload(self.target).await?;
        info!(
            kind = %profile.kind,
            record = %record.describe(),
            "Bootstrapped foreign record"
        );
        cache.remember(profile, &record);
        Ok(record)
    }
}

fn describe_keys(profile: &ForeignProfile, reference: &Record) -> String {
    let keys: Vec<String> = std::iter::once(profile.reference_key)
        .chain(profile.lookup_keys())
        .filter_map(|f| reference.get(f).map(|v| format!("{}={}", f, v)))
        .collect();
    if keys.is_empty() {
        "<no keys>".to_string()
    } else {
        keys.join(",")
    }
}
