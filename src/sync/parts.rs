//! Part Registry
//!
//! Maps each part code to its handler: the record type that stores the
//! part, how members are discovered from the owning entity, how a member
//! is mapped into the target store, and which foreign references it
//! carries. Dispatch is a table lookup by [`PartCode`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core_types::FieldId;
use crate::fields::{asset_people, base, common, forms, impacted_area, relationship, work_log};

use super::catalog::ClassCatalog;
use super::criteria::Criteria;
use super::entity::ManagedEntity;
use super::error::SyncError;
use super::mapper::{self, FieldMapping};
use super::merge::MergeDescriptor;
use super::record::Record;
use super::resolver::ForeignKind;
use super::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartCode {
    /// Work-history entries
    WorkInfo,
    /// Relationships to other managed entities
    CiRelation,
    /// People/group associations
    PeopleRelation,
    /// Impacted-area associations
    ImpactedArea,
}

impl PartCode {
    /// Processing order within a transfer
    pub const ALL: [PartCode; 4] = [
        PartCode::WorkInfo,
        PartCode::CiRelation,
        PartCode::PeopleRelation,
        PartCode::ImpactedArea,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartCode::WorkInfo => "workinfo",
            PartCode::CiRelation => "cirelation",
            PartCode::PeopleRelation => "peoplerelation",
            PartCode::ImpactedArea => "impactedarea",
        }
    }
}

impl fmt::Display for PartCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PartCode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PartCode::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| SyncError::Config(format!("unknown part code: {}", s)))
    }
}

/// Owner key a part code discovers its members by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryKey {
    InstanceId,
    ReconciliationId,
}

impl DiscoveryKey {
    pub fn value<'e>(&self, owner: &'e ManagedEntity) -> Option<&'e str> {
        match self {
            DiscoveryKey::InstanceId => owner.instance_id(),
            DiscoveryKey::ReconciliationId => owner.reconciliation_id(),
        }
    }
}

/// One end of a relationship part
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    pub label: &'static str,
    pub instance_field: FieldId,
    pub class_field: FieldId,
}

/// A part field referencing a foreign entity
#[derive(Debug, Clone)]
pub struct ForeignLink {
    pub kind: ForeignKind,
    /// Part field holding the foreign record's reference key
    pub part_field: FieldId,
    /// `(part field, foreign field)` pairs copied into the lookup reference
    pub hints: Vec<(FieldId, FieldId)>,
}

/// Builds the discovery query, `None` when the owner lacks the key
pub type DiscoverFn = fn(&PartHandler, &ManagedEntity) -> Option<Criteria>;

/// Maps a source member into an unbound target record.
/// Arguments: handler, source member, source owner, target owner, mapping, only-changed.
pub type MapFn =
    fn(&PartHandler, &Record, &ManagedEntity, &ManagedEntity, &FieldMapping, bool) -> Record;

pub struct PartHandler {
    pub code: PartCode,
    pub record_type: String,
    pub key: DiscoveryKey,
    /// Part fields holding the owner's key
    pub owner_fields: Vec<FieldId>,
    pub discover: DiscoverFn,
    pub map: MapFn,
    /// Handler-level merge default, below configuration
    pub merge: Option<MergeDescriptor>,
    /// Probe keys used when no qualifiers are configured
    pub probe_keys: Vec<FieldId>,
    /// Endpoints that must resolve for a member to be kept
    pub endpoints: Vec<Endpoint>,
    pub foreign: Option<ForeignLink>,
    /// Never copied by the default identity mapping
    pub excluded: Vec<FieldId>,
}

impl PartHandler {
    /// Identity mapping of a member's fields, minus excluded ones
    pub fn default_mapping(&self, member: &Record) -> FieldMapping {
        let mut excluded = self.excluded.clone();
        excluded.extend_from_slice(common::STORE_ASSIGNED);
        FieldMapping::identity_for(member, &excluded)
    }
}

impl fmt::Debug for PartHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartHandler")
            .field("code", &self.code)
            .field("record_type", &self.record_type)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Members match when any owner field holds the owner's key
pub fn discover_by_owner(handler: &PartHandler, owner: &ManagedEntity) -> Option<Criteria> {
    let key = handler.key.value(owner)?;
    Criteria::any_of(handler.owner_fields.iter().map(|f| Criteria::eq(*f, key)))
}

/// Copy mapped fields, then point owner references at the target owner
pub fn map_owned(
    handler: &PartHandler,
    member: &Record,
    source_owner: &ManagedEntity,
    target_owner: &ManagedEntity,
    mapping: &FieldMapping,
    only_changed: bool,
) -> Record {
    let mut target = Record::new(handler.record_type.clone());
    mapper::transfer(member, &mut target, mapping, only_changed);

    if let (Some(from), Some(to)) = (
        handler.key.value(source_owner),
        handler.key.value(target_owner),
    ) {
        for field in &handler.owner_fields {
            if target.get_str(*field) == Some(from) && from != to {
                target.set(*field, to);
            }
        }
    }
    target
}

/// Relationships additionally live in the target owner's dataset
pub fn map_relationship(
    handler: &PartHandler,
    member: &Record,
    source_owner: &ManagedEntity,
    target_owner: &ManagedEntity,
    mapping: &FieldMapping,
    only_changed: bool,
) -> Record {
    let mut target = map_owned(
        handler,
        member,
        source_owner,
        target_owner,
        mapping,
        only_changed,
    );
    if let Some(dataset) = target_owner.dataset_id() {
        target.set(relationship::DATASET_ID, dataset);
    }
    target
}

/// Members found for one part code
#[derive(Debug, Default)]
pub struct Discovery {
    pub members: Vec<Record>,
    /// Members dropped because they could not be made whole
    pub dropped: Vec<DroppedPart>,
}

#[derive(Debug)]
pub struct DroppedPart {
    pub record: String,
    pub error: SyncError,
}

#[derive(Debug, Default)]
pub struct PartRegistry {
    handlers: BTreeMap<PartCode, PartHandler>,
}

impl PartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers for the four standard part codes
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register(PartHandler {
            code: PartCode::WorkInfo,
            record_type: forms::WORK_LOG.to_string(),
            key: DiscoveryKey::ReconciliationId,
            owner_fields: vec![work_log::ASSET_RECON_ID],
            discover: discover_by_owner,
            map: map_owned,
            merge: None,
            probe_keys: vec![
                work_log::ASSET_RECON_ID,
                work_log::SUMMARY,
                work_log::SUBMIT_DATE,
            ],
            endpoints: Vec::new(),
            foreign: None,
            excluded: Vec::new(),
        });

        registry.register(PartHandler {
            code: PartCode::CiRelation,
            record_type: forms::BASE_RELATIONSHIP.to_string(),
            key: DiscoveryKey::InstanceId,
            owner_fields: vec![
                relationship::SOURCE_INSTANCE_ID,
                relationship::DESTINATION_INSTANCE_ID,
            ],
            discover: discover_by_owner,
            map: map_relationship,
            merge: None,
            probe_keys: Vec::new(),
            endpoints: vec![
                Endpoint {
                    label: "source",
                    instance_field: relationship::SOURCE_INSTANCE_ID,
                    class_field: relationship::SOURCE_CLASS_ID,
                },
                Endpoint {
                    label: "destination",
                    instance_field: relationship::DESTINATION_INSTANCE_ID,
                    class_field: relationship::DESTINATION_CLASS_ID,
                },
            ],
            foreign: None,
            excluded: Vec::new(),
        });

        registry.register(PartHandler {
            code: PartCode::PeopleRelation,
            record_type: forms::ASSET_PEOPLE.to_string(),
            key: DiscoveryKey::ReconciliationId,
            owner_fields: vec![asset_people::ASSET_RECON_ID],
            discover: discover_by_owner,
            map: map_owned,
            merge: None,
            probe_keys: vec![
                asset_people::ASSET_RECON_ID,
                asset_people::PERSON_ID,
                asset_people::ROLE,
            ],
            endpoints: Vec::new(),
            foreign: Some(ForeignLink {
                kind: ForeignKind::Person,
                part_field: asset_people::PERSON_ID,
                hints: vec![(asset_people::LOGIN_ID, crate::fields::people::LOGIN_ID)],
            }),
            excluded: Vec::new(),
        });

        registry.register(PartHandler {
            code: PartCode::ImpactedArea,
            record_type: forms::IMPACTED_AREAS.to_string(),
            key: DiscoveryKey::ReconciliationId,
            owner_fields: vec![impacted_area::ASSET_RECON_ID],
            discover: discover_by_owner,
            map: map_owned,
            merge: None,
            probe_keys: vec![
                impacted_area::ASSET_RECON_ID,
                impacted_area::COMPANY,
                impacted_area::SITE_ID,
            ],
            endpoints: Vec::new(),
            foreign: Some(ForeignLink {
                kind: ForeignKind::Site,
                part_field: impacted_area::SITE_ID,
                hints: vec![(impacted_area::SITE_NAME, crate::fields::site::NAME)],
            }),
            excluded: Vec::new(),
        });

        registry
    }

    /// Add or replace the handler for a part code
    pub fn register(&mut self, handler: PartHandler) {
        self.handlers.insert(handler.code, handler);
    }

    pub fn handler(&self, code: PartCode) -> Option<&PartHandler> {
        self.handlers.get(&code)
    }

    /// Find the members of `code` owned by `owner` in `store`.
    ///
    /// Relationship members whose endpoints do not both resolve are moved
    /// to [`Discovery::dropped`] instead of failing the discovery.
    pub async fn discover(
        &self,
        code: PartCode,
        owner: &ManagedEntity,
        catalog: &ClassCatalog,
        store: &dyn RecordStore,
    ) -> Result<Discovery, SyncError> {
        let handler = self
            .handler(code)
            .ok_or_else(|| SyncError::Config(format!("no handler for part code {}", code)))?;

        let Some(criteria) = (handler.discover)(handler, owner) else {
            debug!(part = %code, owner = %owner, "Owner has no discovery key");
            return Ok(Discovery::default());
        };

        let entry_ids = store.search(&handler.record_type, &criteria).await?;
        let mut discovery = Discovery::default();

        for entry_id in entry_ids {
            let member = store.fetch(&handler.record_type, &entry_id).await?;
            match check_endpoints(handler, &member, catalog, store).await {
                Ok(()) => discovery.members.push(member),
                Err(e) => {
                    warn!(
                        part = %code,
                        record = %member.describe(),
                        error = %e,
                        "Dropping part with unresolved endpoint"
                    );
                    discovery.dropped.push(DroppedPart {
                        record: member.describe(),
                        error: e,
                    });
                }
            }
        }

        debug!(
            part = %code,
            members = discovery.members.len(),
            dropped = discovery.dropped.len(),
            "Discovered parts"
        );
        Ok(discovery)
    }
}

/// Look up every endpoint of a member in `store`
async fn check_endpoints(
    handler: &PartHandler,
    member: &Record,
    catalog: &ClassCatalog,
    store: &dyn RecordStore,
) -> Result<(), SyncError> {
    for endpoint in &handler.endpoints {
        let instance = member.get_str(endpoint.instance_field).ok_or_else(|| {
            SyncError::UnresolvedReference(format!(
                "{}: no {} instance id",
                member.describe(),
                endpoint.label
            ))
        })?;
        let class_id = member.get_str(endpoint.class_field).ok_or_else(|| {
            SyncError::UnresolvedReference(format!(
                "{}: no {} class id",
                member.describe(),
                endpoint.label
            ))
        })?;
        let form = catalog.form_for(class_id).map_err(|_| {
            SyncError::UnresolvedReference(format!(
                "{}: {} class {} is not catalogued",
                member.describe(),
                endpoint.label,
                class_id
            ))
        })?;

        let mut target = Record::new(form);
        if !target
            .read(store, &Criteria::eq(base::INSTANCE_ID, instance))
            .await?
        {
            return Err(SyncError::UnresolvedReference(format!(
                "{}: {} endpoint {} not found",
                member.describe(),
                endpoint.label,
                instance
            )));
        }
    }
    Ok(())
}
