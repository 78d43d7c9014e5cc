//! Transfer Orchestrator
//!
//! Drives one transfer of a managed entity and its parts from the source
//! store into the target store.
//!
//! ```text
//! read source ──missing──→ SourceNotFound (abort)
//!   │
//! map → commit main entity ──error──→ abort
//!   │
//! for each enabled part code, for each member (isolated):
//!   discover → map → resolve foreign refs → commit
//!   └─error─→ report.skipped, continue
//!   │
//! created and reconcile configured → trigger and wait
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{ENTITY_TARGET, SyncConfig};
use crate::fields::{base, common};

use super::catalog::{ClassCatalog, ClassSelector};
use super::commit::{CommitEngine, CommitKind, CommitOutcome};
use super::criteria::Criteria;
use super::entity::{ManagedEntity, PartRef};
use super::error::SyncError;
use super::mapper::{self, FieldMapping};
use super::parts::{ForeignLink, PartCode, PartHandler, PartRegistry};
use super::record::Record;
use super::report::TransferReport;
use super::resolver::{IdentityResolver, ProfileCatalog, ResolutionCache};
use super::store::RecordStore;
use super::waiter::{ConsistencyWaiter, Sleeper, TokioSleeper};

/// Which managed entity to transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySelector {
    /// Exactly one of class id or record type
    pub class: ClassSelector,
    pub instance_id: String,
}

impl EntitySelector {
    pub fn by_class(class_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            class: ClassSelector::ClassId(class_id.into()),
            instance_id: instance_id.into(),
        }
    }

    pub fn by_form(form: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            class: ClassSelector::Form(form.into()),
            instance_id: instance_id.into(),
        }
    }
}

/// Per-transfer helpers shared by all parts
struct PartContext<'a> {
    engine: CommitEngine<'a>,
    resolver: IdentityResolver<'a>,
    cache: ResolutionCache,
}

pub struct TransferOrchestrator {
    source: Arc<dyn RecordStore>,
    target: Arc<dyn RecordStore>,
    /// Connection used to complete foreign references
    bridge: Option<Arc<dyn RecordStore>>,
    config: SyncConfig,
    catalog: ClassCatalog,
    registry: PartRegistry,
    profiles: ProfileCatalog,
    waiter: ConsistencyWaiter,
}

impl TransferOrchestrator {
    /// With `config.bridge`, the source store doubles as bridging connection
    pub fn new(
        source: Arc<dyn RecordStore>,
        target: Arc<dyn RecordStore>,
        config: SyncConfig,
    ) -> Self {
        let bridge = config.bridge.then(|| source.clone());
        Self {
            catalog: ClassCatalog::from_map(&config.classes),
            source,
            target,
            bridge,
            config,
            registry: PartRegistry::standard(),
            profiles: ProfileCatalog::standard(),
            waiter: ConsistencyWaiter::new(Arc::new(TokioSleeper)),
        }
    }

    pub fn with_bridge(mut self, bridge: Arc<dyn RecordStore>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_registry(mut self, registry: PartRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_profiles(mut self, profiles: ProfileCatalog) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.waiter = ConsistencyWaiter::new(sleeper);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// Run one transfer.
    ///
    /// `Ok` means the main entity is committed; check
    /// [`TransferReport::skipped_parts`] for parts that were not.
    pub async fn transfer(&self, selector: &EntitySelector) -> Result<TransferReport, SyncError> {
        let mut source_entity = ManagedEntity::from_selector(&selector.class, &self.catalog)?;
        info!(
            class = source_entity.class_id(),
            instance_id = %selector.instance_id,
            source = self.source.name(),
            target = self.target.name(),
            "Transfer started"
        );

        let found = source_entity
            .record_mut()
            .read(
                self.source.as_ref(),
                &Criteria::eq(base::INSTANCE_ID, selector.instance_id.as_str()),
            )
            .await?;
        if !found {
            return Err(SyncError::SourceNotFound(format!(
                "{} {} in {}",
                source_entity.form(),
                selector.instance_id,
                self.source.name()
            )));
        }

        let engine = CommitEngine::new(self.target.as_ref())
            .ignore_unchanged(self.config.ignore_unchanged);
        let (mut target_entity, main) = self.commit_main(&source_entity, &engine).await?;
        let mut report = TransferReport::new(&main);

        let mut resolver = IdentityResolver::new(self.target.as_ref(), &self.profiles);
        if let Some(bridge) = &self.bridge {
            resolver = resolver.with_bridge(bridge.as_ref());
        }
        let mut ctx = PartContext {
            engine,
            resolver,
            cache: ResolutionCache::new(),
        };

        for code in self.config.parts.enabled() {
            self.transfer_parts(code, &mut source_entity, &mut target_entity, &mut ctx, &mut report)
                .await;
        }

        if main.kind == CommitKind::Created {
            if let Some(reconcile) = &self.config.reconcile {
                let plan = reconcile.plan(target_entity.form());
                let reconciled = match self
                    .waiter
                    .trigger_and_wait(target_entity.record(), self.target.as_ref(), &plan)
                    .await
                {
                    Ok(reconciled) => reconciled,
                    Err(e) => {
                        warn!(entity = %target_entity, error = %e, "Reconciliation trigger failed");
                        false
                    }
                };
                report.reconciled = Some(reconciled);
            }
        }

        info!(
            transfer_id = %report.transfer_id,
            entry_id = %report.main_entity,
            outcome = %report.main_outcome,
            committed = report.committed_parts.len(),
            skipped = report.skipped_parts.len(),
            resolved = ctx.cache.len(),
            "Transfer finished"
        );
        Ok(report)
    }

    /// Map and commit the anchor record; every error here is fatal
    async fn commit_main(
        &self,
        source_entity: &ManagedEntity,
        engine: &CommitEngine<'_>,
    ) -> Result<(ManagedEntity, CommitOutcome), SyncError> {
        let mapping = self
            .config
            .mapping_for(ENTITY_TARGET)
            .cloned()
            .unwrap_or_else(|| {
                FieldMapping::identity_for(source_entity.record(), common::STORE_ASSIGNED)
            });

        let mut target_entity = source_entity.empty_like();
        mapper::transfer(
            source_entity.record(),
            target_entity.record_mut(),
            &mapping,
            false,
        );

        let descriptor = self.config.entity_merge();
        let outcome = engine
            .commit(target_entity.record_mut(), &descriptor, &[])
            .await?;
        // parts may reference store-assigned values of the committed entity
        target_entity.record_mut().reload(self.target.as_ref()).await?;

        info!(
            entity = %target_entity,
            outcome = %outcome.kind,
            "Main entity committed"
        );
        Ok((target_entity, outcome))
    }

    /// Discover and commit every member of one part code, never failing
    async fn transfer_parts(
        &self,
        code: PartCode,
        source_entity: &mut ManagedEntity,
        target_entity: &mut ManagedEntity,
        ctx: &mut PartContext<'_>,
        report: &mut TransferReport,
    ) {
        let Some(handler) = self.registry.handler(code) else {
            let e = SyncError::Config(format!("no handler for part code {}", code));
            warn!(part = %code, error = %e, "Part code skipped");
            report.skipped(code, None, &e);
            return;
        };

        let discovery = match self
            .registry
            .discover(code, source_entity, &self.catalog, self.source.as_ref())
            .await
        {
            Ok(discovery) => discovery,
            Err(e) => {
                warn!(part = %code, entity = %source_entity, error = %e, "Part discovery failed");
                report.skipped(code, None, &e);
                return;
            }
        };
        for dropped in &discovery.dropped {
            report.skipped(code, Some(dropped.record.clone()), &dropped.error);
        }
        source_entity.set_parts(code, discovery.members);

        let mut committed = Vec::new();
        for (index, member) in source_entity.parts(code).iter().enumerate() {
            let part = PartRef { code, index };
            match self
                .transfer_part(handler, member, source_entity, target_entity, ctx)
                .await
            {
                Ok((record, outcome)) => {
                    debug!(part = %part, record = %record.describe(), outcome = %outcome.kind, "Part committed");
                    report.committed(code, &outcome);
                    committed.push(record);
                }
                Err(e) => {
                    warn!(
                        part = %part,
                        record = %member.describe(),
                        error = %e,
                        "Part skipped"
                    );
                    report.skipped(code, Some(member.describe()), &e);
                }
            }
        }
        target_entity.set_parts(code, committed);
    }

    async fn transfer_part(
        &self,
        handler: &PartHandler,
        member: &Record,
        source_entity: &ManagedEntity,
        target_entity: &ManagedEntity,
        ctx: &mut PartContext<'_>,
    ) -> Result<(Record, CommitOutcome), SyncError> {
        let mapping = self
            .config
            .mapping_for(handler.code.as_str())
            .cloned()
            .unwrap_or_else(|| handler.default_mapping(member));
        let mut mapped = (handler.map)(
            handler,
            member,
            source_entity,
            target_entity,
            &mapping,
            false,
        );

        if let Some(link) = &handler.foreign {
            self.resolve_foreign(link, &mut mapped, ctx).await?;
        }

        let descriptor = self.config.part_merge(handler.code, handler.merge.as_ref());
        let outcome = ctx
            .engine
            .commit(&mut mapped, &descriptor, &handler.probe_keys)
            .await?;
        Ok((mapped, outcome))
    }

    /// Rewrite a foreign reference of `mapped` to the target-side id
    async fn resolve_foreign(
        &self,
        link: &ForeignLink,
        mapped: &mut Record,
        ctx: &mut PartContext<'_>,
    ) -> Result<(), SyncError> {
        let Some(value) = mapped.get_str(link.part_field).map(str::to_string) else {
            return Ok(());
        };
        let profile = self.profiles.get(link.kind)?;

        let mut reference = Record::new(profile.record_type.clone());
        reference.set(profile.reference_key, value);
        for (part_field, foreign_field) in &link.hints {
            if let Some(hint) = mapped.get(*part_field).filter(|v| !v.is_null()) {
                reference.set(*foreign_field, hint.clone());
            }
        }

        let resolution = ctx
            .resolver
            .resolve(link.kind, &reference, &mut ctx.cache)
            .await?;
        let resolved = resolution
            .record()
            .get(profile.reference_key)
            .cloned()
            .ok_or_else(|| {
                SyncError::UnresolvedReference(format!(
                    "{} {} has no field {}",
                    link.kind,
                    resolution.record().describe(),
                    profile.reference_key
                ))
            })?;
        mapped.set(link.part_field, resolved);
        Ok(())
    }
}
