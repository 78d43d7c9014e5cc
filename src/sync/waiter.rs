//! Consistency Waiter
//!
//! Some creations make the remote store produce a derived record
//! asynchronously (reconciliation). The waiter writes the trigger marker
//! under `System` mode, then polls a bounded number of times for the
//! derived record.
//!
//! ```text
//! set mode SYSTEM → write marker → set mode NORMAL
//! poll 1 ─miss─→ sleep → poll 2 ─miss─→ sleep → ... → poll N ─miss─→ false
//!   └─hit─→ true
//! ```
//!
//! A timeout is a soft failure: the caller logs it and carries on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core_types::{Attributes, FieldId};
use crate::fields::common;

use super::criteria::Criteria;
use super::error::SyncError;
use super::record::{Record, Value};
use super::store::{OperationMode, RecordStore};

/// Sleep between polls, injectable for tests
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// What to write and what to wait for
#[derive(Debug, Clone)]
pub struct WaitPlan {
    pub marker_field: FieldId,
    pub marker_value: Value,
    pub derived_record_type: String,
    /// Entity field whose value identifies the derived record
    pub key_field: FieldId,
    /// Derived-record field holding that value
    pub cross_ref_field: FieldId,
    /// Extra condition on the derived record (e.g. its dataset)
    pub derived_filter: Option<Criteria>,
    pub max_attempts: u32,
    pub interval: Duration,
}

impl WaitPlan {
    /// Query for the derived record. When it lives in the entity's own form
    /// the entity is excluded, since it carries the same cross-reference key.
    fn poll_criteria(&self, key: &str, entity_type: &str, entry_id: &str) -> Criteria {
        let mut criteria = Criteria::eq(self.cross_ref_field, key);
        if let Some(filter) = &self.derived_filter {
            criteria = criteria.and(filter.clone());
        }
        if self.derived_record_type == entity_type {
            criteria = criteria.and(Criteria::ne(common::REQUEST_ID, entry_id));
        }
        criteria
    }
}

pub struct ConsistencyWaiter {
    sleeper: Arc<dyn Sleeper>,
}

impl ConsistencyWaiter {
    pub fn new(sleeper: Arc<dyn Sleeper>) -> Self {
        Self { sleeper }
    }

    /// Trigger reconciliation of `entity` and wait for its derived record.
    ///
    /// Errors only when the trigger write fails; polling errors count as misses.
    pub async fn trigger_and_wait(
        &self,
        entity: &Record,
        store: &dyn RecordStore,
        plan: &WaitPlan,
    ) -> Result<bool, SyncError> {
        let entry_id = entity
            .entry_id()
            .ok_or_else(|| SyncError::NotFound(entity.describe()))?;
        let Some(key) = entity.get_str(plan.key_field) else {
            warn!(
                entity = %entity.describe(),
                key_field = plan.key_field,
                "Entity has no cross-reference key, not waiting"
            );
            return Ok(false);
        };

        self.trigger(entity.record_type(), entry_id, store, plan)
            .await?;

        let criteria = plan.poll_criteria(key, entity.record_type(), entry_id);
        for attempt in 1..=plan.max_attempts {
            match store.search(&plan.derived_record_type, &criteria).await {
                Ok(hits) if !hits.is_empty() => {
                    info!(
                        entity = %entity.describe(),
                        attempt,
                        "Derived record observed"
                    );
                    return Ok(true);
                }
                Ok(_) => debug!(attempt, criteria = %criteria, "Derived record not there yet"),
                Err(e) => warn!(attempt, error = %e, "Poll failed"),
            }
            if attempt < plan.max_attempts {
                self.sleeper.sleep(plan.interval).await;
            }
        }

        warn!(
            entity = %entity.describe(),
            attempts = plan.max_attempts,
            "Gave up waiting for derived record"
        );
        Ok(false)
    }

    async fn trigger(
        &self,
        record_type: &str,
        entry_id: &str,
        store: &dyn RecordStore,
        plan: &WaitPlan,
    ) -> Result<(), SyncError> {
        let mut marker = Record::fetched(record_type, entry_id, Attributes::new());
        marker.set(plan.marker_field, plan.marker_value.clone());

        store.set_operation_mode(OperationMode::System).await?;
        let written = marker.update(store).await;
        let restored = store.set_operation_mode(OperationMode::Normal).await;
        written?;
        restored?;
        debug!(record_type, entry_id, "Reconciliation triggered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::core_types::EntryId;
    use crate::fields::base;
    use crate::sync::store::{MemoryStore, StoreError, StoreOpKind};

    const FORM: &str = "BMC.CORE:BMC_ComputerSystem";

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    /// Derived record materializes right before search number `appear_on`
    struct DelayedStore {
        inner: MemoryStore,
        appear_on: u32,
        polls: AtomicU32,
    }

    #[async_trait]
    impl RecordStore for DelayedStore {
        fn name(&self) -> &str {
            self.inner.name()
        }

        async fn search(
            &self,
            record_type: &str,
            criteria: &Criteria,
        ) -> Result<Vec<EntryId>, StoreError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.appear_on {
                self.inner.insert(
                    FORM,
                    [
                        (base::RECONCILIATION_ID, Value::from("RE-1")),
                        (base::DATASET_ID, Value::from("BMC.ASSET")),
                    ]
                    .into_iter()
                    .collect(),
                );
            }
            self.inner.search(record_type, criteria).await
        }

        async fn fetch(&self, record_type: &str, entry_id: &str) -> Result<Record, StoreError> {
            self.inner.fetch(record_type, entry_id).await
        }

        async fn create(
            &self,
            record_type: &str,
            attributes: &Attributes,
        ) -> Result<EntryId, StoreError> {
            self.inner.create(record_type, attributes).await
        }

        async fn update(
            &self,
            record_type: &str,
            entry_id: &str,
            attributes: &Attributes,
        ) -> Result<(), StoreError> {
            self.inner.update(record_type, entry_id, attributes).await
        }

        async fn set_operation_mode(&self, mode: OperationMode) -> Result<(), StoreError> {
            self.inner.set_operation_mode(mode).await
        }
    }

    fn plan(max_attempts: u32) -> WaitPlan {
        WaitPlan {
            marker_field: base::RECON_REQUEST,
            marker_value: Value::Integer(1),
            derived_record_type: FORM.to_string(),
            key_field: base::RECONCILIATION_ID,
            cross_ref_field: base::RECONCILIATION_ID,
            derived_filter: Some(Criteria::eq(base::DATASET_ID, "BMC.ASSET")),
            max_attempts,
            interval: Duration::from_millis(250),
        }
    }

    fn entity(store: &MemoryStore) -> Record {
        let id = store.insert(
            FORM,
            [
                (base::RECONCILIATION_ID, Value::from("RE-1")),
                (base::DATASET_ID, Value::from("BMC.IMPORT")),
            ]
            .into_iter()
            .collect(),
        );
        Record::fetched(FORM, id.clone(), store.get(FORM, &id).unwrap())
    }

    #[tokio::test]
    async fn test_found_on_third_poll() {
        let inner = MemoryStore::new("target").with_protected_field(base::RECON_REQUEST);
        let e = entity(&inner);
        let store = DelayedStore {
            inner,
            appear_on: 3,
            polls: AtomicU32::new(0),
        };
        let sleeper = Arc::new(RecordingSleeper::default());
        let waiter = ConsistencyWaiter::new(sleeper.clone());

        assert!(waiter.trigger_and_wait(&e, &store, &plan(5)).await.unwrap());
        assert_eq!(store.polls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);

        let marker = store.inner.get(FORM, e.entry_id().unwrap()).unwrap();
        assert_eq!(marker.get(&base::RECON_REQUEST), Some(&Value::Integer(1)));
        let update = &store.inner.operations_on(StoreOpKind::Update, FORM)[0];
        assert_eq!(update.mode, OperationMode::System);
        assert_eq!(store.inner.mode(), OperationMode::Normal);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = MemoryStore::new("target");
        let e = entity(&inner);
        let store = DelayedStore {
            inner,
            appear_on: 99,
            polls: AtomicU32::new(0),
        };
        let sleeper = Arc::new(RecordingSleeper::default());
        let waiter = ConsistencyWaiter::new(sleeper.clone());

        assert!(!waiter.trigger_and_wait(&e, &store, &plan(4)).await.unwrap());
        assert_eq!(store.polls.load(Ordering::SeqCst), 4);
        assert_eq!(
            *sleeper.slept.lock().unwrap(),
            vec![Duration::from_millis(250); 3]
        );
    }

    #[tokio::test]
    async fn test_entity_never_counts_as_its_own_derived_record() {
        let store = MemoryStore::new("target");
        let id = store.insert(
            FORM,
            [
                (base::RECONCILIATION_ID, Value::from("RE-1")),
                (base::DATASET_ID, Value::from("BMC.ASSET")),
            ]
            .into_iter()
            .collect(),
        );
        let e = Record::fetched(FORM, id.clone(), store.get(FORM, &id).unwrap());
        let sleeper = Arc::new(RecordingSleeper::default());
        let waiter = ConsistencyWaiter::new(sleeper.clone());

        assert!(!waiter.trigger_and_wait(&e, &store, &plan(3)).await.unwrap());
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);

        let mut unfiltered = plan(1);
        unfiltered.derived_filter = None;
        assert!(!waiter.trigger_and_wait(&e, &store, &unfiltered).await.unwrap());
    }

    #[test]
    fn test_poll_criteria_excludes_entity_in_same_form() {
        let p = plan(1);
        assert_eq!(
            p.poll_criteria("RE-1", FORM, "000000000000001").to_string(),
            "'400129200' = \"RE-1\" AND '400127400' = \"BMC.ASSET\" AND '1' != \"000000000000001\""
        );
        assert_eq!(
            p.poll_criteria("RE-1", "OTHER:Form", "000000000000001").to_string(),
            "'400129200' = \"RE-1\" AND '400127400' = \"BMC.ASSET\""
        );
    }

    #[tokio::test]
    async fn test_failed_trigger_restores_mode() {
        let store = MemoryStore::new("target");
        let e = entity(&store);
        store.fail_on(StoreOpKind::Update, FORM);
        let waiter = ConsistencyWaiter::new(Arc::new(RecordingSleeper::default()));

        let err = waiter.trigger_and_wait(&e, &store, &plan(3)).await.unwrap_err();
        assert_eq!(err.code(), "REMOTE_OPERATION");
        assert_eq!(store.mode(), OperationMode::Normal);
        assert!(store.operations_on(StoreOpKind::Search, FORM).is_empty());
    }

    #[tokio::test]
    async fn test_unbound_entity_is_rejected() {
        let store = MemoryStore::new("target");
        let waiter = ConsistencyWaiter::new(Arc::new(TokioSleeper));
        let err = waiter
            .trigger_and_wait(&Record::new(FORM), &store, &plan(1))
            .await
            .unwrap_err();
        assert!(err.is_programmer_error());
    }
}
