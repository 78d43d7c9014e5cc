use std::collections::BTreeMap;
use std::sync::Arc;

use cmdb_sync::config::{AppConfig, SyncConfig};
use cmdb_sync::fields::{base, forms, work_log};
use cmdb_sync::sync::{
    CommitKind, EntitySelector, MemoryStore, MergeType, PartCode, RecordStore,
    TransferOrchestrator, Value,
};
use cmdb_sync::{Attributes, FieldId};

const CS: &str = "BMC.CORE:BMC_ComputerSystem";

fn attrs(pairs: &[(FieldId, &str)]) -> Attributes {
    pairs.iter().map(|(f, v)| (*f, Value::from(*v))).collect()
}

/// Source with one computer system and one work log entry
fn source() -> MemoryStore {
    let store = MemoryStore::new("source");
    store.insert(
        CS,
        attrs(&[
            (base::INSTANCE_ID, "CI-7"),
            (base::NAME, "app07"),
            (base::RECONCILIATION_ID, "RE-7"),
        ]),
    );
    store.insert(
        forms::WORK_LOG,
        attrs(&[
            (work_log::ASSET_RECON_ID, "RE-7"),
            (work_log::SUMMARY, "commissioned"),
            (work_log::SUBMIT_DATE, "2026-02-01"),
        ]),
    );
    store
}

fn flat(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn dev_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.yaml");
    let content = std::fs::read_to_string(path).unwrap();
    let config = AppConfig::from_yaml(&content).unwrap();

    assert!(config.sync.bridge);
    assert_eq!(config.sync.classes.get("BMC_COMPUTERSYSTEM").unwrap(), CS);
    assert_eq!(
        config.sync.part_merge(PartCode::CiRelation, None).merge_type,
        MergeType::MergeWithQualifiers
    );
}

#[tokio::test]
async fn transfer_by_form_with_flat_config() {
    let config = SyncConfig::from_flat(&flat(&[
        ("class.BMC_COMPUTERSYSTEM", CS),
        ("cirelation", "false"),
        ("peoplerelation", "false"),
        ("impactedarea", "false"),
    ]))
    .unwrap();

    let target = Arc::new(MemoryStore::new("target"));
    let orchestrator = TransferOrchestrator::new(
        Arc::new(source()) as Arc<dyn RecordStore>,
        target.clone() as Arc<dyn RecordStore>,
        config,
    );

    let report = orchestrator
        .transfer(&EntitySelector::by_form(CS, "CI-7"))
        .await
        .unwrap();

    assert_eq!(report.main_outcome, CommitKind::Created);
    assert_eq!(report.committed_parts.len(), 1);
    assert!(report.is_complete());
    assert_eq!(target.count(CS), 1);
    assert_eq!(target.count(forms::WORK_LOG), 1);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["committed_parts"][0]["part_code"], "workinfo");
    assert_eq!(json["main_entity"], report.main_entity.as_str());
}

/// A second run against the saved snapshot finds what the first one wrote
#[tokio::test]
async fn snapshot_reload_keeps_transfer_idempotent() {
    let mut config = SyncConfig::default();
    config.classes.insert("BMC_COMPUTERSYSTEM".into(), CS.into());
    let selector = EntitySelector::by_class("BMC_COMPUTERSYSTEM", "CI-7");
    let source: Arc<dyn RecordStore> = Arc::new(source());

    let first_target = Arc::new(MemoryStore::new("target"));
    let first = TransferOrchestrator::new(
        source.clone(),
        first_target.clone() as Arc<dyn RecordStore>,
        config.clone(),
    )
    .transfer(&selector)
    .await
    .unwrap();

    let path = std::env::temp_dir().join(format!("cmdb_sync_{}.json", first.transfer_id));
    first_target.save_json(&path).unwrap();
    let second_target = Arc::new(MemoryStore::load_json("target", &path).unwrap());
    std::fs::remove_file(&path).unwrap();

    let second = TransferOrchestrator::new(
        source,
        second_target.clone() as Arc<dyn RecordStore>,
        config,
    )
    .transfer(&selector)
    .await
    .unwrap();

    assert_eq!(first.main_entity, second.main_entity);
    assert_eq!(second.main_outcome, CommitKind::Updated);
    assert_eq!(second_target.count(forms::WORK_LOG), 1);
    assert_eq!(
        second_target.get(CS, &second.main_entity).unwrap().get(&base::NAME),
        Some(&Value::from("app07"))
    );
}

#[tokio::test]
async fn missing_source_is_an_error() {
    let mut config = SyncConfig::default();
    config.classes.insert("BMC_COMPUTERSYSTEM".into(), CS.into());
    let orchestrator = TransferOrchestrator::new(
        Arc::new(MemoryStore::new("source")) as Arc<dyn RecordStore>,
        Arc::new(MemoryStore::new("target")) as Arc<dyn RecordStore>,
        config,
    );

    let err = orchestrator
        .transfer(&EntitySelector::by_class("BMC_COMPUTERSYSTEM", "CI-7"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SOURCE_NOT_FOUND");
}
