use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core_types::FieldId;
use crate::fields::base;
use crate::sync::criteria::Criteria;
use crate::sync::error::SyncError;
use crate::sync::mapper::FieldMapping;
use crate::sync::merge::{MergeDescriptor, MergeType};
use crate::sync::parts::PartCode;
use crate::sync::record::Value;
use crate::sync::waiter::WaitPlan;

/// Key of the main entity in the per-target `merge` and `mappings` tables
pub const ENTITY_TARGET: &str = "entity";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Load `config/<env>.yaml`
    pub fn load(env: &str) -> Result<Self, SyncError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .map_err(|e| SyncError::Config(format!("{}: {}", config_path, e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, SyncError> {
        serde_yaml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))
    }
}

/// Which part codes a transfer processes
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct PartToggles {
    pub workinfo: bool,
    pub cirelation: bool,
    pub peoplerelation: bool,
    pub impactedarea: bool,
}

impl Default for PartToggles {
    fn default() -> Self {
        Self {
            workinfo: true,
            cirelation: true,
            peoplerelation: true,
            impactedarea: true,
        }
    }
}

impl PartToggles {
    pub fn is_enabled(&self, code: PartCode) -> bool {
        match code {
            PartCode::WorkInfo => self.workinfo,
            PartCode::CiRelation => self.cirelation,
            PartCode::PeopleRelation => self.peoplerelation,
            PartCode::ImpactedArea => self.impactedarea,
        }
    }

    pub fn set(&mut self, code: PartCode, enabled: bool) {
        match code {
            PartCode::WorkInfo => self.workinfo = enabled,
            PartCode::CiRelation => self.cirelation = enabled,
            PartCode::PeopleRelation => self.peoplerelation = enabled,
            PartCode::ImpactedArea => self.impactedarea = enabled,
        }
    }

    /// Enabled codes in processing order
    pub fn enabled(&self) -> impl Iterator<Item = PartCode> + '_ {
        PartCode::ALL.into_iter().filter(|code| self.is_enabled(*code))
    }
}

/// Reconciliation trigger and wait settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReconcileConfig {
    pub marker_field: FieldId,
    pub marker_value: i64,
    /// Record type of the derived record; the entity's own when unset
    pub derived_form: Option<String>,
    pub key_field: FieldId,
    pub cross_ref_field: FieldId,
    /// Dataset the derived record appears in
    pub derived_dataset: Option<String>,
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            marker_field: base::RECON_REQUEST,
            marker_value: 1,
            derived_form: None,
            key_field: base::RECONCILIATION_ID,
            cross_ref_field: base::RECONCILIATION_ID,
            derived_dataset: Some("BMC.ASSET".to_string()),
            max_attempts: 5,
            interval_ms: 1000,
        }
    }
}

impl ReconcileConfig {
    pub fn plan(&self, entity_form: &str) -> WaitPlan {
        WaitPlan {
            marker_field: self.marker_field,
            marker_value: Value::Integer(self.marker_value),
            derived_record_type: self
                .derived_form
                .clone()
                .unwrap_or_else(|| entity_form.to_string()),
            key_field: self.key_field,
            cross_ref_field: self.cross_ref_field,
            derived_filter: self
                .derived_dataset
                .as_deref()
                .map(|dataset| Criteria::eq(base::DATASET_ID, dataset)),
            max_attempts: self.max_attempts,
            interval: Duration::from_millis(self.interval_ms),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SyncConfig {
    pub parts: PartToggles,
    pub ignore_unchanged: bool,
    pub default_merge: MergeDescriptor,
    /// Per-target overrides, keyed by `entity` or a part code
    pub merge: BTreeMap<String, MergeDescriptor>,
    /// Per-target field mappings; identity minus store-assigned fields when absent
    pub mappings: BTreeMap<String, FieldMapping>,
    /// Class id → record type
    pub classes: BTreeMap<String, String>,
    /// Use the source store to complete foreign references
    pub bridge: bool,
    pub reconcile: Option<ReconcileConfig>,
}

impl SyncConfig {
    pub fn entity_merge(&self) -> MergeDescriptor {
        self.merge
            .get(ENTITY_TARGET)
            .cloned()
            .unwrap_or_else(|| self.default_merge.clone())
    }

    /// Configured override, then the handler's own default, then the global default
    pub fn part_merge(&self, code: PartCode, handler_default: Option<&MergeDescriptor>) -> MergeDescriptor {
        self.merge
            .get(code.as_str())
            .or(handler_default)
            .cloned()
            .unwrap_or_else(|| self.default_merge.clone())
    }

    pub fn mapping_for(&self, target: &str) -> Option<&FieldMapping> {
        self.mappings.get(target)
    }

    /// Build from the flat key/value form.
    ///
    /// ```text
    /// workinfo=false
    /// ignore_unchanged=true
    /// bridge=true
    /// merge_type=CREATE_OR_UPDATE
    /// merge_type.cirelation=MERGE_WITH_QUALIFIERS
    /// qualifiers.cirelation=179,400127400
    /// class.BMC_COMPUTERSYSTEM=BMC.CORE:BMC_ComputerSystem
    /// map.entity.8=8
    /// reconcile.max_attempts=10
    /// ```
    pub fn from_flat(flat: &BTreeMap<String, String>) -> Result<Self, SyncError> {
        let mut config = SyncConfig::default();

        // global keys first so per-target entries start from the final default
        let (globals, scoped): (Vec<_>, Vec<_>) =
            flat.iter().partition(|(key, _)| !key.contains('.'));

        for (key, value) in globals {
            match key.as_str() {
                "ignore_unchanged" => config.ignore_unchanged = parse_bool(key, value)?,
                "bridge" => config.bridge = parse_bool(key, value)?,
                "merge_type" => config.default_merge.merge_type = value.parse()?,
                "qualifiers" => config.default_merge.qualifiers = parse_fields(key, value)?,
                other => {
                    let code: PartCode = other
                        .parse()
                        .map_err(|_| SyncError::Config(format!("unknown key: {}", other)))?;
                    config.parts.set(code, parse_bool(key, value)?);
                }
            }
        }

        for (key, value) in scoped {
            let Some((prefix, rest)) = key.split_once('.') else {
                continue;
            };
            match prefix {
                "merge_type" => {
                    let merge_type: MergeType = value.parse()?;
                    config.merge_entry(rest)?.merge_type = merge_type;
                }
                "qualifiers" => {
                    let fields = parse_fields(key, value)?;
                    config.merge_entry(rest)?.qualifiers = fields;
                }
                "class" => {
                    config.classes.insert(rest.to_string(), value.clone());
                }
                "map" => {
                    let (target, source_field) = rest
                        .split_once('.')
                        .ok_or_else(|| SyncError::Config(format!("bad mapping key: {}", key)))?;
                    check_target(target)?;
                    let src = parse_field(key, source_field)?;
                    let dst = parse_field(key, value)?;
                    config
                        .mappings
                        .entry(target.to_string())
                        .or_default()
                        .insert(src, dst);
                }
                "reconcile" => {
                    let reconcile = config.reconcile.get_or_insert_with(ReconcileConfig::default);
                    match rest {
                        "max_attempts" => reconcile.max_attempts = parse_number(key, value)?,
                        "interval_ms" => reconcile.interval_ms = parse_number(key, value)?,
                        "dataset" => reconcile.derived_dataset = Some(value.clone()),
                        "form" => reconcile.derived_form = Some(value.clone()),
                        _ => return Err(SyncError::Config(format!("unknown key: {}", key))),
                    }
                }
                _ => return Err(SyncError::Config(format!("unknown key: {}", key))),
            }
        }

        Ok(config)
    }

    fn merge_entry(&mut self, target: &str) -> Result<&mut MergeDescriptor, SyncError> {
        check_target(target)?;
        let default = self.default_merge.clone();
        Ok(self.merge.entry(target.to_string()).or_insert(default))
    }
}

fn check_target(target: &str) -> Result<(), SyncError> {
    if target == ENTITY_TARGET {
        return Ok(());
    }
    target.parse::<PartCode>().map(|_| ())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SyncError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        other => Err(SyncError::Config(format!("{}: not a boolean: {}", key, other))),
    }
}

fn parse_field(key: &str, value: &str) -> Result<FieldId, SyncError> {
    parse_number(key, value)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SyncError> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::Config(format!("{}: not a number: {}", key, value)))
}

fn parse_fields(key: &str, value: &str) -> Result<Vec<FieldId>, SyncError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_field(key, s))
        .collect()
}
