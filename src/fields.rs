//! Well-known field identifiers, grouped by record type.
//!
//! Field numbers are record-type scoped: `work_log::ASSET_RECON_ID` and
//! `asset_people::ASSET_RECON_ID` share a number but live on different forms.
//!
//! # Usage
//!
//! ```ignore
//! use cmdb_sync::fields::base;
//!
//! let instance = record.get_str(base::INSTANCE_ID);
//! ```

/// Core fields present on every stored record.
pub mod common {
    use crate::core_types::FieldId;

    /// Store-assigned entry id
    pub const REQUEST_ID: FieldId = 1;
    pub const SUBMITTER: FieldId = 2;
    pub const CREATE_DATE: FieldId = 3;
    pub const LAST_MODIFIED_BY: FieldId = 5;
    pub const MODIFIED_DATE: FieldId = 6;
    pub const STATUS: FieldId = 7;
    pub const SHORT_DESCRIPTION: FieldId = 8;

    /// Fields every store fills in by itself; never copied across stores.
    pub const STORE_ASSIGNED: &[FieldId] = &[
        REQUEST_ID,
        SUBMITTER,
        CREATE_DATE,
        LAST_MODIFIED_BY,
        MODIFIED_DATE,
    ];
}

/// Fields shared by all configuration item (managed entity) forms.
pub mod base {
    use crate::core_types::FieldId;

    /// Stable cross-store identity key
    pub const INSTANCE_ID: FieldId = 179;
    pub const CLASS_ID: FieldId = 400079600;
    pub const NAME: FieldId = 400127300;
    pub const DATASET_ID: FieldId = 400127400;
    /// Groups instances describing the same real thing across datasets
    pub const RECONCILIATION_ID: FieldId = 400129200;
    pub const MARK_AS_DELETED: FieldId = 400129100;
    /// Written to request reconciliation of an instance
    pub const RECON_REQUEST: FieldId = 400130900;
}

/// Relationship form (`cirelation` parts).
pub mod relationship {
    use crate::core_types::FieldId;

    pub const INSTANCE_ID: FieldId = 179;
    pub const NAME: FieldId = 400127300;
    pub const DATASET_ID: FieldId = 400127400;
    pub const SOURCE_INSTANCE_ID: FieldId = 400128800;
    pub const SOURCE_CLASS_ID: FieldId = 400128900;
    pub const DESTINATION_INSTANCE_ID: FieldId = 400129000;
    pub const DESTINATION_CLASS_ID: FieldId = 400129300;
}

/// Work history entries (`workinfo` parts).
pub mod work_log {
    use crate::core_types::FieldId;

    pub const ASSET_RECON_ID: FieldId = 301600300;
    pub const WORK_TYPE: FieldId = 1000000170;
    pub const SUMMARY: FieldId = 1000000000;
    pub const NOTES: FieldId = 1000000151;
    pub const SUBMIT_DATE: FieldId = 1000000157;
}

/// People/group associations (`peoplerelation` parts).
pub mod asset_people {
    use crate::core_types::FieldId;

    pub const ASSET_RECON_ID: FieldId = 301600300;
    /// Store-assigned person id of the associated person
    pub const PERSON_ID: FieldId = 260100001;
    pub const LOGIN_ID: FieldId = 260100004;
    pub const ROLE: FieldId = 1000001759;
}

/// Impacted-area associations (`impactedarea` parts).
pub mod impacted_area {
    use crate::core_types::FieldId;

    pub const ASSET_RECON_ID: FieldId = 301600300;
    pub const COMPANY: FieldId = 1000000001;
    pub const REGION: FieldId = 200000012;
    /// Store-assigned id of the impacted site
    pub const SITE_ID: FieldId = 1000000074;
    pub const SITE_NAME: FieldId = 260000001;
}

/// People records, the target of `peoplerelation` references.
pub mod people {
    use crate::core_types::FieldId;

    /// Login-style identifier, the primary lookup key
    pub const LOGIN_ID: FieldId = 4;
    /// Store-assigned person id
    pub const PERSON_ID: FieldId = 1000000080;
    pub const CORPORATE_ID: FieldId = 1000000065;
    pub const FIRST_NAME: FieldId = 1000000019;
    pub const LAST_NAME: FieldId = 1000000018;
    pub const SITE_ID: FieldId = 1000000074;
    pub const COST_CENTER_ID: FieldId = 1000000081;
}

/// Site (location) records.
pub mod site {
    use crate::core_types::FieldId;

    pub const NAME: FieldId = 260000001;
    /// Store-assigned site id
    pub const SITE_ID: FieldId = 1000000074;
    pub const COMPANY: FieldId = 1000000001;
}

/// Cost-center records.
pub mod cost_center {
    use crate::core_types::FieldId;

    pub const CODE: FieldId = 1000000350;
    /// Store-assigned cost-center id
    pub const COST_CENTER_ID: FieldId = 1000000081;
    pub const COMPANY: FieldId = 1000000001;
}

/// Record type names.
pub mod forms {
    pub const BASE_ELEMENT: &str = "BMC.CORE:BMC_BaseElement";
    pub const BASE_RELATIONSHIP: &str = "BMC.CORE:BMC_BaseRelationship";
    pub const WORK_LOG: &str = "AST:WorkLog";
    pub const ASSET_PEOPLE: &str = "AST:AssetPeople";
    pub const IMPACTED_AREAS: &str = "AST:Impacted Areas";
    pub const PEOPLE: &str = "CTM:People";
    pub const SITE: &str = "SIT:Site";
    pub const COST_CENTER: &str = "FIN:CostCenter";
}
