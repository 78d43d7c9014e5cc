//! Class catalog
//!
//! Bidirectional lookup between a managed entity's class id and the
//! record type (form) it is stored in.

use std::collections::{BTreeMap, HashMap};

use super::error::SyncError;

/// How a caller identifies the class of a managed entity.
/// Exactly one side is supplied; the catalog derives the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassSelector {
    ClassId(String),
    Form(String),
}

#[derive(Debug, Clone, Default)]
pub struct ClassCatalog {
    by_class: HashMap<String, String>,
    by_form: HashMap<String, String>,
}

impl ClassCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a `class id -> record type` table
    pub fn from_map(classes: &BTreeMap<String, String>) -> Self {
        let mut catalog = Self::new();
        for (class_id, form) in classes {
            catalog.register(class_id.clone(), form.clone());
        }
        catalog
    }

    pub fn register(&mut self, class_id: impl Into<String>, form: impl Into<String>) {
        let class_id = class_id.into();
        let form = form.into();
        self.by_form.insert(form.clone(), class_id.clone());
        self.by_class.insert(class_id, form);
    }

    pub fn form_for(&self, class_id: &str) -> Result<&str, SyncError> {
        self.by_class
            .get(class_id)
            .map(String::as_str)
            .ok_or_else(|| SyncError::UnknownClass(class_id.to_string()))
    }

    pub fn class_for(&self, form: &str) -> Result<&str, SyncError> {
        self.by_form
            .get(form)
            .map(String::as_str)
            .ok_or_else(|| SyncError::UnknownClass(format!("no class stored in {}", form)))
    }

    /// Resolve a selector into `(class id, form)`
    pub fn resolve(&self, selector: &ClassSelector) -> Result<(String, String), SyncError> {
        match selector {
            ClassSelector::ClassId(class_id) => {
                let form = self.form_for(class_id)?;
                Ok((class_id.clone(), form.to_string()))
            }
            ClassSelector::Form(form) => {
                let class_id = self.class_for(form)?;
                Ok((class_id.to_string(), form.clone()))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_class.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ClassCatalog {
        let mut c = ClassCatalog::new();
        c.register("BMC_COMPUTERSYSTEM", "BMC.CORE:BMC_ComputerSystem");
        c
    }

    #[test]
    fn test_resolve_both_directions() {
        let c = catalog();
        let (class, form) = c
            .resolve(&ClassSelector::ClassId("BMC_COMPUTERSYSTEM".into()))
            .unwrap();
        assert_eq!(form, "BMC.CORE:BMC_ComputerSystem");
        assert_eq!(class, "BMC_COMPUTERSYSTEM");

        let (class, _) = c
            .resolve(&ClassSelector::Form("BMC.CORE:BMC_ComputerSystem".into()))
            .unwrap();
        assert_eq!(class, "BMC_COMPUTERSYSTEM");
    }

    #[test]
    fn test_unknown_class() {
        let err = catalog()
            .resolve(&ClassSelector::ClassId("BMC_PRINTER".into()))
            .unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_CLASS");
    }
}
