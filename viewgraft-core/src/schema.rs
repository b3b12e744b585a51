//! Schema registry: the validator's window onto the model layer.
//!
//! The engine never owns model definitions; it asks a [`SchemaRegistry`]
//! whether fields exist, what they relate to, and whether button targets are
//! callable. [`StaticSchema`] is a plain in-memory registry for tests and
//! embedders with a fixed schema.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Field type name (`char`, `many2one`, `one2many`, ...).
    pub ty: String,
    /// Comodel for relational fields.
    pub relation: Option<String>,
    pub searchable: bool,
    pub stored: bool,
}

impl FieldInfo {
    pub fn scalar(ty: &str) -> FieldInfo {
        FieldInfo {
            ty: ty.to_string(),
            relation: None,
            searchable: true,
            stored: true,
        }
    }

    pub fn relational(ty: &str, comodel: &str) -> FieldInfo {
        FieldInfo {
            ty: ty.to_string(),
            relation: Some(comodel.to_string()),
            searchable: true,
            stored: true,
        }
    }

    pub fn unsearchable(mut self) -> FieldInfo {
        self.searchable = false;
        self
    }

    pub fn is_relational(&self) -> bool {
        self.relation.is_some()
    }
}

pub trait SchemaRegistry {
    fn field_info(&self, model: &str, field: &str) -> Option<FieldInfo>;

    fn field_exists(&self, model: &str, field: &str) -> bool {
        self.field_info(model, field).is_some()
    }

    /// Whether `name` is an action identifier or a public zero-default-arg
    /// callable on `model`.
    fn valid_action(&self, model: &str, name: &str) -> bool;

    /// Unknown groups only produce warnings; a registry that does not track
    /// groups accepts everything.
    fn group_exists(&self, _group: &str) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct StaticSchema {
    models: BTreeMap<String, BTreeMap<String, FieldInfo>>,
    actions: BTreeMap<String, BTreeSet<String>>,
    /// `None` means groups are not tracked and every reference is accepted.
    groups: Option<BTreeSet<String>>,
}

impl StaticSchema {
    pub fn new() -> StaticSchema {
        StaticSchema::default()
    }

    pub fn field(mut self, model: &str, name: &str, info: FieldInfo) -> StaticSchema {
        self.models
            .entry(model.to_string())
            .or_default()
            .insert(name.to_string(), info);
        self
    }

    pub fn action(mut self, model: &str, name: &str) -> StaticSchema {
        self.actions
            .entry(model.to_string())
            .or_default()
            .insert(name.to_string());
        self
    }

    pub fn groups(mut self, groups: impl IntoIterator<Item = &'static str>) -> StaticSchema {
        self.groups = Some(groups.into_iter().map(str::to_string).collect());
        self
    }
}

impl SchemaRegistry for StaticSchema {
    fn field_info(&self, model: &str, field: &str) -> Option<FieldInfo> {
        self.models.get(model)?.get(field).cloned()
    }

    fn valid_action(&self, model: &str, name: &str) -> bool {
        self.actions.get(model).is_some_and(|a| a.contains(name))
    }

    fn group_exists(&self, group: &str) -> bool {
        match &self.groups {
            Some(groups) => groups.contains(group),
            None => true,
        }
    }
}
