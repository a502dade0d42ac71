use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

pub type EntityId = i32;

/// The seven levels of the metamodel hierarchy, root first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ecosystem,
    BusinessCapability,
    BusinessService,
    ApplicationService,
    ApplicationComponent,
    ApplicationImplementation,
    Problem,
}

impl EntityKind {
    /// All kinds in parent-to-child order
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Ecosystem,
        EntityKind::BusinessCapability,
        EntityKind::BusinessService,
        EntityKind::ApplicationService,
        EntityKind::ApplicationComponent,
        EntityKind::ApplicationImplementation,
        EntityKind::Problem,
    ];

    /// Table name, also used as the REST path segment
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Ecosystem => "ecosystem",
            EntityKind::BusinessCapability => "business_capability",
            EntityKind::BusinessService => "business_service",
            EntityKind::ApplicationService => "application_service",
            EntityKind::ApplicationComponent => "application_component",
            EntityKind::ApplicationImplementation => "application_implementation",
            EntityKind::Problem => "problem",
        }
    }

    /// Column holding the foreign key to the parent kind.
    ///
    /// Business capabilities hang directly off their ecosystem, so they (and
    /// the ecosystem itself) carry no separate parent column.
    pub fn parent_column(self) -> Option<&'static str> {
        match self {
            EntityKind::Ecosystem | EntityKind::BusinessCapability => None,
            EntityKind::BusinessService => Some("business_capability_id"),
            EntityKind::ApplicationService => Some("business_service_id"),
            EntityKind::ApplicationComponent => Some("application_service_id"),
            EntityKind::ApplicationImplementation => Some("application_component_id"),
            EntityKind::Problem => Some("application_implementation_id"),
        }
    }

    /// Key under which this kind's identifier appears in an identifier chain
    pub fn chain_key(self) -> &'static str {
        match self {
            EntityKind::Ecosystem => "ecosystem_id",
            EntityKind::BusinessCapability => "business_capability_id",
            EntityKind::BusinessService => "business_service_id",
            EntityKind::ApplicationService => "application_service_id",
            EntityKind::ApplicationComponent => "application_component_id",
            EntityKind::ApplicationImplementation => "application_implementation_id",
            EntityKind::Problem => "problem_statement_id",
        }
    }

    pub fn is_root(self) -> bool {
        self == EntityKind::Ecosystem
    }

    pub fn parent(self) -> Option<EntityKind> {
        let idx = self.position();
        if idx == 0 {
            None
        } else {
            Some(Self::ALL[idx - 1])
        }
    }

    pub fn child(self) -> Option<EntityKind> {
        Self::ALL.get(self.position() + 1).copied()
    }

    /// Zero-based depth in the hierarchy
    pub fn position(self) -> usize {
        Self::ALL
            .iter()
            .position(|k| *k == self)
            .unwrap_or_default()
    }

    pub fn from_table(name: &str) -> Option<EntityKind> {
        Self::ALL.iter().copied().find(|k| k.table() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Outcome of a find-or-create call. Never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpsertStatus {
    Created,
    AlreadyExists,
}

/// One stored row of any kind.
///
/// Serialized with the kind-specific parent column name so that a business
/// service comes out as `{ ..., "business_capability_id": 3 }`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub id: EntityId,
    pub name: String,
    /// Owning ecosystem; `None` only for ecosystems themselves
    pub ecosystem_id: Option<EntityId>,
    pub parent_id: Option<EntityId>,
    pub description: Option<String>,
    /// Only meaningful for ecosystems
    pub company_name: Option<String>,
}

impl Serialize for EntityRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("name", &self.name)?;
        if self.kind.is_root() {
            map.serialize_entry("company_name", &self.company_name)?;
        } else {
            map.serialize_entry("ecosystem_id", &self.ecosystem_id)?;
            if let Some(column) = self.kind.parent_column() {
                map.serialize_entry(column, &self.parent_id)?;
            }
            map.serialize_entry("description", &self.description)?;
        }
        map.end()
    }
}

/// Input to find-or-create
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    pub kind: EntityKind,
    pub name: String,
    pub ecosystem_id: Option<EntityId>,
    pub parent_id: Option<EntityId>,
    pub description: Option<String>,
    pub company_name: Option<String>,
}

impl NewEntity {
    pub fn ecosystem(name: impl Into<String>, company_name: Option<String>) -> Self {
        Self {
            kind: EntityKind::Ecosystem,
            name: name.into(),
            ecosystem_id: None,
            parent_id: None,
            description: None,
            company_name,
        }
    }

    pub fn scoped(
        kind: EntityKind,
        name: impl Into<String>,
        ecosystem_id: EntityId,
        parent_id: Option<EntityId>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            ecosystem_id: Some(ecosystem_id),
            parent_id: normalize_parent(parent_id),
            description: None,
            company_name: None,
        }
    }

    /// Materialize the row as it will be stored under `id`
    pub fn into_record(self, id: EntityId) -> EntityRecord {
        let root = self.kind.is_root();
        EntityRecord {
            kind: self.kind,
            id,
            name: self.name,
            ecosystem_id: if root { None } else { self.ecosystem_id },
            parent_id: if self.kind.parent_column().is_some() {
                normalize_parent(self.parent_id)
            } else {
                None
            },
            description: if root { None } else { self.description },
            company_name: if root { self.company_name } else { None },
        }
    }
}

/// Mutable fields of an existing row.
///
/// `parent_id` and `company_name` are tri-state: `None` keeps the stored
/// value, `Some(None)` clears it and `Some(Some(v))` overwrites it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityPatch {
    pub name: String,
    pub parent_id: Option<Option<EntityId>>,
    pub company_name: Option<Option<String>>,
}

impl EntityPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parent change to apply, with non-positive ids treated as a clear
    pub fn parent_change(&self) -> Option<Option<EntityId>> {
        self.parent_id.map(normalize_parent)
    }
}

/// Parent ids that are absent or not positive mean "no parent".
pub fn normalize_parent(parent_id: Option<EntityId>) -> Option<EntityId> {
    parent_id.filter(|id| *id > 0)
}
