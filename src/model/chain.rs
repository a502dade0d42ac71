use serde::{Deserialize, Serialize};

use crate::model::{EntityId, EntityKind, UpsertStatus};

/// Per-level outcome reported by the hierarchy resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LevelStatus {
    Created,
    AlreadyExists,
    Skipped,
}

impl From<UpsertStatus> for LevelStatus {
    fn from(status: UpsertStatus) -> Self {
        match status {
            UpsertStatus::Created => LevelStatus::Created,
            UpsertStatus::AlreadyExists => LevelStatus::AlreadyExists,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelResolution {
    pub kind: EntityKind,
    pub name: String,
    /// 0 when the level was skipped
    pub id: EntityId,
    pub status: LevelStatus,
}

/// Identifiers produced by one resolver run, one per hierarchy level.
///
/// Levels that were not requested or were skipped stay at 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifierChain {
    pub ecosystem_id: EntityId,
    pub business_capability_id: EntityId,
    pub business_service_id: EntityId,
    pub application_service_id: EntityId,
    pub application_component_id: EntityId,
    pub application_implementation_id: EntityId,
    pub problem_statement_id: EntityId,
    pub levels: Vec<LevelResolution>,
}

impl IdentifierChain {
    pub fn id_for(&self, kind: EntityKind) -> EntityId {
        match kind {
            EntityKind::Ecosystem => self.ecosystem_id,
            EntityKind::BusinessCapability => self.business_capability_id,
            EntityKind::BusinessService => self.business_service_id,
            EntityKind::ApplicationService => self.application_service_id,
            EntityKind::ApplicationComponent => self.application_component_id,
            EntityKind::ApplicationImplementation => self.application_implementation_id,
            EntityKind::Problem => self.problem_statement_id,
        }
    }

    pub fn status_for(&self, kind: EntityKind) -> Option<LevelStatus> {
        self.levels
            .iter()
            .find(|level| level.kind == kind)
            .map(|level| level.status)
    }

    pub(crate) fn record(&mut self, kind: EntityKind, name: &str, id: EntityId, status: LevelStatus) {
        let slot = match kind {
            EntityKind::Ecosystem => &mut self.ecosystem_id,
            EntityKind::BusinessCapability => &mut self.business_capability_id,
            EntityKind::BusinessService => &mut self.business_service_id,
            EntityKind::ApplicationService => &mut self.application_service_id,
            EntityKind::ApplicationComponent => &mut self.application_component_id,
            EntityKind::ApplicationImplementation => &mut self.application_implementation_id,
            EntityKind::Problem => &mut self.problem_statement_id,
        };
        *slot = id;
        self.levels.push(LevelResolution {
            kind,
            name: name.to_string(),
            id,
            status,
        });
    }

    /// Number of levels that inserted a new row
    pub fn created_count(&self) -> usize {
        self.levels
            .iter()
            .filter(|level| level.status == LevelStatus::Created)
            .count()
    }
}

/// Flat set of names produced by a classifier, one per hierarchy level.
/// Any field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeBundle {
    pub ecosystem_name: String,
    pub business_capability: String,
    pub business_service: String,
    pub application_service: String,
    pub application_component: String,
    pub application_implementation: String,
    pub problem_statement: String,
}

impl AttributeBundle {
    pub fn is_empty(&self) -> bool {
        self.ecosystem_name.trim().is_empty()
    }
}
