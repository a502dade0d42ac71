use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::{MetamodelError, Result};
use crate::model::{EntityId, EntityKind, EntityPatch, EntityRecord, NewEntity, UpsertStatus};
use crate::store::traits::{validate_new_entity, validate_patch, EntityStore, Store};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<EntityRecord>,
    next_id: EntityId,
}

impl Table {
    fn find(&self, kind: EntityKind, name: &str, ecosystem_id: Option<EntityId>) -> Option<&EntityRecord> {
        self.rows
            .iter()
            .find(|row| row.name == name && (kind.is_root() || row.ecosystem_id == ecosystem_id))
    }
}

/// In-process store with the same uniqueness rules as the Postgres schema.
///
/// Each operation holds the table lock for its whole duration, so the
/// existence check and the insert can never interleave.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<EntityKind, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows of one kind
    pub fn count(&self, kind: EntityKind) -> usize {
        self.tables.lock().get(&kind).map_or(0, |t| t.rows.len())
    }

    /// Number of stored rows across all kinds
    pub fn total_rows(&self) -> usize {
        self.tables.lock().values().map(|t| t.rows.len()).sum()
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryStore {
    async fn find_or_create(&self, entity: NewEntity) -> Result<(EntityRecord, UpsertStatus)> {
        validate_new_entity(&entity)?;
        let mut tables = self.tables.lock();
        let table = tables.entry(entity.kind).or_default();

        if let Some(existing) = table.find(entity.kind, &entity.name, entity.ecosystem_id) {
            log::warn!("{} already exists: {}", entity.kind, entity.name);
            return Ok((existing.clone(), UpsertStatus::AlreadyExists));
        }

        table.next_id += 1;
        let record = entity.into_record(table.next_id);
        table.rows.push(record.clone());
        Ok((record, UpsertStatus::Created))
    }

    async fn update(&self, kind: EntityKind, id: EntityId, patch: EntityPatch) -> Result<EntityRecord> {
        validate_patch(kind, &patch)?;
        let mut tables = self.tables.lock();
        let table = tables.entry(kind).or_default();

        let ecosystem_id = table
            .rows
            .iter()
            .find(|row| row.id == id)
            .map(|row| row.ecosystem_id)
            .ok_or(MetamodelError::NotFound { kind, id })?;

        if let Some(clash) = table.find(kind, &patch.name, ecosystem_id) {
            if clash.id != id {
                return Err(MetamodelError::Conflict {
                    kind,
                    name: patch.name,
                });
            }
        }

        let row = table
            .rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(MetamodelError::NotFound { kind, id })?;
        let parent_change = patch.parent_change();
        row.name = patch.name;
        if kind.is_root() {
            if let Some(company_name) = patch.company_name {
                row.company_name = company_name;
            }
        } else if kind.parent_column().is_some() {
            if let Some(parent_id) = parent_change {
                row.parent_id = parent_id;
            }
        }
        Ok(row.clone())
    }

    async fn get_by_name_and_scope(
        &self,
        kind: EntityKind,
        name: &str,
        ecosystem_id: Option<EntityId>,
    ) -> Result<Option<EntityRecord>> {
        let tables = self.tables.lock();
        Ok(tables
            .get(&kind)
            .and_then(|t| t.find(kind, name, ecosystem_id))
            .cloned())
    }

    async fn get_by_id(&self, kind: EntityKind, id: EntityId) -> Result<Option<EntityRecord>> {
        let tables = self.tables.lock();
        Ok(tables
            .get(&kind)
            .and_then(|t| t.rows.iter().find(|row| row.id == id))
            .cloned())
    }

    async fn list(&self, kind: EntityKind, ecosystem_id: Option<EntityId>) -> Result<Vec<EntityRecord>> {
        let tables = self.tables.lock();
        Ok(tables
            .get(&kind)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|row| {
                        kind.is_root() || ecosystem_id.is_none() || row.ecosystem_id == ecosystem_id
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl Store for MemoryStore {}
