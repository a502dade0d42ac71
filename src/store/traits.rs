use crate::error::Result;
use crate::model::{EntityId, EntityKind, EntityPatch, EntityRecord, NewEntity, UpsertStatus};

#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    /// Return the row matching (name, ecosystem) or insert it.
    ///
    /// An existing row is returned untouched: the parent id in `entity` is
    /// ignored on a match.
    async fn find_or_create(&self, entity: NewEntity) -> Result<(EntityRecord, UpsertStatus)>;
    /// Overwrite the mutable fields of row `id`; fails with `NotFound` when absent
    async fn update(&self, kind: EntityKind, id: EntityId, patch: EntityPatch) -> Result<EntityRecord>;
    /// Point lookup; `ecosystem_id` is ignored for ecosystems
    async fn get_by_name_and_scope(
        &self,
        kind: EntityKind,
        name: &str,
        ecosystem_id: Option<EntityId>,
    ) -> Result<Option<EntityRecord>>;
    async fn get_by_id(&self, kind: EntityKind, id: EntityId) -> Result<Option<EntityRecord>>;
    /// Rows of one kind ordered by id, optionally limited to one ecosystem
    async fn list(&self, kind: EntityKind, ecosystem_id: Option<EntityId>) -> Result<Vec<EntityRecord>>;
}

pub trait Store: EntityStore + Send + Sync {}

/// Shared input checks for every store implementation
pub(crate) fn validate_new_entity(entity: &NewEntity) -> Result<()> {
    use crate::error::MetamodelError;

    if entity.name.trim().is_empty() {
        return Err(MetamodelError::InvalidInput(format!(
            "{} name must not be empty",
            entity.kind
        )));
    }
    if !entity.kind.is_root() && entity.ecosystem_id.is_none() {
        return Err(MetamodelError::InvalidInput(format!(
            "{} '{}' requires an ecosystem",
            entity.kind, entity.name
        )));
    }
    Ok(())
}

pub(crate) fn validate_patch(kind: EntityKind, patch: &EntityPatch) -> Result<()> {
    if patch.name.trim().is_empty() {
        return Err(crate::error::MetamodelError::InvalidInput(format!(
            "{} name must not be empty",
            kind
        )));
    }
    Ok(())
}
