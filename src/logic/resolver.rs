use crate::error::{MetamodelError, Result};
use crate::model::{EntityKind, IdentifierChain, LevelStatus, NewEntity};
use crate::store::EntityStore;

/// One requested level below the ecosystem
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyLevel {
    pub kind: EntityKind,
    pub name: String,
    pub description: Option<String>,
}

/// Ordered chain request. The ecosystem level is implied by `scope_name`;
/// `levels` start at business capability and descend one kind at a time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HierarchyRequest {
    pub scope_name: String,
    pub company_name: Option<String>,
    pub levels: Vec<HierarchyLevel>,
}

impl HierarchyRequest {
    pub fn new(scope_name: impl Into<String>) -> Self {
        Self {
            scope_name: scope_name.into(),
            company_name: None,
            levels: Vec::new(),
        }
    }

    pub fn level(mut self, kind: EntityKind, name: impl Into<String>) -> Self {
        self.levels.push(HierarchyLevel {
            kind,
            name: name.into(),
            description: None,
        });
        self
    }

    pub fn described_level(
        mut self,
        kind: EntityKind,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.levels.push(HierarchyLevel {
            kind,
            name: name.into(),
            description: Some(description.into()),
        });
        self
    }

    /// Levels must follow the hierarchy without gaps, starting below the ecosystem
    pub fn validate(&self) -> Result<()> {
        let mut expected = EntityKind::Ecosystem.child();
        for level in &self.levels {
            if Some(level.kind) != expected {
                return Err(MetamodelError::InvalidInput(format!(
                    "level {} is out of order, expected {}",
                    level.kind,
                    expected.map_or("end of chain".to_string(), |k| k.to_string())
                )));
            }
            expected = level.kind.child();
        }
        Ok(())
    }
}

/// Resolves a chain of parent-linked entities through find-or-create
pub struct HierarchyResolver;

impl HierarchyResolver {
    /// Resolve every level in parent-to-child order.
    ///
    /// Each level is its own store call and commits independently. On failure
    /// the levels already resolved stay persisted and are reported in the
    /// error's partial chain. An empty name skips that level and all deeper
    /// ones.
    pub async fn resolve<S: EntityStore + ?Sized>(
        store: &S,
        request: &HierarchyRequest,
    ) -> Result<IdentifierChain> {
        request.validate()?;
        let mut chain = IdentifierChain::default();

        let scope_name = request.scope_name.trim();
        if scope_name.is_empty() {
            log::debug!("empty ecosystem name, skipping whole chain");
            chain.record(EntityKind::Ecosystem, "", 0, LevelStatus::Skipped);
            for level in &request.levels {
                chain.record(level.kind, level.name.trim(), 0, LevelStatus::Skipped);
            }
            return Ok(chain);
        }

        let (ecosystem, status) = store
            .find_or_create(NewEntity::ecosystem(scope_name, request.company_name.clone()))
            .await
            .map_err(|e| Self::level_failed(EntityKind::Ecosystem, &chain, e))?;
        chain.record(EntityKind::Ecosystem, scope_name, ecosystem.id, status.into());

        let mut parent_id = ecosystem.id;
        let mut skipping = false;
        for level in &request.levels {
            let name = level.name.trim();
            if skipping || name.is_empty() {
                skipping = true;
                chain.record(level.kind, name, 0, LevelStatus::Skipped);
                continue;
            }

            let parent = level.kind.parent_column().map(|_| parent_id);
            let mut entity = NewEntity::scoped(level.kind, name, ecosystem.id, parent);
            entity.description = level.description.clone();

            let (record, status) = store
                .find_or_create(entity)
                .await
                .map_err(|e| Self::level_failed(level.kind, &chain, e))?;
            log::debug!("{} '{}' resolved to {} ({:?})", level.kind, name, record.id, status);
            chain.record(level.kind, name, record.id, status.into());
            parent_id = record.id;
        }

        log::info!(
            "resolved chain for ecosystem '{}': {} created, {} levels",
            scope_name,
            chain.created_count(),
            chain.levels.len()
        );
        Ok(chain)
    }

    fn level_failed(level: EntityKind, chain: &IdentifierChain, source: MetamodelError) -> MetamodelError {
        log::error!("failed to resolve {}: {}", level, source);
        MetamodelError::LevelFailed {
            level,
            partial: Box::new(chain.clone()),
            source: Box::new(source),
        }
    }
}
