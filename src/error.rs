//! Error taxonomy for store, resolver and ingestion operations.
//!
//! "Already exists" is not an error: find-or-create reports it as
//! data through [`crate::model::UpsertStatus`].

use thiserror::Error;

use crate::model::{EntityId, EntityKind, IdentifierChain};

pub type Result<T> = std::result::Result<T, MetamodelError>;

#[derive(Debug, Error)]
pub enum MetamodelError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: EntityId },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("ecosystem {0} does not exist")]
    InvalidScope(String),

    #[error("{kind} named '{name}' already exists in this scope")]
    Conflict { kind: EntityKind, name: String },

    #[error("upstream capability failed: {0}")]
    Upstream(String),

    #[error("store failure: {context}")]
    Store {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("resolving level {level} failed: {source}")]
    LevelFailed {
        level: EntityKind,
        /// Levels committed before the failure
        partial: Box<IdentifierChain>,
        #[source]
        source: Box<MetamodelError>,
    },
}

impl MetamodelError {
    pub fn store(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        MetamodelError::Store {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Innermost error, looking through level failures
    pub fn root_cause(&self) -> &MetamodelError {
        match self {
            MetamodelError::LevelFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
