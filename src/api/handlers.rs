use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::MetamodelError;
use crate::logic::IngestionWorkflow;
use crate::model::{
    normalize_parent, EntityId, EntityKind, EntityPatch, EntityRecord, IdentifierChain,
    NewEntity, UpsertStatus,
};
use crate::store::traits::Store;

/// Everything a handler needs: the store and the ingestion workflow over it
pub struct AppContext<S: Store> {
    pub store: Arc<S>,
    pub ingest: IngestionWorkflow<S>,
}

pub type AppState<S> = Arc<AppContext<S>>;

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_level: Option<EntityKind>,
    /// Levels committed before a chain failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<IdentifierChain>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            failed_level: None,
            partial: None,
        }
    }
}

fn status_for(err: &MetamodelError) -> StatusCode {
    match err.root_cause() {
        MetamodelError::NotFound { .. } => StatusCode::NOT_FOUND,
        MetamodelError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        MetamodelError::InvalidScope(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MetamodelError::Conflict { .. } => StatusCode::CONFLICT,
        MetamodelError::Upstream(_) => StatusCode::BAD_GATEWAY,
        MetamodelError::Store { .. } | MetamodelError::LevelFailed { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: MetamodelError) -> HandlerError {
    let status = status_for(&err);
    if status.is_server_error() {
        log::error!("request failed: {}", err);
    }
    let mut body = ErrorResponse::new(&err.to_string());
    if let MetamodelError::LevelFailed { level, partial, .. } = err {
        body.failed_level = Some(level);
        body.partial = Some(*partial);
    }
    (status, Json(body))
}

/// Body of `POST /<entity>`.
///
/// The parent link travels under its table-specific column name
/// (`business_capability_id`, `application_service_id`, ...) and is picked
/// out of the remaining fields. On update, a field left out keeps its stored
/// value while an explicit `null` clears it.
#[derive(Debug, Deserialize)]
pub struct UpsertEntityRequest {
    pub id: Option<EntityId>,
    pub name: String,
    pub ecosystem_id: Option<EntityId>,
    pub scope_name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub company_name: Option<Option<String>>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub links: HashMap<String, serde_json::Value>,
}

impl UpsertEntityRequest {
    /// `None` when the parent field is absent, `Some(None)` when it is null
    /// or not a positive id
    fn parent_field(&self, kind: EntityKind) -> Option<Option<EntityId>> {
        let column = kind.parent_column()?;
        let raw = self.links.get(column).or_else(|| self.links.get("parent_id"))?;
        let id = raw
            .as_i64()
            .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
            .and_then(|id| EntityId::try_from(id).ok());
        Some(normalize_parent(id))
    }

    fn parent_id(&self, kind: EntityKind) -> Option<EntityId> {
        self.parent_field(kind).flatten()
    }
}

#[derive(Debug, Serialize)]
pub struct UpsertResponse {
    #[serde(flatten)]
    pub record: EntityRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<UpsertStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub ecosystem_id: Option<EntityId>,
}

#[derive(Debug, Deserialize)]
pub struct InfoBlockRequest {
    #[serde(rename = "textIn")]
    pub text_in: String,
}

/// Owning ecosystem for a scoped create, by id or by name
async fn resolve_scope<S: Store>(store: &S, req: &UpsertEntityRequest) -> Result<EntityId, MetamodelError> {
    if let Some(ecosystem_id) = req.ecosystem_id.filter(|id| *id > 0) {
        return match store.get_by_id(EntityKind::Ecosystem, ecosystem_id).await? {
            Some(ecosystem) => Ok(ecosystem.id),
            None => Err(MetamodelError::InvalidScope(ecosystem_id.to_string())),
        };
    }
    if let Some(scope_name) = req.scope_name.as_deref().filter(|s| !s.trim().is_empty()) {
        return match store
            .get_by_name_and_scope(EntityKind::Ecosystem, scope_name, None)
            .await?
        {
            Some(ecosystem) => Ok(ecosystem.id),
            None => Err(MetamodelError::InvalidScope(scope_name.to_string())),
        };
    }
    Err(MetamodelError::InvalidInput(
        "ecosystem_id or scope_name is required".to_string(),
    ))
}

/// The parent must exist and live in the same ecosystem
async fn check_parent<S: Store>(
    store: &S,
    kind: EntityKind,
    ecosystem_id: EntityId,
    parent_id: Option<EntityId>,
) -> Result<(), MetamodelError> {
    let (Some(parent_id), Some(parent_kind)) = (parent_id, kind.parent()) else {
        return Ok(());
    };
    match store.get_by_id(parent_kind, parent_id).await? {
        Some(parent) if parent.ecosystem_id == Some(ecosystem_id) => Ok(()),
        Some(_) => Err(MetamodelError::InvalidInput(format!(
            "{} {} belongs to another ecosystem",
            parent_kind, parent_id
        ))),
        None => Err(MetamodelError::InvalidInput(format!(
            "{} {} does not exist",
            parent_kind, parent_id
        ))),
    }
}

/// POST /{entity}
/// Update when `id` is present, find-or-create otherwise
pub async fn upsert_entity<S: Store>(
    kind: EntityKind,
    State(ctx): State<AppState<S>>,
    RequestJson(req): RequestJson<UpsertEntityRequest>,
) -> Result<Json<UpsertResponse>, HandlerError> {
    let store = ctx.store.as_ref();

    if let Some(id) = req.id.filter(|id| *id > 0) {
        let Some(existing) = store.get_by_id(kind, id).await.map_err(error_response)? else {
            return Err(error_response(MetamodelError::NotFound { kind, id }));
        };

        let parent_id = req.parent_field(kind);
        if let (Some(ecosystem_id), Some(Some(parent))) = (existing.ecosystem_id, parent_id) {
            check_parent(store, kind, ecosystem_id, Some(parent))
                .await
                .map_err(error_response)?;
        }

        let patch = EntityPatch {
            name: req.name.clone(),
            parent_id,
            company_name: req.company_name.clone(),
        };
        let record = store.update(kind, id, patch).await.map_err(error_response)?;
        return Ok(Json(UpsertResponse {
            record,
            status: None,
        }));
    }

    let parent_id = req.parent_id(kind);
    let entity = if kind.is_root() {
        NewEntity::ecosystem(req.name.clone(), req.company_name.clone().flatten())
    } else {
        let ecosystem_id = resolve_scope(store, &req).await.map_err(error_response)?;
        check_parent(store, kind, ecosystem_id, parent_id)
            .await
            .map_err(error_response)?;
        let mut entity = NewEntity::scoped(kind, req.name.clone(), ecosystem_id, parent_id);
        entity.description = req.description.clone();
        entity
    };

    let (record, status) = store.find_or_create(entity).await.map_err(error_response)?;
    Ok(Json(UpsertResponse {
        record,
        status: Some(status),
    }))
}

/// GET /ecosystem/{name}
pub async fn get_ecosystem<S: Store>(
    Path(name): Path<String>,
    State(ctx): State<AppState<S>>,
) -> Result<Response, HandlerError> {
    let found = ctx
        .store
        .get_by_name_and_scope(EntityKind::Ecosystem, &name, None)
        .await
        .map_err(error_response)?;
    Ok(found_or_no_content(found))
}

/// GET /{entity}/{ecosystem_id}/{name}
pub async fn get_scoped_entity<S: Store>(
    kind: EntityKind,
    Path((ecosystem_id, name)): Path<(EntityId, String)>,
    State(ctx): State<AppState<S>>,
) -> Result<Response, HandlerError> {
    let found = ctx
        .store
        .get_by_name_and_scope(kind, &name, Some(ecosystem_id))
        .await
        .map_err(error_response)?;
    Ok(found_or_no_content(found))
}

fn found_or_no_content(found: Option<EntityRecord>) -> Response {
    match found {
        Some(record) => Json(record).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// GET /{entity}?ecosystem_id=
pub async fn list_entities<S: Store>(
    kind: EntityKind,
    State(ctx): State<AppState<S>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<EntityRecord>>, HandlerError> {
    let items = ctx
        .store
        .list(kind, query.ecosystem_id)
        .await
        .map_err(error_response)?;
    Ok(Json(ListResponse {
        total: items.len(),
        items,
    }))
}

/// POST /infoblock
pub async fn ingest_info_block<S: Store>(
    State(ctx): State<AppState<S>>,
    RequestJson(req): RequestJson<InfoBlockRequest>,
) -> Result<Response, HandlerError> {
    let chain = ctx
        .ingest
        .ingest_text(&req.text_in)
        .await
        .map_err(error_response)?;
    Ok(chain_or_no_content(chain))
}

/// POST /infoblock/mailbox
/// Ingest the next unseen message from the configured mailbox
pub async fn ingest_mailbox_message<S: Store>(
    State(ctx): State<AppState<S>>,
) -> Result<Response, HandlerError> {
    if !ctx.ingest.has_mailbox() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("Mailbox ingestion is not configured")),
        ));
    }
    let chain = ctx
        .ingest
        .ingest_next_message()
        .await
        .map_err(error_response)?;
    Ok(chain_or_no_content(chain))
}

fn chain_or_no_content(chain: Option<IdentifierChain>) -> Response {
    match chain {
        Some(chain) => Json(chain).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
