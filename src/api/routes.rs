use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json as RequestJson, Router,
};

use crate::api::handlers::{self, AppState, ListQuery, UpsertEntityRequest};
use crate::model::{EntityId, EntityKind};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    let mut router = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Ingestion workflow
        .route("/infoblock", post(handlers::ingest_info_block::<S>))
        .route(
            "/infoblock/mailbox",
            post(handlers::ingest_mailbox_message::<S>),
        )
        // Ecosystems are looked up by name alone
        .route("/ecosystem/:name", get(handlers::get_ecosystem::<S>));

    // Every entity kind shares one create/update/list surface
    for kind in EntityKind::ALL {
        let base = format!("/{}", kind.table());
        router = router.route(
            &base,
            post(
                move |state: State<AppState<S>>, body: RequestJson<UpsertEntityRequest>| {
                    handlers::upsert_entity(kind, state, body)
                },
            )
            .get(move |state: State<AppState<S>>, query: Query<ListQuery>| {
                handlers::list_entities(kind, state, query)
            }),
        );

        if !kind.is_root() {
            router = router.route(
                &format!("{}/:ecosystem_id/:name", base),
                get(
                    move |path: Path<(EntityId, String)>, state: State<AppState<S>>| {
                        handlers::get_scoped_entity(kind, path, state)
                    },
                ),
            );
        }
    }

    router
}
