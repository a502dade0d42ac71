pub mod api;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{MetamodelError, Result};

// Export logic types
pub use logic::{HierarchyLevel, HierarchyRequest, HierarchyResolver, IngestOptions, IngestionWorkflow};

// Export all model types
pub use model::*;

// Export store types
pub use store::{EntityStore, MemoryStore, PostgresStore, Store};

use std::sync::Arc;

use crate::api::handlers::AppContext;
use crate::config::{AppConfig, ClassifierMode, StoreBackend};
use crate::interpreter::{Classifier, HttpClassifier, ImapMailbox, KeywordClassifier};

/// Pick the classifier named by the configuration
pub fn build_classifier(config: &AppConfig) -> anyhow::Result<Arc<dyn Classifier>> {
    match config.classifier.mode {
        ClassifierMode::Keyword => Ok(Arc::new(KeywordClassifier::default())),
        ClassifierMode::Http => {
            let endpoint = config
                .classifier
                .endpoint
                .clone()
                .ok_or_else(|| anyhow::anyhow!("classifier.endpoint is required in http mode"))?;
            Ok(Arc::new(HttpClassifier::new(
                endpoint,
                config.classifier.timeout(),
            )?))
        }
    }
}

/// Wire store, classifier and (optionally) mailbox into the shared handler state
pub fn build_context<S: Store + 'static>(
    store: Arc<S>,
    config: &AppConfig,
) -> anyhow::Result<Arc<AppContext<S>>> {
    let options = IngestOptions {
        classify_timeout: config.classifier.timeout(),
        chain_problem_statement: config.ingest.chain_problem_statement,
    };
    let mut ingest = IngestionWorkflow::new(store.clone(), build_classifier(config)?, options);
    if config.mailbox.enabled {
        ingest = ingest.with_mailbox(Arc::new(ImapMailbox), config.mailbox.clone());
    }
    Ok(Arc::new(AppContext { store, ingest }))
}

/// Router with state attached, plus the admin frontend when configured
pub fn build_app<S: Store + 'static>(context: Arc<AppContext<S>>, config: &AppConfig) -> axum::Router {
    let mut router = crate::api::routes::create_router::<S>();
    if let Some(dir) = &config.frontend.static_dir {
        router = router.nest_service("/admin", tower_http::services::ServeDir::new(dir));
    }
    router.with_state(context)
}

async fn serve<S: Store + 'static>(store: Arc<S>, config: &AppConfig) -> anyhow::Result<()> {
    let app = build_app(build_context(store, config)?, config);

    let bind_address = config.server_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    log::info!("metamodel server running on http://{}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Connect the configured backend and serve until shutdown
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    match config.database.backend {
        StoreBackend::Postgres => {
            log::info!("Connecting to PostgreSQL...");
            let postgres_store = PostgresStore::new(
                &config.database_url(),
                config.database.max_connections.unwrap_or(20),
            )
            .await?;

            log::info!("Running database migrations...");
            postgres_store.migrate().await?;

            serve(Arc::new(postgres_store), &config).await
        }
        StoreBackend::Memory => {
            log::warn!("Using in-memory store, data is lost on shutdown");
            serve(Arc::new(MemoryStore::new()), &config).await
        }
    }
}
