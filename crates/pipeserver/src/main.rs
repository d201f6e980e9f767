mod handlers;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use handlers::AppState;
use pipeconnectors::ConnectorSettings;
use piperuntime::{ConnectorRegistry, EngineConfig, MemoryStore, WorkflowEngine};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Load workflow bundles from `PIPELINE_SEED_FILE`, if set
async fn seed_store(store: &MemoryStore) -> anyhow::Result<()> {
    let Ok(path) = std::env::var("PIPELINE_SEED_FILE") else {
        return Ok(());
    };

    let bundles = piperuntime::loader::read_bundles(&path).await?;
    info!("📦 Loading {} workflows from {}", bundles.len(), path);
    for bundle in bundles {
        info!(
            "  {} ({}): {} nodes, {} connections",
            bundle.workflow.name,
            bundle.workflow.id,
            bundle.nodes.len(),
            bundle.connections.len()
        );
        store.load_bundle(bundle).await;
    }
    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚀 Starting Pipeline Server");

    let store = Arc::new(MemoryStore::new());
    seed_store(&store).await?;

    let settings = Arc::new(ConnectorSettings::from_env());
    let mut registry = ConnectorRegistry::new();
    pipeconnectors::register_all(&mut registry, settings.clone());

    let config = EngineConfig::from_env();
    info!(
        "✅ Engine initialized with {} connectors (data dir: {}, node timeout: {:?})",
        registry.len(),
        settings.data_dir.display(),
        config.node_timeout
    );

    let app_state = web::Data::new(AppState {
        engine: WorkflowEngine::new(Arc::new(registry), store, config),
    });

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(handlers::routes)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
