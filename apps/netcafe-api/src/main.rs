use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use netcafe_api::config::{self, Config};
use netcafe_api::db::kv::{KeyValueStore, MemoryStore};
use netcafe_api::realtime::fanout::RealtimeBroadcast;
use netcafe_api::realtime::registry::ConnectionRegistry;
use netcafe_api::routes::ApiDoc;
use netcafe_api::storage::{LocalObjectStore, ObjectStore};
use netcafe_api::AppState;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() {
    config::load_dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let db = netcafe_api::db::pool::connect(&config.database_url).await;

    // Tokens and tickets live in process memory; a restart signs everyone out.
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let storage: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(&config.storage_root));

    tracing::info!(
        storage_root = %config.storage_root,
        stale_session_hours = config.stale_session_hours,
        max_upload_bytes = config.max_upload_bytes,
        "netcafe-api configured"
    );

    let body_limit = config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let state = AppState {
        db,
        kv,
        storage,
        config: Arc::new(config),
        broadcast: Arc::new(RealtimeBroadcast::new()),
        connections: Arc::new(ConnectionRegistry::new()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(netcafe_api::routes::router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "netcafe-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
