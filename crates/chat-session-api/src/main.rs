use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use chat_session_api::config::Settings;
use chat_session_api::handlers::build_router;
use chat_session_api::services::{OpenAiCompatClient, SessionOrchestrator};
use chat_session_api::state::AppState;
use chat_session_api::store::{KeyValueStore, MemoryStore, Namespace, RedisStore};
use chat_session_api::telemetry::init_telemetry;

/// Redis URL value that selects the in-process store (local runs only).
const MEMORY_STORE_URL: &str = "memory://";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    let _log_guard = init_telemetry(&settings.logging);

    info!("🚀 Starting Chat Session API...");
    info!("✅ Configuration loaded (llm={:?})", settings.llm);

    let namespace = Namespace::new(settings.redis.namespace.clone())?;

    let store: Arc<dyn KeyValueStore> = if settings.redis.url == MEMORY_STORE_URL {
        info!("Using in-memory history store; sessions will not survive a restart");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(RedisStore::connect(&settings.redis.url).await?)
    };
    info!("✅ History store ready (namespace={})", namespace);

    let llm = Arc::new(OpenAiCompatClient::new(&settings.llm)?);

    let orchestrator = SessionOrchestrator::new(
        llm,
        store,
        namespace,
        &settings.session,
        settings.llm.default_model.clone(),
    );

    let app = build_router(AppState::new(orchestrator));

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
