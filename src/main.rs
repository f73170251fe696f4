use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use farmwise_gateway::config::{self, Config};
use farmwise_gateway::history::{self, HistoryQueue};
use farmwise_gateway::llm::{CompletionProvider, OpenRouterProvider};
use farmwise_gateway::store::{FarmStore, SqliteStore, SupabaseStore};
use farmwise_gateway::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG may come from .env.
    let dotenv = config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farmwise_gateway=info,tower_http=info,axum=info".into()),
        )
        .init();

    dotenv.log();
    let config = Config::from_env();

    let http_client = reqwest::Client::builder()
        .timeout(config.llm_timeout)
        .build()
        .context("failed to create HTTP client")?;

    let store: Arc<dyn FarmStore> = match &config.supabase {
        Some(supabase) => {
            info!(url = %supabase.url, "Using Supabase store");
            Arc::new(SupabaseStore::new(supabase, http_client.clone()))
        }
        None => {
            info!(path = %config.db_path.display(), "Using SQLite store");
            Arc::new(
                SqliteStore::open(&config.db_path)
                    .with_context(|| format!("failed to open {}", config.db_path.display()))?,
            )
        }
    };

    let provider: Option<Arc<dyn CompletionProvider>> = config.openrouter_api_key.as_ref().map(|key| {
        Arc::new(OpenRouterProvider::new(
            http_client.clone(),
            config.openrouter_url.clone(),
            key.clone(),
            config.chat_model.clone(),
            config.vision_model.clone(),
        )) as Arc<dyn CompletionProvider>
    });

    let (queue, rx) = HistoryQueue::new(config.history_queue_capacity);
    let worker = history::spawn_worker(store.clone(), rx);

    let port = config.port;
    let state = AppState::new(config, store, provider, queue);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, port = port, "Starting FarmWise gateway");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and its queue handle) is gone; let pending writes finish.
    worker.await.ok();
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
