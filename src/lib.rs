//! FarmWise gateway: farmer advisory HTTP API.

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod chat;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod mock_data;
pub mod models;
pub mod pest;
pub mod routes;
pub mod session;
pub mod soil;
pub mod state;
pub mod store;
pub mod tools;

pub use state::AppState;

/// Full application router with tracing and permissive CORS.
pub fn build_router(state: AppState) -> Router {
    routes::create_router(state.config.max_upload_bytes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
