use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/health", get(health_check))
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "FarmWise gateway operational")
}
