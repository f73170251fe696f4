use axum::{extract::rejection::JsonRejection, Json, Router};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub mod auth;
pub mod chat;
pub mod farmer;
pub mod health;
pub mod mock;
pub mod pest;
pub mod records;

pub fn create_router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(chat::router())
        .merge(pest::router(max_upload_bytes))
        .merge(mock::router())
        .merge(farmer::router())
        .merge(records::router())
}

/// Unwraps a JSON body, turning axum's rejection into a `{error}` 400.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, 200)
    }
}
