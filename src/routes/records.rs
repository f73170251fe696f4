use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::error::ApiResult;
use crate::mock_data::{self, SeasonalAdvisory};
use crate::models::{ChatTurn, CropAdvisory, PestDetection, SoilRecord};
use crate::routes::{json_body, LimitQuery};
use crate::session::AuthSession;
use crate::soil::SoilRecordInput;
use crate::state::AppState;

const DEFAULT_DETECTIONS: usize = 20;
const DEFAULT_CHAT_HISTORY: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/soil-records", get(list_soil_records).post(create_soil_record))
        .route("/api/pest-detections", get(list_pest_detections))
        .route("/api/chat/history", get(chat_history))
        .route("/api/crop-advisories", get(crop_advisories))
}

async fn list_soil_records(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> ApiResult<Json<Vec<SoilRecord>>> {
    Ok(Json(state.store.list_soil_records(&session.farmer_id).await?))
}

async fn create_soil_record(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    body: Result<Json<SoilRecordInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SoilRecord>)> {
    let record = json_body(body)?.into_record(&session.farmer_id)?;
    let saved = state.store.insert_soil_record(&record).await?;
    info!(farmer_id = %session.farmer_id, record_id = %saved.id, "Saved soil test");
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn list_pest_detections(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<PestDetection>>> {
    let detections = state
        .store
        .list_pest_detections(&session.farmer_id, query.or(DEFAULT_DETECTIONS))
        .await?;
    Ok(Json(detections))
}

async fn chat_history(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<ChatTurn>>> {
    let turns = state
        .store
        .list_chat_turns(&session.farmer_id, query.or(DEFAULT_CHAT_HISTORY))
        .await?;
    Ok(Json(turns))
}

#[derive(Debug, Serialize)]
struct AdvisoryFeed {
    advisories: Vec<CropAdvisory>,
    seasonal: Vec<SeasonalAdvisory>,
}

async fn crop_advisories(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> ApiResult<Json<AdvisoryFeed>> {
    let advisories = state.store.list_crop_advisories(&session.farmer_id).await?;
    Ok(Json(AdvisoryFeed {
        advisories,
        seasonal: mock_data::seasonal_advisories(),
    }))
}
