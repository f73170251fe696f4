use axum::{
    extract::{rejection::JsonRejection, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::mock_data::{self, CropPrice, CurrentWeather};
use crate::models::{ChatTurn, CropList, Farmer, PestDetection, SoilRecord};
use crate::routes::auth::optional_text;
use crate::routes::json_body;
use crate::session::{AuthSession, Session};
use crate::state::AppState;

const DASHBOARD_RECENT: usize = 5;
const DASHBOARD_PRICES: usize = 3;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/farmers/me", get(get_profile).put(update_profile))
        .route("/api/dashboard", get(dashboard))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFarmerRequest {
    pub full_name: Option<String>,
    pub location: Option<String>,
    pub farm_size: Option<f64>,
    pub primary_crops: Option<CropList>,
    pub language_preference: Option<String>,
    pub phone_number: Option<String>,
}

impl UpdateFarmerRequest {
    /// Applies the present fields. Blank optional text clears the field.
    pub fn apply(self, farmer: &mut Farmer) -> ApiResult<()> {
        if let Some(name) = self.full_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ApiError::Validation("Full name cannot be empty".to_string()));
            }
            farmer.full_name = name.to_string();
        }
        if let Some(size) = self.farm_size {
            if size < 0.0 || !size.is_finite() {
                return Err(ApiError::Validation("Farm size cannot be negative".to_string()));
            }
            farmer.farm_size = Some(size);
        }
        if self.location.is_some() {
            farmer.location = optional_text(self.location);
        }
        if self.phone_number.is_some() {
            farmer.phone_number = optional_text(self.phone_number);
        }
        if let Some(crops) = self.primary_crops {
            farmer.primary_crops = crops.into_vec();
        }
        if let Some(language) = optional_text(self.language_preference) {
            farmer.language_preference = language.to_lowercase();
        }
        farmer.updated_at = Utc::now();
        Ok(())
    }
}

async fn get_profile(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> ApiResult<Json<Farmer>> {
    state
        .store
        .get_farmer(&session.farmer_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Farmer profile not found".to_string()))
}

async fn update_profile(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    body: Result<Json<UpdateFarmerRequest>, JsonRejection>,
) -> ApiResult<Json<Farmer>> {
    let update = json_body(body)?;
    let mut farmer = state
        .store
        .get_farmer(&session.farmer_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Farmer profile not found".to_string()))?;

    update.apply(&mut farmer)?;
    state.store.upsert_farmer(&farmer).await?;

    info!(farmer_id = %farmer.id, "Updated farmer profile");
    Ok(Json(farmer))
}

/// Loads the signed-in farmer's profile, creating a minimal one if absent.
pub(crate) async fn ensure_farmer(state: &AppState, session: &Session) -> ApiResult<Farmer> {
    if let Some(farmer) = state.store.get_farmer(&session.farmer_id).await? {
        return Ok(farmer);
    }

    let name = session
        .email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or("Farmer");
    let farmer = Farmer::new(session.farmer_id.clone(), name);
    state.store.upsert_farmer(&farmer).await?;

    info!(farmer_id = %farmer.id, "Created missing farmer profile");
    Ok(farmer)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub farmer: Farmer,
    pub weather: CurrentWeather,
    pub market_prices: Vec<CropPrice>,
    pub latest_soil_record: Option<SoilRecord>,
    pub recent_chats: Vec<ChatTurn>,
    pub recent_detections: Vec<PestDetection>,
}

async fn dashboard(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> ApiResult<Json<Dashboard>> {
    let farmer = ensure_farmer(&state, &session).await?;

    let (soil, chats, detections) = tokio::try_join!(
        state.store.list_soil_records(&farmer.id),
        state.store.list_chat_turns(&farmer.id, DASHBOARD_RECENT),
        state.store.list_pest_detections(&farmer.id, DASHBOARD_RECENT),
    )?;

    Ok(Json(Dashboard {
        farmer,
        weather: mock_data::current_weather(),
        market_prices: mock_data::crop_prices().into_iter().take(DASHBOARD_PRICES).collect(),
        latest_soil_record: soil.into_iter().next(),
        recent_chats: chats,
        recent_detections: detections,
    }))
}
