use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::models::{default_language, Account, CropList, Farmer};
use crate::routes::json_body;
use crate::session::{self, AuthSession, Session};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(current_session))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub farm_size: Option<f64>,
    #[serde(default)]
    pub primary_crops: Option<CropList>,
    #[serde(default)]
    pub language_preference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    expires_at: chrono::DateTime<Utc>,
    farmer: Option<Farmer>,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn validate_registration(req: &RegisterRequest) -> ApiResult<()> {
    if req.full_name.trim().is_empty() {
        return Err(ApiError::Validation("Full name is required".to_string()));
    }
    if !req.email.contains('@') {
        return Err(ApiError::Validation("A valid email address is required".to_string()));
    }
    if req.password != req.confirm_password {
        return Err(ApiError::Validation("Passwords do not match".to_string()));
    }
    if req.password.chars().count() < 6 {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters long".to_string(),
        ));
    }
    if req.farm_size.is_some_and(|size| size < 0.0 || !size.is_finite()) {
        return Err(ApiError::Validation("Farm size cannot be negative".to_string()));
    }
    Ok(())
}

async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = json_body(body)?;
    validate_registration(&req)?;

    let email = normalize_email(&req.email);
    let password = req.password.clone();
    let cost = state.config.bcrypt_cost;
    let password_hash = tokio::task::spawn_blocking(move || session::hash_password(&password, cost))
        .await
        .map_err(|e| ApiError::Internal(format!("hashing task failed: {}", e)))??;

    let mut farmer = Farmer::new(uuid::Uuid::new_v4().to_string(), req.full_name.trim());
    farmer.location = optional_text(req.location);
    farmer.farm_size = req.farm_size;
    farmer.primary_crops = req.primary_crops.map(CropList::into_vec).unwrap_or_default();
    farmer.language_preference = optional_text(req.language_preference)
        .map(|l| l.to_lowercase())
        .unwrap_or_else(default_language);
    farmer.phone_number = optional_text(req.phone_number);

    let account = Account {
        email: email.clone(),
        password_hash,
        farmer_id: farmer.id.clone(),
        created_at: Utc::now(),
    };

    state.store.create_account(&account).await.map_err(|e| match e {
        crate::store::StoreError::Conflict(_) => {
            ApiError::Conflict("An account with this email already exists".to_string())
        }
        other => ApiError::Store(other),
    })?;
    state.store.upsert_farmer(&farmer).await?;

    info!(farmer_id = %farmer.id, email = %email, "Registered farmer");

    Ok((StatusCode::CREATED, Json(json!({ "farmer": farmer }))).into_response())
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let req = json_body(body)?;
    let email = normalize_email(&req.email);
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let Some(account) = state.store.find_account(&email).await? else {
        warn!(email = %email, "Login for unknown account");
        return Err(invalid());
    };

    let password = req.password;
    let hash = account.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || session::verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("verification task failed: {}", e)))?;
    if !verified {
        warn!(email = %email, "Login with wrong password");
        return Err(invalid());
    }

    let session = state.sessions.create(&account.farmer_id, &email).await;
    let farmer = state.store.get_farmer(&account.farmer_id).await?;

    info!(farmer_id = %account.farmer_id, "Farmer signed in");

    let cookie = session::session_cookie(&session.token, state.config.session_ttl);
    let body = LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        farmer,
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session::token_from_headers(&headers) {
        if state.sessions.revoke(&token).await {
            info!("Session revoked");
        }
    }
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, session::cleared_cookie())],
    )
        .into_response()
}

async fn current_session(AuthSession(session): AuthSession) -> Json<Session> {
    Json(session)
}
