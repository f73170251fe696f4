use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::history::PersistJob;
use crate::pest::{self, PestAnalysis};
use crate::session::AuthSession;
use crate::state::AppState;

const NO_IMAGE: &str = "No image provided";
const ANALYSIS_FAILED: &str = "Failed to analyze image";

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new().route(
        "/api/pest-detection",
        post(detect).layer(DefaultBodyLimit::max(max_upload_bytes)),
    )
}

#[derive(Debug, Default)]
struct Upload {
    image: Option<(Vec<u8>, Option<String>)>,
    crop_type: String,
    symptoms: String,
}

async fn read_upload(mut multipart: Multipart) -> ApiResult<Upload> {
    let mut upload = Upload::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e.body_text())))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let read_err = |e: axum::extract::multipart::MultipartError| {
            ApiError::BadRequest(format!("Invalid upload field '{}': {}", name, e.body_text()))
        };
        match name.as_str() {
            "image" => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(read_err)?;
                upload.image = Some((bytes.to_vec(), content_type));
            }
            "cropType" => upload.crop_type = field.text().await.map_err(read_err)?.trim().to_string(),
            "symptoms" => upload.symptoms = field.text().await.map_err(read_err)?.trim().to_string(),
            _ => {}
        }
    }
    Ok(upload)
}

async fn detect(
    State(state): State<AppState>,
    session: Option<AuthSession>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    let upload = match multipart {
        Ok(multipart) => read_upload(multipart).await?,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Pest detection request is not multipart");
            Upload::default()
        }
    };

    let Some((image, content_type)) = upload.image.filter(|(bytes, _)| !bytes.is_empty()) else {
        return Err(ApiError::BadRequest(NO_IMAGE.to_string()));
    };

    let provider = state
        .provider
        .clone()
        .ok_or(ApiError::MissingCredentials("OPENROUTER_API_KEY"))?;

    info!(
        crop_type = %upload.crop_type,
        image_bytes = image.len(),
        "Requesting pest analysis"
    );

    let request = pest::analysis_request(&upload.crop_type, &upload.symptoms, &image, content_type.as_deref());
    let analysis = provider
        .complete_structured(request)
        .await
        .map_err(|e| e.to_string())
        .and_then(PestAnalysis::from_value)
        .map_err(|e| ApiError::upstream(ANALYSIS_FAILED, e))?;

    info!(
        pest = %analysis.pest_identified,
        confidence = analysis.confidence,
        "Pest analysis complete"
    );

    // Only a signed-in farmer's detections are recorded; form fields never pick the owner.
    if let Some(AuthSession(session)) = session {
        state.history.enqueue(PersistJob::PestDetection(
            analysis.to_detection(&session.farmer_id, &upload.crop_type),
        ));
    }

    Ok(Json(json!({ "success": true, "analysis": analysis })))
}
