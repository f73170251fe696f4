use axum::{
    body::Bytes,
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Router,
};
use futures::{stream, StreamExt};
use tracing::{info, warn};

use crate::chat::{build_system_prompt, ui_message_stream, ChatRequest, FarmerContext, UiMessage};
use crate::error::{ApiError, ApiResult};
use crate::history::PersistJob;
use crate::llm::{ChatCompletionRequest, ProviderMessage};
use crate::models::{NewChatTurn, DEFAULT_LANGUAGE};
use crate::state::AppState;
use crate::tools;

const UI_STREAM_HEADER: &str = "x-vercel-ai-ui-message-stream";
const TEMPERATURE: f32 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 2000;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/chat", post(chat))
}

async fn chat(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let provider = state
        .provider
        .clone()
        .ok_or(ApiError::MissingCredentials("OPENROUTER_API_KEY"))?;

    let request = ChatRequest::parse(&body).map_err(ApiError::InvalidPayload)?;

    let farmer = match request.farmer_id.as_deref() {
        None => None,
        Some(id) => match state.store.get_farmer(id).await {
            Ok(found) => {
                if found.is_none() {
                    info!(farmer_id = %id, "No profile for farmer; using defaults");
                }
                found
            }
            Err(e) => {
                warn!(farmer_id = %id, error = %e, "Profile lookup failed; using defaults");
                None
            }
        },
    };

    let system_prompt = build_system_prompt(&FarmerContext::from_farmer(farmer.as_ref()));
    let mut messages = vec![ProviderMessage::system(system_prompt)];
    messages.extend(request.messages.iter().map(UiMessage::to_provider));

    let completion = ChatCompletionRequest {
        messages,
        tools: tools::descriptors(),
        temperature: TEMPERATURE,
        max_tokens: MAX_OUTPUT_TOKENS,
    };

    info!(
        farmer_id = request.farmer_id.as_deref().unwrap_or("anonymous"),
        history = request.messages.len(),
        "Forwarding chat to provider"
    );

    let first = provider.stream_chat(completion.clone()).await?;

    let pending_turn = match (request.farmer_id.clone(), request.last_user_text()) {
        (Some(farmer_id), Some(message)) => Some(NewChatTurn {
            farmer_id,
            message,
            response: String::new(),
            language: farmer
                .as_ref()
                .map(|f| f.language_preference.trim())
                .filter(|l| !l.is_empty())
                .unwrap_or(DEFAULT_LANGUAGE)
                .to_string(),
        }),
        _ => None,
    };
    let history = state.history.clone();
    let on_complete = move |response: String| {
        if let Some(mut turn) = pending_turn {
            turn.response = response;
            history.enqueue(PersistJob::ChatTurn(turn));
        }
    };

    let parts = ui_message_stream(provider, completion, first, state.config.chat_max_steps, on_complete);
    let events = parts
        .map(|part| Event::default().json_data(part))
        .chain(stream::once(async { Ok(Event::default().data("[DONE]")) }));

    Ok((
        [(UI_STREAM_HEADER, "v1")],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
        .into_response())
}
