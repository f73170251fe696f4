#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use farmwise_gateway::config::Config;
use farmwise_gateway::history::{self, HistoryQueue};
use farmwise_gateway::llm::{
    ChatCompletionRequest, CompletionProvider, LlmError, ProviderEvent, ProviderStream,
    StructuredRequest,
};
use farmwise_gateway::models::{
    Account, ChatTurn, CropAdvisory, Farmer, NewChatTurn, NewPestDetection, NewSoilRecord,
    PestDetection, SoilRecord,
};
use farmwise_gateway::store::{FarmStore, SqliteStore, StoreError, StoreResult};
use farmwise_gateway::{build_router, AppState};

/// Provider that replays fixed output and records what it was sent.
#[derive(Default)]
pub struct FakeProvider {
    pub chat_events: Vec<ProviderEvent>,
    pub structured: Option<Value>,
    pub chat_requests: Mutex<Vec<ChatCompletionRequest>>,
    pub structured_requests: Mutex<Vec<StructuredRequest>>,
}

impl FakeProvider {
    pub fn replying(text: &[&str]) -> Self {
        let mut chat_events: Vec<ProviderEvent> = text
            .iter()
            .map(|t| ProviderEvent::TextDelta(t.to_string()))
            .collect();
        chat_events.push(ProviderEvent::Finish {
            reason: Some("stop".to_string()),
        });
        Self {
            chat_events,
            ..Default::default()
        }
    }

    pub fn diagnosing(analysis: Value) -> Self {
        Self {
            structured: Some(analysis),
            ..Default::default()
        }
    }
}

#[async_trait]
impl CompletionProvider for FakeProvider {
    async fn stream_chat(&self, request: ChatCompletionRequest) -> Result<ProviderStream, LlmError> {
        self.chat_requests.lock().unwrap().push(request);
        let events: Vec<Result<ProviderEvent, LlmError>> =
            self.chat_events.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(events)))
    }

    async fn complete_structured(&self, request: StructuredRequest) -> Result<Value, LlmError> {
        self.structured_requests.lock().unwrap().push(request);
        self.structured
            .clone()
            .ok_or_else(|| LlmError::Provider("no structured reply scripted".to_string()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<SqliteStore>,
}

impl TestApp {
    pub fn new(provider: Option<Arc<FakeProvider>>) -> Self {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let state = test_state(store.clone(), provider);
        Self {
            router: build_router(state.clone()),
            state,
            store,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn json(&self, method: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let response = self.send(builder.body(Body::from(body.to_string())).unwrap()).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let response = self.send(builder.body(Body::empty()).unwrap()).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    /// Registers and signs in a farmer, returning `(token, farmer_id)`.
    pub async fn sign_up(&self, email: &str, name: &str) -> (String, String) {
        let (status, body) = self
            .json(
                "POST",
                "/api/auth/register",
                None,
                serde_json::json!({
                    "fullName": name,
                    "email": email,
                    "password": "harvest24",
                    "confirmPassword": "harvest24",
                    "location": "Karnal, Haryana",
                    "farmSize": 8,
                    "primaryCrops": "wheat, rice",
                    "languagePreference": "hindi"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let farmer_id = body["farmer"]["id"].as_str().unwrap().to_string();

        let (status, body) = self
            .json(
                "POST",
                "/api/auth/login",
                None,
                serde_json::json!({ "email": email, "password": "harvest24" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        (body["token"].as_str().unwrap().to_string(), farmer_id)
    }
}

/// State over any store, with the history worker running against it.
pub fn test_state(store: Arc<dyn FarmStore>, provider: Option<Arc<FakeProvider>>) -> AppState {
    let (queue, rx) = HistoryQueue::new(16);
    history::spawn_worker(store.clone(), rx);

    let provider = provider.map(|p| p as Arc<dyn CompletionProvider>);
    let config = Config {
        bcrypt_cost: 4,
        ..Config::default()
    };
    AppState::new(config, store, provider, queue)
}

/// Store whose every call fails as if the backend were down.
#[derive(Default)]
pub struct FailingStore {
    pub farmer_lookups: AtomicUsize,
    pub chat_turn_writes: AtomicUsize,
}

impl FailingStore {
    fn down<T>() -> StoreResult<T> {
        Err(StoreError::Backend {
            status: 503,
            body: "upstream unavailable".to_string(),
        })
    }

    pub fn lookups(&self) -> usize {
        self.farmer_lookups.load(Ordering::SeqCst)
    }

    pub fn chat_writes(&self) -> usize {
        self.chat_turn_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FarmStore for FailingStore {
    async fn get_farmer(&self, _id: &str) -> StoreResult<Option<Farmer>> {
        self.farmer_lookups.fetch_add(1, Ordering::SeqCst);
        Self::down()
    }

    async fn upsert_farmer(&self, _farmer: &Farmer) -> StoreResult<()> {
        Self::down()
    }

    async fn create_account(&self, _account: &Account) -> StoreResult<()> {
        Self::down()
    }

    async fn find_account(&self, _email: &str) -> StoreResult<Option<Account>> {
        Self::down()
    }

    async fn insert_chat_turn(&self, _turn: &NewChatTurn) -> StoreResult<ChatTurn> {
        self.chat_turn_writes.fetch_add(1, Ordering::SeqCst);
        Self::down()
    }

    async fn list_chat_turns(&self, _farmer_id: &str, _limit: usize) -> StoreResult<Vec<ChatTurn>> {
        Self::down()
    }

    async fn insert_soil_record(&self, _record: &NewSoilRecord) -> StoreResult<SoilRecord> {
        Self::down()
    }

    async fn list_soil_records(&self, _farmer_id: &str) -> StoreResult<Vec<SoilRecord>> {
        Self::down()
    }

    async fn insert_pest_detection(&self, _detection: &NewPestDetection) -> StoreResult<PestDetection> {
        Self::down()
    }

    async fn list_pest_detections(&self, _farmer_id: &str, _limit: usize) -> StoreResult<Vec<PestDetection>> {
        Self::down()
    }

    async fn list_crop_advisories(&self, _farmer_id: &str) -> StoreResult<Vec<CropAdvisory>> {
        Self::down()
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let text = body_text(response).await;
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

/// Polls until `check` succeeds; the persistence worker runs concurrently.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
