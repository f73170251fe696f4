use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::sse::SseDecoder;
use super::{
    ChatCompletionRequest, CompletionProvider, LlmError, ProviderEvent, ProviderStream,
    StructuredRequest,
};

const REFERER: &str = "farmwise-gateway";

/// Chat-completions client for OpenRouter or any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenRouterProvider {
    http_client: reqwest::Client,
    url: String,
    api_key: String,
    chat_model: String,
    vision_model: String,
}

impl OpenRouterProvider {
    pub fn new(
        http_client: reqwest::Client,
        url: impl Into<String>,
        api_key: impl Into<String>,
        chat_model: impl Into<String>,
        vision_model: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            url: url.into(),
            api_key: api_key.into(),
            chat_model: chat_model.into(),
            vision_model: vision_model.into(),
        }
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .http_client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", REFERER)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterProvider {
    async fn stream_chat(&self, request: ChatCompletionRequest) -> Result<ProviderStream, LlmError> {
        let mut payload = json!({
            "model": self.chat_model,
            "messages": request.messages,
            "stream": true,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if !request.tools.is_empty() {
            payload["tools"] = Value::Array(request.tools);
        }

        info!(
            model = %self.chat_model,
            messages = payload["messages"].as_array().map(|m| m.len()).unwrap_or(0),
            "Starting streaming completion"
        );

        let response = self.post(&payload).await?;
        let mut body = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            'outer: loop {
                let payloads = match body.next().await {
                    Some(Ok(chunk)) => decoder.push(&chunk),
                    Some(Err(e)) => {
                        yield Err(LlmError::Http(e));
                        break;
                    }
                    None => {
                        let tail = decoder.finish().into_iter().collect::<Vec<_>>();
                        for data in tail {
                            if data == "[DONE]" {
                                break;
                            }
                            match parse_stream_payload(&data) {
                                Ok(events) => {
                                    for event in events {
                                        yield Ok(event);
                                    }
                                }
                                Err(e) => yield Err(e),
                            }
                        }
                        break;
                    }
                };

                for data in payloads {
                    if data == "[DONE]" {
                        debug!("Provider stream finished");
                        break 'outer;
                    }
                    match parse_stream_payload(&data) {
                        Ok(events) => {
                            for event in events {
                                yield Ok(event);
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            break 'outer;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn complete_structured(&self, request: StructuredRequest) -> Result<Value, LlmError> {
        let payload = json!({
            "model": self.vision_model,
            "messages": request.messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "strict": true,
                    "schema": request.schema,
                }
            },
            "temperature": request.temperature,
        });

        info!(model = %self.vision_model, schema = %request.schema_name, "Requesting structured completion");

        let response = self.post(&payload).await?;
        let api_response: Value = response.json().await?;

        if let Some(message) = provider_error(&api_response) {
            return Err(LlmError::Provider(message));
        }

        let content = api_response
            .get("choices")
            .and_then(|choices| choices.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| LlmError::Decode("response has no message content".to_string()))?;

        parse_json_content(content)
    }
}

/// Parses one `data:` payload of a streaming completion into events.
pub fn parse_stream_payload(data: &str) -> Result<Vec<ProviderEvent>, LlmError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| LlmError::Decode(format!("invalid stream chunk: {}", e)))?;

    if let Some(message) = provider_error(&value) {
        return Err(LlmError::Provider(message));
    }

    let mut events = Vec::new();
    let choice = match value
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
    {
        Some(choice) => choice,
        // Usage-only chunks carry no choices.
        None => return Ok(events),
    };

    if let Some(delta) = choice.get("delta") {
        if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
            if !text.is_empty() {
                events.push(ProviderEvent::TextDelta(text.to_string()));
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(|c| c.as_array()) {
            for (position, call) in calls.iter().enumerate() {
                let index = call
                    .get("index")
                    .and_then(|i| i.as_u64())
                    .map(|i| i as usize)
                    .unwrap_or(position);
                let function = call.get("function");
                events.push(ProviderEvent::ToolCallDelta {
                    index,
                    id: call.get("id").and_then(|v| v.as_str()).map(str::to_string),
                    name: function
                        .and_then(|f| f.get("name"))
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    arguments: function
                        .and_then(|f| f.get("arguments"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                });
            }
        }
    }

    if let Some(reason) = choice.get("finish_reason").filter(|r| !r.is_null()) {
        events.push(ProviderEvent::Finish {
            reason: reason.as_str().map(str::to_string),
        });
    }

    Ok(events)
}

fn provider_error(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if error.is_null() {
        return None;
    }
    Some(
        error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

/// Parses model output as JSON, falling back to a fenced ```json block.
pub fn parse_json_content(content: &str) -> Result<Value, LlmError> {
    let trimmed = content.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let fenced = trimmed
        .split("```json")
        .nth(1)
        .and_then(|rest| rest.split("```").next())
        .map(str::trim);

    match fenced {
        Some(block) => serde_json::from_str(block).map_err(|e| {
            warn!(error = %e, "Fenced JSON block did not parse");
            LlmError::Decode(format!("invalid JSON in fenced block: {}", e))
        }),
        None => Err(LlmError::Decode("model output is not JSON".to_string())),
    }
}
