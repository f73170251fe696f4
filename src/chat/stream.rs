use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::llm::{
    AssistantToolCall, ChatCompletionRequest, CompletionProvider, FunctionCall, ProviderEvent,
    ProviderMessage, ProviderStream,
};
use crate::tools::{tool_error, ToolCall};

/// One part of the UI message stream sent to the browser.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiStreamPart {
    #[serde(rename_all = "camelCase")]
    Start { message_id: String },
    StartStep,
    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable { tool_call_id: String, output: Value },
    FinishStep,
    #[serde(rename_all = "camelCase")]
    Error { error_text: String },
    Finish,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Translates provider output into UI stream parts, executing tool calls
/// as they complete.
///
/// `first` is the already-opened stream for step one. When the model calls
/// tools and `max_steps` allows, the results are sent back for another
/// step. `on_complete` receives the full response text and runs only if
/// every step finished without error.
pub fn ui_message_stream<F>(
    provider: Arc<dyn CompletionProvider>,
    request: ChatCompletionRequest,
    first: ProviderStream,
    max_steps: usize,
    on_complete: F,
) -> impl Stream<Item = UiStreamPart> + Send
where
    F: FnOnce(String) + Send + 'static,
{
    async_stream::stream! {
        let message_id = format!("msg-{}", uuid::Uuid::new_v4());
        yield UiStreamPart::Start { message_id };

        let mut request = request;
        let mut current = first;
        let mut full_text = String::new();
        let mut step = 0usize;

        loop {
            step += 1;
            yield UiStreamPart::StartStep;

            let text_id = format!("text-{}", step);
            let mut text_open = false;
            let mut step_text = String::new();
            let mut pending: BTreeMap<usize, PendingToolCall> = BTreeMap::new();
            let mut failure = None;

            while let Some(item) = current.next().await {
                match item {
                    Ok(ProviderEvent::TextDelta(delta)) => {
                        if !text_open {
                            text_open = true;
                            yield UiStreamPart::TextStart { id: text_id.clone() };
                        }
                        step_text.push_str(&delta);
                        yield UiStreamPart::TextDelta { id: text_id.clone(), delta };
                    }
                    Ok(ProviderEvent::ToolCallDelta { index, id, name, arguments }) => {
                        let call = pending.entry(index).or_default();
                        if id.is_some() {
                            call.id = id;
                        }
                        if let Some(name) = name {
                            call.name.push_str(&name);
                        }
                        call.arguments.push_str(&arguments);
                    }
                    Ok(ProviderEvent::Finish { reason }) => {
                        debug!(step = step, reason = ?reason, "Provider step finished");
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            if text_open {
                yield UiStreamPart::TextEnd { id: text_id.clone() };
            }

            if let Some(e) = failure {
                warn!(step = step, error = %e, "Provider stream failed mid-response");
                yield UiStreamPart::Error {
                    error_text: "The advisory service was interrupted. Please try again.".to_string(),
                };
                return;
            }

            let mut assistant_calls = Vec::new();
            let mut tool_messages = Vec::new();
            for (_, call) in pending {
                let tool_call_id = call
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                let input = serde_json::from_str::<Value>(&call.arguments)
                    .unwrap_or_else(|_| Value::String(call.arguments.clone()));

                yield UiStreamPart::ToolInputAvailable {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: call.name.clone(),
                    input,
                };

                let output = match ToolCall::parse(&call.name, &call.arguments) {
                    Ok(tool) => {
                        info!(tool = tool.name(), "Executing tool call");
                        tool.execute()
                    }
                    Err(message) => {
                        warn!(tool = %call.name, error = %message, "Rejected tool call");
                        tool_error(&message)
                    }
                };

                tool_messages.push(ProviderMessage::Tool {
                    tool_call_id: tool_call_id.clone(),
                    content: output.to_string(),
                });
                assistant_calls.push(AssistantToolCall {
                    id: tool_call_id.clone(),
                    kind: "function".to_string(),
                    function: FunctionCall {
                        name: call.name,
                        arguments: call.arguments,
                    },
                });

                yield UiStreamPart::ToolOutputAvailable { tool_call_id, output };
            }

            yield UiStreamPart::FinishStep;
            full_text.push_str(&step_text);

            if assistant_calls.is_empty() || step >= max_steps {
                break;
            }

            request.messages.push(ProviderMessage::Assistant {
                content: (!step_text.is_empty()).then_some(step_text),
                tool_calls: assistant_calls,
            });
            request.messages.extend(tool_messages);

            match provider.stream_chat(request.clone()).await {
                Ok(next) => current = next,
                Err(e) => {
                    warn!(step = step + 1, error = %e, "Failed to start follow-up step");
                    yield UiStreamPart::Error {
                        error_text: "The advisory service was interrupted. Please try again.".to_string(),
                    };
                    return;
                }
            }
        }

        on_complete(full_text);
        yield UiStreamPart::Finish;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, StructuredRequest};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays one scripted event list per call to `stream_chat`.
    struct Scripted {
        steps: Mutex<Vec<Vec<Result<ProviderEvent, LlmError>>>>,
        requests: Mutex<Vec<ChatCompletionRequest>>,
    }

    impl Scripted {
        fn new(mut steps: Vec<Vec<Result<ProviderEvent, LlmError>>>) -> Self {
            steps.reverse();
            Self {
                steps: Mutex::new(steps),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for Scripted {
        async fn stream_chat(&self, request: ChatCompletionRequest) -> Result<ProviderStream, LlmError> {
            self.requests.lock().unwrap().push(request);
            let events = self.steps.lock().unwrap().pop().unwrap_or_default();
            Ok(Box::pin(futures::stream::iter(events)))
        }

        async fn complete_structured(&self, _request: StructuredRequest) -> Result<Value, LlmError> {
            Err(LlmError::Decode("not scripted".to_string()))
        }
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            messages: vec![ProviderMessage::system("sys"), ProviderMessage::user("hi")],
            tools: crate::tools::descriptors(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }

    async fn run(
        provider: Arc<Scripted>,
        max_steps: usize,
    ) -> (Vec<UiStreamPart>, Option<String>) {
        let first = provider.stream_chat(request()).await.unwrap();
        let completed = Arc::new(Mutex::new(None));
        let sink = completed.clone();
        let parts = ui_message_stream(provider, request(), first, max_steps, move |text| {
            *sink.lock().unwrap() = Some(text);
        })
        .collect::<Vec<_>>()
        .await;
        let text = completed.lock().unwrap().take();
        (parts, text)
    }

    fn text(delta: &str) -> Result<ProviderEvent, LlmError> {
        Ok(ProviderEvent::TextDelta(delta.to_string()))
    }

    #[tokio::test]
    async fn test_text_only_stream() {
        let provider = Arc::new(Scripted::new(vec![vec![
            text("Water "),
            text("early."),
            Ok(ProviderEvent::Finish { reason: Some("stop".to_string()) }),
        ]]));
        let (parts, completed) = run(provider, 1).await;

        assert!(matches!(parts[0], UiStreamPart::Start { .. }));
        assert_eq!(
            parts[1..].to_vec(),
            vec![
                UiStreamPart::StartStep,
                UiStreamPart::TextStart { id: "text-1".to_string() },
                UiStreamPart::TextDelta { id: "text-1".to_string(), delta: "Water ".to_string() },
                UiStreamPart::TextDelta { id: "text-1".to_string(), delta: "early.".to_string() },
                UiStreamPart::TextEnd { id: "text-1".to_string() },
                UiStreamPart::FinishStep,
                UiStreamPart::Finish,
            ]
        );
        assert_eq!(completed.as_deref(), Some("Water early."));
    }

    #[tokio::test]
    async fn test_tool_call_assembled_from_deltas() {
        let provider = Arc::new(Scripted::new(vec![vec![
            Ok(ProviderEvent::ToolCallDelta {
                index: 0,
                id: Some("call_a".to_string()),
                name: Some("getPestControl".to_string()),
                arguments: "{\"pestDescription\":\"aphids\",".to_string(),
            }),
            Ok(ProviderEvent::ToolCallDelta {
                index: 0,
                id: None,
                name: None,
                arguments: "\"cropType\":\"mustard\",\"severity\":\"high\"}".to_string(),
            }),
            Ok(ProviderEvent::Finish { reason: Some("tool_calls".to_string()) }),
        ]]));
        let (parts, completed) = run(provider.clone(), 1).await;

        let output = parts
            .iter()
            .find_map(|p| match p {
                UiStreamPart::ToolOutputAvailable { tool_call_id, output } => {
                    assert_eq!(tool_call_id, "call_a");
                    Some(output.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(output["urgency"], "Immediate action required");
        assert!(parts.contains(&UiStreamPart::ToolInputAvailable {
            tool_call_id: "call_a".to_string(),
            tool_name: "getPestControl".to_string(),
            input: serde_json::json!({"pestDescription":"aphids","cropType":"mustard","severity":"high"}),
        }));
        assert_eq!(parts.last(), Some(&UiStreamPart::Finish));
        assert_eq!(completed.as_deref(), Some(""));
        // Single step: no follow-up request.
        assert_eq!(provider.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error_output() {
        let provider = Arc::new(Scripted::new(vec![vec![Ok(ProviderEvent::ToolCallDelta {
            index: 0,
            id: Some("call_x".to_string()),
            name: Some("getWeather".to_string()),
            arguments: "{}".to_string(),
        })]]));
        let (parts, completed) = run(provider, 1).await;
        let output = parts.iter().find_map(|p| match p {
            UiStreamPart::ToolOutputAvailable { output, .. } => Some(output.clone()),
            _ => None,
        });
        assert!(output.unwrap()["error"].as_str().unwrap().contains("unknown tool"));
        assert!(completed.is_some());
    }

    #[tokio::test]
    async fn test_follow_up_step_receives_tool_results() {
        let provider = Arc::new(Scripted::new(vec![
            vec![Ok(ProviderEvent::ToolCallDelta {
                index: 0,
                id: Some("call_s".to_string()),
                name: Some("getSoilHealth".to_string()),
                arguments: r#"{"soilType":"loam","cropType":"maize","symptoms":"crusting"}"#.to_string(),
            })],
            vec![text("Add compost.")],
        ]));
        let (parts, completed) = run(provider.clone(), 3).await;

        assert_eq!(parts.iter().filter(|p| **p == UiStreamPart::StartStep).count(), 2);
        assert!(parts.contains(&UiStreamPart::TextStart { id: "text-2".to_string() }));
        assert_eq!(completed.as_deref(), Some("Add compost."));

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let follow_up = &requests[1].messages;
        assert!(matches!(
            follow_up.last(),
            Some(ProviderMessage::Tool { tool_call_id, .. }) if tool_call_id == "call_s"
        ));
    }

    #[tokio::test]
    async fn test_mid_stream_error_skips_completion() {
        let provider = Arc::new(Scripted::new(vec![vec![
            text("Partial"),
            Err(LlmError::Provider("upstream reset".to_string())),
        ]]));
        let (parts, completed) = run(provider, 1).await;
        assert!(matches!(parts.last(), Some(UiStreamPart::Error { .. })));
        assert!(parts.contains(&UiStreamPart::TextEnd { id: "text-1".to_string() }));
        assert_eq!(completed, None);
    }

    #[test]
    fn test_part_serialization() {
        let part = UiStreamPart::ToolOutputAvailable {
            tool_call_id: "c1".to_string(),
            output: serde_json::json!({"ok": true}),
        };
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            serde_json::json!({"type": "tool-output-available", "toolCallId": "c1", "output": {"ok": true}})
        );
        assert_eq!(
            serde_json::to_string(&UiStreamPart::StartStep).unwrap(),
            r#"{"type":"start-step"}"#
        );
    }
}
