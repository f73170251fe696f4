use serde::Deserialize;
use serde_json::Value;

use crate::llm::ProviderMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A chat message as sent by the browser client.
///
/// Older clients send `content`; UI-message clients send `parts`, of which
/// only the text parts are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct UiMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub parts: Option<Vec<Value>>,
}

impl UiMessage {
    pub fn text(&self) -> String {
        if let Some(content) = &self.content {
            return content.clone();
        }
        self.parts
            .iter()
            .flatten()
            .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn to_provider(&self) -> ProviderMessage {
        let text = self.text();
        match self.role {
            Role::User => ProviderMessage::user(text),
            Role::Assistant => ProviderMessage::assistant(text),
            Role::System => ProviderMessage::system(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<UiMessage>,
    pub farmer_id: Option<String>,
}

impl ChatRequest {
    /// Parses the raw body, reporting what was wrong with it.
    pub fn parse(body: &[u8]) -> Result<Self, String> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| format!("Request body is not valid JSON: {}", e))?;

        let raw_messages = match value.get("messages") {
            None | Some(Value::Null) => return Err("Request body is missing `messages`".to_string()),
            Some(Value::Array(items)) => items,
            Some(_) => return Err("`messages` must be a list".to_string()),
        };

        let messages = raw_messages
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let message: UiMessage = serde_json::from_value(raw.clone())
                    .map_err(|e| format!("messages[{}] is not a valid message: {}", i, e))?;
                if message.content.is_none() && message.parts.is_none() {
                    return Err(format!("messages[{}] has neither `content` nor `parts`", i));
                }
                Ok(message)
            })
            .collect::<Result<Vec<_>, String>>()?;

        let farmer_id = value
            .get("farmerId")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self { messages, farmer_id })
    }

    /// Text of the final message when it is a user turn.
    pub fn last_user_text(&self) -> Option<String> {
        self.messages
            .last()
            .filter(|m| m.role == Role::User)
            .map(UiMessage::text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_and_parts() {
        let body = br#"{
            "farmerId": "f-9",
            "messages": [
                {"role": "assistant", "content": "Namaste!"},
                {"role": "user", "parts": [
                    {"type": "text", "text": "My wheat "},
                    {"type": "file", "url": "x"},
                    {"type": "text", "text": "is yellow"}
                ]}
            ]
        }"#;
        let request = ChatRequest::parse(body).unwrap();
        assert_eq!(request.farmer_id.as_deref(), Some("f-9"));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.last_user_text().as_deref(), Some("My wheat is yellow"));
        assert_eq!(request.messages[0].to_provider(), ProviderMessage::assistant("Namaste!"));
    }

    #[test]
    fn test_rejects_malformed_bodies() {
        assert!(ChatRequest::parse(b"not json").unwrap_err().contains("not valid JSON"));
        assert!(ChatRequest::parse(br#"{"farmerId":"x"}"#).unwrap_err().contains("missing"));
        assert!(ChatRequest::parse(br#"{"messages":"hi"}"#).unwrap_err().contains("must be a list"));
        assert!(ChatRequest::parse(br#"{"messages":[{"role":"robot","content":"x"}]}"#)
            .unwrap_err()
            .contains("messages[0]"));
        assert!(ChatRequest::parse(br#"{"messages":[{"role":"user"}]}"#).is_err());
    }

    #[test]
    fn test_last_message_not_user() {
        let request =
            ChatRequest::parse(br#"{"messages":[{"role":"user","content":"a"},{"role":"assistant","content":"b"}]}"#)
                .unwrap();
        assert_eq!(request.last_user_text(), None);
        assert_eq!(request.farmer_id, None);
    }
}
