//! Request types for the chat API and the OpenAI-compatible upstream wire.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of `POST /chat/stream`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
    /// User-facing model key
    pub model: String,
    /// Conversation history, oldest first
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Checks serde cannot express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.model.trim().is_empty() {
            return Err(Error::Validation("model must not be empty".to_string()));
        }
        if self.messages.is_empty() {
            return Err(Error::Validation(
                "messages must contain at least one message".to_string(),
            ));
        }
        Ok(())
    }
}

/// Body sent to `{base_url}/chat/completions`.
#[derive(Debug, Serialize)]
pub struct UpstreamChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
}

/// Streaming chunk response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Some providers report failures in-band instead of via HTTP status.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// A streaming choice delta.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Delta,
}

/// Delta content in streaming response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_parses_roles() {
        let request: ChatRequest = serde_json::from_str(
            r#"{
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"}
                ]
            }"#,
        )
        .unwrap();

        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn chat_request_rejects_unknown_role() {
        let result: Result<ChatRequest, _> = serde_json::from_str(
            r#"{"model": "gpt-4o", "messages": [{"role": "tool", "content": "x"}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn chat_request_rejects_empty_messages() {
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![],
        };
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("at least one message"));
    }

    #[test]
    fn upstream_request_body() {
        let messages = vec![ChatMessage::new(Role::User, "hi")];
        let body = UpstreamChatRequest {
            model: "llama3-70b-8192",
            messages: &messages,
            stream: true,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "model": "llama3-70b-8192",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": true
            })
        );
    }

    #[test]
    fn chunk_tolerates_missing_fields() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.choices.len(), 1);
        assert!(chunk.choices[0].delta.content.is_none());
    }
}
