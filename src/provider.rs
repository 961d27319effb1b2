//! Client for an OpenAI-compatible provider endpoint.

use axum::http::{header, HeaderValue};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};

use crate::config::{check_base_url, ApiKey};
use crate::error::{ResolveError, UpstreamError};
use crate::proxy::types::{ChatMessage, UpstreamChatRequest};
use crate::registry::ResolvedModel;

/// Raw body chunks of a streaming completion.
pub type ChunkStream = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// Longest provider error body quoted back to the client.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Most bytes read from a non-2xx response body.
const MAX_ERROR_BODY_BYTES: usize = 16 * 1024;

/// A provider endpoint bound to one credential.
///
/// Cheap to build per request: the underlying `reqwest::Client` is a shared
/// connection pool.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
    api_key: ApiKey,
}

impl ProviderClient {
    /// Bind `http` to the resolved endpoint and credential.
    pub fn new(http: reqwest::Client, resolved: &ResolvedModel) -> Result<Self, ResolveError> {
        let client_init = |reason: String| ResolveError::ClientInit {
            model: resolved.key.clone(),
            reason,
        };

        let base_url = check_base_url(&resolved.base_url)
            .map_err(|reason| client_init(format!("invalid base URL: {}", reason)))?;

        // Reject keys that cannot travel in a header now rather than at send time.
        HeaderValue::from_str(&format!("Bearer {}", resolved.credential.expose_secret()))
            .map_err(|_| {
                client_init("API key contains characters not allowed in an HTTP header".to_string())
            })?;

        Ok(Self {
            http,
            base_url,
            api_key: resolved.credential.clone(),
        })
    }

    pub fn base_url(&self) -> &reqwest::Url {
        &self.base_url
    }

    /// `{base_url}/chat/completions`
    pub fn completions_url(&self) -> reqwest::Url {
        let mut url = self.base_url.clone();
        let path = format!("{}/chat/completions", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url
    }

    /// Open a streaming chat completion.
    ///
    /// Resolves once response headers arrive. A non-2xx status is returned as
    /// [`UpstreamError::Status`] carrying the provider's own error message when
    /// the body has one.
    pub async fn stream_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChunkStream, UpstreamError> {
        let body = UpstreamChatRequest {
            model,
            messages,
            stream: true,
        };

        let request = self
            .http
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose_secret())
            .header(header::ACCEPT, "text/event-stream")
            .json(&body)
            .build()
            .map_err(|e| UpstreamError::Setup(e.without_url().to_string()))?;

        let response = self
            .http
            .execute(request)
            .await
            .map_err(UpstreamError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = read_error_body(response).await;
            tracing::error!(
                status = %status,
                model = %model,
                body = %error_body,
                "Provider returned error"
            );
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message: provider_error_message(&error_body)
                    .unwrap_or_else(|| fallback_message(status, &error_body)),
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(UpstreamError::from_transport))
            .boxed())
    }
}

/// Read at most [`MAX_ERROR_BODY_BYTES`] of an error response.
async fn read_error_body(response: reqwest::Response) -> String {
    let mut body = Vec::new();
    let mut chunks = response.bytes_stream();
    while let Some(Ok(chunk)) = chunks.next().await {
        let room = MAX_ERROR_BODY_BYTES - body.len();
        body.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if body.len() >= MAX_ERROR_BODY_BYTES {
            break;
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// `error.message` from an OpenAI-style error body.
pub(crate) fn provider_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let message = match error {
        serde_json::Value::String(s) => s.clone(),
        other => other.get("message")?.as_str()?.to_string(),
    };
    Some(message)
}

fn fallback_message(status: reqwest::StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("upstream error")
            .to_string();
    }
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
