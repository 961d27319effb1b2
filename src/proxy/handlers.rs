//! HTTP request handlers.

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::StatusCode,
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Redirect, Response,
    },
    Json,
};
use futures::{Stream, StreamExt};

use super::server::{AppState, RequestId};
use super::stream::{stream_chat, StreamEvent};
use super::types::ChatRequest;
use crate::error::Error;
use crate::registry::resolve_client;

/// Handle POST /chat/stream
///
/// Body-shape failures are rejected as JSON before any model lookup.
/// Everything after that, including configuration errors, is reported
/// inside an SSE stream.
pub async fn chat_stream(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, Error> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!(
            request_id = %request_id.0,
            error = %rejection.body_text(),
            "Rejected chat request body"
        );
        Error::Validation(rejection.body_text())
    })?;
    request.validate().inspect_err(|e| {
        tracing::warn!(request_id = %request_id.0, error = %e, "Rejected chat request");
    })?;

    tracing::info!(
        request_id = %request_id.0,
        model = %request.model,
        messages = request.messages.len(),
        "Received chat stream request"
    );

    match resolve_client(&state.registry, &state.http_client, &request.model) {
        Ok((client, upstream_model)) => Ok(sse_response(
            StatusCode::OK,
            stream_chat(client, upstream_model, request.messages),
        )),
        Err(e) => {
            tracing::error!(
                request_id = %request_id.0,
                model = %request.model,
                stage = e.stage(),
                status = e.status().as_u16(),
                "Configuration error, sending error event"
            );
            let event = StreamEvent::Error(e.to_detail());
            Ok(sse_response(e.status(), tokio_stream::once(event)))
        }
    }
}

/// Wrap an event stream in an SSE response with the given status.
fn sse_response<S>(status: StatusCode, events: S) -> Response
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let sse = Sse::new(events.map(|event| event.to_sse())).keep_alive(KeepAlive::default());
    (status, sse).into_response()
}

/// Handle GET /models
pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let models = state.registry.configured_models();
    tracing::info!(models = ?models, "Returning available models");
    Json(serde_json::json!({ "models": models }))
}

/// Handle GET /health
pub async fn health() -> impl IntoResponse {
    tracing::debug!("Health check");
    Json(serde_json::json!({ "status": "ok" }))
}

/// Handle GET / by redirecting to the API index.
pub async fn root_redirect(State(state): State<AppState>) -> Redirect {
    Redirect::temporary(&format!("{}/docs", state.config.server.root_path))
}

/// Handle GET /docs - machine-readable index of the API
pub async fn docs(State(state): State<AppState>) -> impl IntoResponse {
    let root = &state.config.server.root_path;
    Json(serde_json::json!({
        "title": "chatrelay",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Unified streaming chat API over OpenAI-compatible providers.",
        "root_path": root,
        "endpoints": [
            {
                "method": "GET",
                "path": format!("{}/health", root),
                "description": "Liveness check",
            },
            {
                "method": "GET",
                "path": format!("{}/models", root),
                "description": "Model keys whose provider API key is configured",
            },
            {
                "method": "POST",
                "path": format!("{}/chat/stream", root),
                "description": "Stream a chat completion as Server-Sent Events",
                "body": {
                    "model": "string",
                    "messages": [{"role": "user | assistant | system", "content": "string"}],
                },
                "events": [
                    {"content": "string"},
                    {"error": {"message": "string", "code": "integer", "type": "string"}},
                    {"done": true},
                ],
            },
        ],
    }))
}
