//! HTTP server setup and configuration.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers;
use crate::config::{Config, CorsConfig, EnvSource};
use crate::registry::Registry;

/// Response header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub http_client: Client,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build state from a validated config, with a pooled HTTP client.
    pub fn new(config: Config, env: Arc<dyn EnvSource>) -> anyhow::Result<Self> {
        let registry = Registry::new(config.models.clone(), env)?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.upstream.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.upstream.connect_timeout_secs))
            .build()?;

        Ok(Self {
            registry: Arc::new(registry),
            http_client,
            config: Arc::new(config),
        })
    }
}

/// Correlation id assigned to each request.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Assign a [`RequestId`] and echo it in the response headers.
async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Build the CORS layer from the configured allow-list.
///
/// Methods and headers are mirrored from the preflight request, which is
/// how "allow all" is expressed when credentials are allowed. A `*` entry
/// does the same for origins.
pub fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let allowed = cors.allowed_origins();

    let allow_origin = if allowed.iter().any(|origin| origin == "*") {
        tracing::warn!("CORS allow-list contains '*', mirroring every request origin");
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = allowed
            .into_iter()
            .filter_map(|origin| match HeaderValue::from_str(&origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Create the axum router with all endpoints.
///
/// API routes are served at the bare path and again under the configured
/// root path, so the service works both behind a prefix-stripping reverse
/// proxy and when reached directly.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/models", get(handlers::list_models))
        .route("/docs", get(handlers::docs))
        .route("/chat/stream", post(handlers::chat_stream));

    let root_path = state.config.server.root_path.clone();
    let mut app = Router::new().route("/", get(handlers::root_redirect));
    if !root_path.is_empty() {
        app = app.nest(&root_path, api.clone());
    }

    app.merge(api)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors))
        // Outermost, so CORS preflight answers carry the id too
        .layer(middleware::from_fn(assign_request_id))
}

/// Run the HTTP server.
pub async fn run_server(config: Config, env: Arc<dyn EnvSource>) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();
    let root_path = config.server.root_path.clone();
    let origins = config.cors.allowed_origins();

    let state = AppState::new(config, env)?;
    let configured = state.registry.configured_models();

    tracing::info!(
        models = state.registry.entries().len(),
        configured = configured.len(),
        "Loaded model registry"
    );
    tracing::info!(origins = ?origins, "Configured CORS");

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, root_path = %root_path, "Starting chatrelay server");

    axum::serve(listener, app).await?;

    Ok(())
}
