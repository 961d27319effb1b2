//! HTTP proxy server module.
//!
//! This module provides the chat HTTP API that accepts requests,
//! resolves the requested model and relays the provider's stream as SSE.

mod handlers;
mod server;
pub mod stream;
pub mod types;

pub use server::{create_router, cors_layer, run_server, AppState, RequestId, REQUEST_ID_HEADER};
pub use stream::{relay_chunks, stream_chat, StreamEvent};
pub use types::{ChatMessage, ChatRequest, Role};
