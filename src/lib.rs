//! chatrelay - Streaming chat gateway for OpenAI-compatible LLM providers
//!
//! This library provides the core functionality for the chatrelay server,
//! including configuration, the model registry, provider clients and the
//! SSE relay.

pub mod config;
pub mod error;
pub mod provider;
pub mod proxy;
pub mod registry;

pub use config::Config;
pub use error::Error;
