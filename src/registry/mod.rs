//! Model registry.
//!
//! This module maps user-facing model keys to provider connection details
//! and resolves them against the environment:
//! - Static model table (built-in catalog or config file)
//! - Live credential checks for model listing
//! - Eager, synchronous validation before any upstream call

pub mod catalog;
mod resolver;

pub use resolver::{resolve_client, ModelStatus, Registry, ResolvedModel};
