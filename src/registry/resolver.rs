//! Model lookup and client resolution.

use std::sync::Arc;

use crate::config::{validate_models, ApiKey, ConfigError, EnvSource, ModelEntry};
use crate::error::ResolveError;
use crate::provider::ProviderClient;

/// A model entry resolved against the current environment.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub key: String,
    pub upstream_model: String,
    pub credential: ApiKey,
    pub base_url: String,
}

/// Per-model configuration status, for operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStatus {
    pub key: String,
    pub upstream_model: String,
    pub credential_env: String,
    pub credential_set: bool,
    /// Base URL that would be used right now, if any.
    pub endpoint: Option<String>,
}

/// Immutable model table plus the environment it is resolved against.
///
/// The table is fixed at construction. Credentials and base URLs are read
/// from the environment on every call so rotated keys take effect without
/// a restart.
#[derive(Clone)]
pub struct Registry {
    entries: Vec<ModelEntry>,
    env: Arc<dyn EnvSource>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create a registry, validating the model table.
    pub fn new(entries: Vec<ModelEntry>, env: Arc<dyn EnvSource>) -> Result<Self, ConfigError> {
        validate_models(&entries)?;
        Ok(Self { entries, env })
    }

    /// All entries, in configuration order.
    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&ModelEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Keys whose credential variable is currently set.
    pub fn configured_models(&self) -> Vec<String> {
        let mut models = Vec::new();
        for entry in &self.entries {
            if self.env.non_empty(&entry.credential_env).is_some() {
                models.push(entry.key.clone());
            } else {
                tracing::warn!(
                    model = %entry.key,
                    var = %entry.credential_env,
                    "Model skipped: credential environment variable is not set"
                );
            }
        }

        if self.entries.is_empty() {
            tracing::warn!("No models are configured");
        } else if models.is_empty() {
            tracing::warn!("No API keys are set for any configured model - model list is empty");
        }

        models
    }

    /// Configuration status of every entry.
    pub fn statuses(&self) -> Vec<ModelStatus> {
        self.entries
            .iter()
            .map(|entry| ModelStatus {
                key: entry.key.clone(),
                upstream_model: entry.upstream_model.clone(),
                credential_env: entry.credential_env.clone(),
                credential_set: self.env.non_empty(&entry.credential_env).is_some(),
                endpoint: self.endpoint_for(entry),
            })
            .collect()
    }

    /// Resolve a model key to its credential, base URL and upstream model id.
    pub fn resolve(&self, key: &str) -> Result<ResolvedModel, ResolveError> {
        let entry = self.get(key).ok_or_else(|| ResolveError::UnknownModel {
            model: key.to_string(),
        })?;

        let credential = self.env.non_empty(&entry.credential_env).ok_or_else(|| {
            ResolveError::MissingCredential {
                model: key.to_string(),
                var: entry.credential_env.clone(),
            }
        })?;

        let base_url = self
            .endpoint_for(entry)
            .ok_or_else(|| ResolveError::MissingEndpoint {
                model: key.to_string(),
                var: entry.base_url_env.clone(),
            })?;

        Ok(ResolvedModel {
            key: entry.key.clone(),
            upstream_model: entry.upstream_model.clone(),
            credential: ApiKey::from(credential),
            base_url,
        })
    }

    /// Base URL from the entry's env var, falling back to its default.
    fn endpoint_for(&self, entry: &ModelEntry) -> Option<String> {
        self.env.non_empty(&entry.base_url_env).or_else(|| {
            entry
                .default_base_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
        })
    }
}

/// Resolve `key` and build a provider client on the shared HTTP connection pool.
///
/// Returns the client together with the provider's model identifier. All
/// checks are synchronous; nothing touches the network.
pub fn resolve_client(
    registry: &Registry,
    http: &reqwest::Client,
    key: &str,
) -> Result<(ProviderClient, String), ResolveError> {
    let resolved = registry.resolve(key).inspect_err(|e| {
        tracing::error!(model = %key, stage = e.stage(), error = %e, "Failed to resolve model");
    })?;

    let client = ProviderClient::new(http.clone(), &resolved).inspect_err(|e| {
        tracing::error!(model = %key, stage = e.stage(), error = %e, "Failed to resolve model");
    })?;

    tracing::info!(
        model = %resolved.key,
        upstream_model = %resolved.upstream_model,
        base_url = %client.base_url(),
        "Configured provider client"
    );

    Ok((client, resolved.upstream_model))
}
