//! Configuration parsing and validation for chatrelay.
//!
//! Configuration comes from an optional TOML file, then environment
//! variables override individual settings. Every environment read goes
//! through [`EnvSource`] so the same code runs against the process
//! environment in production and a plain map in tests.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::registry::catalog;

/// Default frontend origin (Vite dev server).
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";

/// Default path prefix the API is mounted under.
pub const DEFAULT_ROOT_PATH: &str = "/api";

/// Lookup of environment variables.
pub trait EnvSource: Send + Sync {
    /// Raw value of `name`, if set.
    fn var(&self, name: &str) -> Option<String>;

    /// Value of `name` with surrounding whitespace removed, if set and not blank.
    fn non_empty(&self, name: &str) -> Option<String> {
        self.var(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// The real process environment. Reads are live, so rotated values are
/// picked up without a restart.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default = "catalog::builtin_models")]
    pub models: Vec<ModelEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            cors: CorsConfig::default(),
            upstream: UpstreamConfig::default(),
            models: catalog::builtin_models(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8000")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Path prefix the API is served under. Empty means no prefix.
    #[serde(default = "default_root_path")]
    pub root_path: String,
}

fn default_listen() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_root_path() -> String {
    DEFAULT_ROOT_PATH.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            root_path: default_root_path(),
        }
    }
}

/// Cross-origin policy inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default)]
    pub additional_origins: Vec<String>,
}

fn default_frontend_url() -> String {
    DEFAULT_FRONTEND_URL.to_string()
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            frontend_url: default_frontend_url(),
            additional_origins: Vec::new(),
        }
    }
}

impl CorsConfig {
    /// Origins allowed to call the API.
    ///
    /// The frontend URL comes first, followed by its `127.0.0.1` twin when it
    /// points at `localhost`, then the additional origins. Duplicates are
    /// dropped, keeping first occurrence.
    pub fn allowed_origins(&self) -> Vec<String> {
        let frontend = self.frontend_url.trim().trim_end_matches('/').to_string();

        let mut origins = Vec::new();
        if !frontend.is_empty() {
            if let Some(loopback) = loopback_variant(&frontend) {
                origins.push(frontend);
                origins.push(loopback);
            } else {
                origins.push(frontend);
            }
        }
        origins.extend(
            self.additional_origins
                .iter()
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty()),
        );

        let mut seen = HashSet::new();
        origins.retain(|o| seen.insert(o.clone()));
        origins
    }
}

/// `http://localhost:5173` -> `http://127.0.0.1:5173`.
fn loopback_variant(origin: &str) -> Option<String> {
    let mut url = reqwest::Url::parse(origin).ok()?;
    if url.host_str() != Some("localhost") {
        return None;
    }
    url.set_host(Some("127.0.0.1")).ok()?;
    Some(url.origin().ascii_serialization())
}

/// Timeouts for calls to providers.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Upper bound on a whole completion, including the streamed body.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    300
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Connection details for one user-facing model key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelEntry {
    /// User-facing model key (e.g., "llama3-70b-groq")
    pub key: String,
    /// Environment variable holding the provider API key
    pub credential_env: String,
    /// Environment variable that may override the base URL
    pub base_url_env: String,
    /// Base URL used when `base_url_env` is unset
    #[serde(default)]
    pub default_base_url: Option<String>,
    /// Model identifier sent to the provider. Defaults to `key`.
    #[serde(default)]
    pub upstream_model: String,
}

impl ModelEntry {
    pub fn new(
        key: &str,
        credential_env: &str,
        base_url_env: &str,
        default_base_url: Option<&str>,
        upstream_model: &str,
    ) -> Self {
        Self {
            key: key.to_string(),
            credential_env: credential_env.to_string(),
            base_url_env: base_url_env.to_string(),
            default_base_url: default_base_url.map(str::to_string),
            upstream_model: upstream_model.to_string(),
        }
    }
}

/// API key wrapper that redacts in Debug/Display and zeroizes on drop.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Build the effective configuration: file (if any), then environment overrides.
    pub fn load(path: Option<&Path>, env: &dyn EnvSource) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(env);
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Apply `LISTEN_ADDR`, `ROOT_PATH`, `FRONTEND_URL` and `ADDITIONAL_CORS_ORIGINS`.
    pub fn apply_env(&mut self, env: &dyn EnvSource) {
        if let Some(listen) = env.non_empty("LISTEN_ADDR") {
            self.server.listen = listen;
        }
        // An explicitly empty ROOT_PATH disables the prefix.
        if let Some(root_path) = env.var("ROOT_PATH") {
            self.server.root_path = root_path;
        }
        if let Some(frontend_url) = env.non_empty("FRONTEND_URL") {
            self.cors.frontend_url = frontend_url;
        }
        if let Some(extra) = env.var("ADDITIONAL_CORS_ORIGINS") {
            self.cors.additional_origins.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string),
            );
        }
    }

    fn normalize(&mut self) {
        self.server.root_path = normalize_root_path(&self.server.root_path);
        for entry in &mut self.models {
            if entry.upstream_model.trim().is_empty() {
                entry.upstream_model = entry.key.clone();
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.listen must not be empty".to_string(),
            ));
        }

        validate_models(&self.models)
    }
}

/// `"api/"` -> `"/api"`, `"/"` -> `""`.
pub fn normalize_root_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Check a model table: unique non-empty keys, named env vars, parseable default URLs.
pub fn validate_models(models: &[ModelEntry]) -> Result<(), ConfigError> {
    if models.is_empty() {
        tracing::warn!("No models configured - every chat request will be rejected");
    }

    let mut seen = HashSet::new();
    for entry in models {
        if entry.key.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Model entry has an empty key".to_string(),
            ));
        }
        if !seen.insert(entry.key.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Model '{}' is defined more than once",
                entry.key
            )));
        }
        if entry.credential_env.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Model '{}' has no credential environment variable",
                entry.key
            )));
        }
        if entry.base_url_env.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Model '{}' has no base URL environment variable",
                entry.key
            )));
        }
        if entry.upstream_model.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Model '{}' has an empty upstream model id",
                entry.key
            )));
        }
        if let Some(url) = &entry.default_base_url {
            check_base_url(url).map_err(|reason| {
                ConfigError::Validation(format!(
                    "Model '{}' has an invalid default base URL: {}",
                    entry.key, reason
                ))
            })?;
        }
    }

    Ok(())
}

/// Parse a provider base URL, accepting only http and https.
pub fn check_base_url(raw: &str) -> Result<reqwest::Url, String> {
    let url = reqwest::Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [server]
            listen = "127.0.0.1:9000"
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.server.root_path, "/api");
        assert_eq!(config.models, catalog::builtin_models());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [server]
            listen = "0.0.0.0:8080"
            root_path = "/chat-api/"

            [cors]
            frontend_url = "https://chat.example.com"
            additional_origins = ["https://admin.example.com"]

            [upstream]
            connect_timeout_secs = 3
            request_timeout_secs = 60

            [[models]]
            key = "together-gemini"
            credential_env = "TOGETHER_API_KEY"
            base_url_env = "TOGETHER_BASE_URL"
            upstream_model = "google/gemini-pro"
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(config.server.root_path, "/chat-api");
        assert_eq!(config.upstream.connect_timeout_secs, 3);
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].upstream_model, "google/gemini-pro");
        assert!(config.models[0].default_base_url.is_none());
    }

    #[test]
    fn test_upstream_model_defaults_to_key() {
        let toml = r#"
            [[models]]
            key = "local-llama"
            credential_env = "LOCAL_API_KEY"
            base_url_env = "LOCAL_BASE_URL"
            default_base_url = "http://localhost:11434/v1"
        "#;

        let config = Config::parse_str(toml).unwrap();
        assert_eq!(config.models[0].upstream_model, "local-llama");
    }

    #[test]
    fn test_duplicate_model_key_rejected() {
        let toml = r#"
            [[models]]
            key = "dup"
            credential_env = "A_API_KEY"
            base_url_env = "A_BASE_URL"

            [[models]]
            key = "dup"
            credential_env = "B_API_KEY"
            base_url_env = "B_BASE_URL"
        "#;

        let err = Config::parse_str(toml).unwrap_err().to_string();
        assert!(err.contains("dup"), "{}", err);
        assert!(err.contains("more than once"), "{}", err);
    }

    #[test]
    fn test_invalid_default_base_url_rejected() {
        let toml = r#"
            [[models]]
            key = "broken"
            credential_env = "X_API_KEY"
            base_url_env = "X_BASE_URL"
            default_base_url = "ftp://files.example.com"
        "#;

        let err = Config::parse_str(toml).unwrap_err().to_string();
        assert!(err.contains("broken"), "{}", err);
        assert!(err.contains("ftp"), "{}", err);
    }

    #[test]
    fn test_empty_credential_env_rejected() {
        let models = vec![ModelEntry::new("m", " ", "M_BASE_URL", None, "m")];
        assert!(validate_models(&models).is_err());
    }

    #[test]
    fn test_normalize_root_path() {
        assert_eq!(normalize_root_path("/api"), "/api");
        assert_eq!(normalize_root_path("api/"), "/api");
        assert_eq!(normalize_root_path("/"), "");
        assert_eq!(normalize_root_path(""), "");
        assert_eq!(normalize_root_path(" /v1/chat/ "), "/v1/chat");
    }

    #[test]
    fn test_env_overrides() {
        let env = env(&[
            ("ROOT_PATH", "/"),
            ("FRONTEND_URL", "https://chat.example.com"),
            ("ADDITIONAL_CORS_ORIGINS", "https://a.example.com, ,https://b.example.com"),
            ("LISTEN_ADDR", "0.0.0.0:9999"),
        ]);

        let config = Config::load(None, &env).unwrap();
        assert_eq!(config.server.root_path, "");
        assert_eq!(config.server.listen, "0.0.0.0:9999");
        assert_eq!(
            config.cors.allowed_origins(),
            vec![
                "https://chat.example.com",
                "https://a.example.com",
                "https://b.example.com",
            ]
        );
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::load(None, &HashMap::new()).unwrap();
        assert_eq!(config.server.root_path, "/api");
        assert_eq!(config.cors.frontend_url, DEFAULT_FRONTEND_URL);
    }

    #[test]
    fn test_allowed_origins_adds_loopback_for_localhost() {
        let cors = CorsConfig {
            frontend_url: "http://localhost:5173/".to_string(),
            additional_origins: vec!["http://127.0.0.1:5173".to_string()],
        };
        assert_eq!(
            cors.allowed_origins(),
            vec!["http://localhost:5173", "http://127.0.0.1:5173"]
        );
    }

    #[test]
    fn test_allowed_origins_no_loopback_for_remote_host() {
        let cors = CorsConfig {
            frontend_url: "https://chat.example.com".to_string(),
            additional_origins: vec![],
        };
        assert_eq!(cors.allowed_origins(), vec!["https://chat.example.com"]);
    }

    #[test]
    fn test_non_empty_treats_blank_as_unset() {
        let env = env(&[("BLANK", "   "), ("SET", " value ")]);
        assert_eq!(env.non_empty("BLANK"), None);
        assert_eq!(env.non_empty("MISSING"), None);
        assert_eq!(env.non_empty("SET"), Some("value".to_string()));
    }

    #[test]
    fn test_api_key_debug_redaction() {
        let key = ApiKey::from("sk-super-secret");
        let debug_output = format!("{:?}", key);
        assert_eq!(debug_output, "[REDACTED]");
        assert!(!debug_output.contains("super-secret"));
    }

    #[test]
    fn test_api_key_display_redaction() {
        let key = ApiKey::from("sk-super-secret");
        assert_eq!(format!("{}", key), "[REDACTED]");
    }

    #[test]
    fn test_api_key_expose_secret() {
        let key = ApiKey::from("the-actual-value");
        assert_eq!(key.expose_secret(), "the-actual-value");
    }
}
