//! Loading configuration from a TOML file with environment overrides.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use chatrelay::config::{Config, EnvSource};
use chatrelay::error::ResolveError;
use chatrelay::registry::Registry;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const CONFIG: &str = r#"
[server]
listen = "0.0.0.0:9000"
root_path = "/chat-api"

[cors]
frontend_url = "https://chat.example.com"

[[models]]
key = "local-llama"
credential_env = "LOCAL_API_KEY"
base_url_env = "LOCAL_BASE_URL"
default_base_url = "http://localhost:11434/v1"
upstream_model = "llama3:8b"

[[models]]
key = "together-gemini"
credential_env = "TOGETHER_API_KEY"
base_url_env = "TOGETHER_BASE_URL"
upstream_model = "google/gemini-pro"
"#;

#[test]
fn test_file_values_used_without_env() {
    let file = write_config(CONFIG);
    let config = Config::load(Some(file.path()), &HashMap::new()).unwrap();

    assert_eq!(config.server.listen, "0.0.0.0:9000");
    assert_eq!(config.server.root_path, "/chat-api");
    assert_eq!(
        config.cors.allowed_origins(),
        vec!["https://chat.example.com"]
    );
    let keys: Vec<&str> = config.models.iter().map(|m| m.key.as_str()).collect();
    assert_eq!(keys, vec!["local-llama", "together-gemini"]);
}

#[test]
fn test_env_overrides_file() {
    let file = write_config(CONFIG);
    let env = env(&[
        ("ROOT_PATH", "v2/"),
        ("FRONTEND_URL", "http://localhost:3000"),
        ("ADDITIONAL_CORS_ORIGINS", "https://admin.example.com"),
    ]);
    let config = Config::load(Some(file.path()), &env).unwrap();

    assert_eq!(config.server.listen, "0.0.0.0:9000");
    assert_eq!(config.server.root_path, "/v2");
    assert_eq!(
        config.cors.allowed_origins(),
        vec![
            "http://localhost:3000",
            "http://127.0.0.1:3000",
            "https://admin.example.com",
        ]
    );
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = Config::load(Some(path.as_path()), &HashMap::new()).unwrap_err();
    assert!(err.to_string().contains("absent.toml"), "{}", err);
}

#[test]
fn test_malformed_file_is_an_error() {
    let file = write_config("[server\nlisten = 1");
    let err = Config::load(Some(file.path()), &HashMap::new()).unwrap_err();
    assert!(err.to_string().contains("parse"), "{}", err);
}

#[test]
fn test_registry_from_file_resolves_default_and_override_urls() {
    let file = write_config(CONFIG);
    let env: Arc<dyn EnvSource> = Arc::new(env(&[
        ("LOCAL_API_KEY", "local"),
        ("TOGETHER_API_KEY", "tg"),
    ]));
    let config = Config::load(Some(file.path()), env.as_ref()).unwrap();
    let registry = Registry::new(config.models, env).unwrap();

    let local = registry.resolve("local-llama").unwrap();
    assert_eq!(local.base_url, "http://localhost:11434/v1");
    assert_eq!(local.upstream_model, "llama3:8b");

    // No default URL and no override: the endpoint cannot be determined.
    let err = registry.resolve("together-gemini").unwrap_err();
    assert!(matches!(err, ResolveError::MissingEndpoint { .. }));

    // Built-in catalog entries are replaced by the file's table.
    assert!(matches!(
        registry.resolve("gpt-4o"),
        Err(ResolveError::UnknownModel { .. })
    ));
    assert_eq!(
        registry.configured_models(),
        vec!["local-llama".to_string(), "together-gemini".to_string()]
    );
}
