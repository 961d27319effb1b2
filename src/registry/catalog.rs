//! Built-in model table, used when the config file does not define `[[models]]`.

use crate::config::ModelEntry;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const MISTRAL_BASE_URL: &str = "https://api.mistral.ai/v1";

/// The models shipped with chatrelay.
pub fn builtin_models() -> Vec<ModelEntry> {
    vec![
        openai("gpt-4o", "gpt-4o"),
        openai("gpt-4-turbo", "gpt-4-turbo"),
        openai("gpt-3.5-turbo", "gpt-3.5-turbo"),
        groq("llama3-70b-groq", "llama3-70b-8192"),
        groq("llama3-8b-groq", "llama3-8b-8192"),
        mistral("mistral-large", "mistral-large-latest"),
        mistral("mistral-small", "mistral-small-latest"),
    ]
}

fn openai(key: &str, upstream_model: &str) -> ModelEntry {
    ModelEntry::new(
        key,
        "OPENAI_API_KEY",
        "OPENAI_BASE_URL",
        Some(OPENAI_BASE_URL),
        upstream_model,
    )
}

fn groq(key: &str, upstream_model: &str) -> ModelEntry {
    ModelEntry::new(
        key,
        "GROQ_API_KEY",
        "GROQ_BASE_URL",
        Some(GROQ_BASE_URL),
        upstream_model,
    )
}

fn mistral(key: &str, upstream_model: &str) -> ModelEntry {
    ModelEntry::new(
        key,
        "MISTRAL_API_KEY",
        "MISTRAL_BASE_URL",
        Some(MISTRAL_BASE_URL),
        upstream_model,
    )
}
