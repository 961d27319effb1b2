//! chatrelay - Streaming chat gateway for OpenAI-compatible LLM providers
//!
//! Serves a single chat API over several providers and relays their token
//! streams to the browser as Server-Sent Events.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatrelay::config::{Config, EnvSource, ProcessEnv};
use chatrelay::registry::Registry;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "Streaming chat gateway for OpenAI-compatible LLM providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Path to an optional TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and print a summary
    Check {
        /// Path to an optional TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show configured models and whether their API keys are set
    Models {
        /// Path to an optional TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatrelay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    let cli = Cli::parse();
    let env: Arc<dyn EnvSource> = Arc::new(ProcessEnv);

    match cli.command {
        Commands::Serve { config, listen } => {
            let mut config = Config::load(config.as_deref(), env.as_ref())?;
            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            chatrelay::proxy::run_server(config, env).await
        }

        Commands::Check { config } => {
            let config = Config::load(config.as_deref(), env.as_ref())?;
            let registry = Registry::new(config.models.clone(), env)?;

            println!("Configuration OK");
            println!("  listen:     {}", config.server.listen);
            println!(
                "  root path:  {}",
                if config.server.root_path.is_empty() {
                    "/"
                } else {
                    config.server.root_path.as_str()
                }
            );
            println!("  origins:    {}", config.cors.allowed_origins().join(", "));
            println!(
                "  models:     {} ({} with API key set)",
                registry.entries().len(),
                registry.configured_models().len()
            );
            Ok(())
        }

        Commands::Models { config } => {
            let config = Config::load(config.as_deref(), env.as_ref())?;
            let registry = Registry::new(config.models, env)?;

            println!(
                "{:<20} {:<24} {:<18} {:<5} ENDPOINT",
                "MODEL", "UPSTREAM", "KEY VAR", "KEY"
            );
            for status in registry.statuses() {
                println!(
                    "{:<20} {:<24} {:<18} {:<5} {}",
                    status.key,
                    status.upstream_model,
                    status.credential_env,
                    if status.credential_set { "set" } else { "-" },
                    status.endpoint.as_deref().unwrap_or("(unset)")
                );
            }
            Ok(())
        }
    }
}
