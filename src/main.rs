//! promptgate - a small HTTP gateway in front of several LLM APIs
//!
//! Serves `/api/chat` and `/api/chat-stream` for browser clients and keeps
//! every provider credential on the server side.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use promptgate::config::{Config, KeySource};

#[derive(Parser)]
#[command(name = "promptgate")]
#[command(about = "HTTP gateway for OpenAI, Gemini, DeepSeek, Together and OpenRouter")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration file
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },

    /// Show configured providers and where their keys come from
    Providers {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("promptgate={},tower_http=info", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load(path: &str) -> anyhow::Result<(Config, Vec<(String, KeySource)>)> {
    Config::from_file(path).with_context(|| format!("failed to load configuration from {}", path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let (mut cfg, key_sources) = load(&config)?;
            init_tracing(&cfg.logging.level);
            tracing::info!(config = %config, "Loaded configuration");

            for (provider, source) in &key_sources {
                match source {
                    KeySource::None => {
                        tracing::warn!(provider = %provider, "No API key configured")
                    }
                    _ => tracing::info!(provider = %provider, source = %source, "API key resolved"),
                }
            }

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                cfg.server.listen = addr;
            }

            promptgate::proxy::run_server(cfg).await
        }

        Commands::Check { config } => {
            let (cfg, key_sources) = load(&config)?;
            println!("Configuration OK: {}", config);
            println!("  listen:  {}", cfg.server.listen);
            println!(
                "  default: {}/{}",
                cfg.routing.default_provider, cfg.routing.default_model
            );
            for (provider, source) in key_sources {
                println!("  key {:<12} {}", provider, source);
            }
            Ok(())
        }

        Commands::Providers { config } => {
            let (cfg, key_sources) = load(&config)?;
            println!(
                "{:<14} {:<13} {:<24} {:<18} URL",
                "NAME", "KIND", "DEFAULT MODEL", "KEY"
            );
            for provider in &cfg.providers {
                let source = key_sources
                    .iter()
                    .find(|(name, _)| name == &provider.name)
                    .map(|(_, s)| s.to_string())
                    .unwrap_or_else(|| "none".to_string());
                println!(
                    "{:<14} {:<13} {:<24} {:<18} {}",
                    provider.name,
                    provider.kind.to_string(),
                    provider.default_model.as_deref().unwrap_or("-"),
                    source,
                    provider.url
                );
                if !provider.models.is_empty() {
                    println!("{:<14} models: {}", "", provider.models.join(", "));
                }
            }
            Ok(())
        }
    }
}
