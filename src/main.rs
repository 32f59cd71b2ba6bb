//! credgate - OpenAI-compatible gateway backed by a rotating credential pool
//!
//! Forwards OpenAI-style requests upstream, authenticating each call with the
//! next credential from a file-backed pool and throttling clients per address.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credgate::config::Config;
use credgate::pool::CredentialPool;

#[derive(Parser)]
#[command(name = "credgate")]
#[command(about = "OpenAI-compatible gateway backed by a rotating credential pool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and credential store
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },

    /// Show loaded credentials (redacted)
    Tokens {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("credgate={},tower_http=info", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load the config, start tracing at its level, then report insecure defaults.
fn load_config(path: &str) -> anyhow::Result<Config> {
    let config =
        Config::from_file(path).with_context(|| format!("Failed to load config '{}'", path))?;
    init_tracing(&config.logging.level);

    tracing::info!(config = %path, "Loaded configuration");
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

/// Load the credential pool or abort startup.
fn load_pool(config: &Config) -> anyhow::Result<CredentialPool> {
    let primary = &config.credentials.path;
    let fallback = config.credentials.resolved_fallback();

    let pool = CredentialPool::load(primary, &fallback)
        .context("Cannot start without a readable credential store")?;

    if pool.path() != primary.as_path() {
        tracing::warn!(
            primary = %primary.display(),
            fallback = %pool.path().display(),
            "Primary credential store unreadable, using fallback"
        );
    }
    if pool.is_empty() {
        tracing::warn!(
            path = %pool.path().display(),
            "Credential store is empty - upstream calls will fail until tokens are appended"
        );
    } else {
        tracing::info!(
            path = %pool.path().display(),
            credentials = pool.len(),
            "Loaded credentials"
        );
    }

    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let mut cfg = load_config(&config)?;

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                cfg.server.listen = addr;
            }

            let pool = Arc::new(load_pool(&cfg)?);
            credgate::proxy::run_server(cfg, pool).await
        }

        Commands::Check { config } => {
            let cfg = load_config(&config)?;

            let pool = load_pool(&cfg)?;
            let policy = cfg.rate_limit.policy();
            println!("Configuration OK: {}", config);
            println!("  listen:      {}", cfg.server.listen);
            println!("  upstream:    {}", cfg.upstream.url);
            println!(
                "  credentials: {} ({})",
                pool.len(),
                pool.path().display()
            );
            println!(
                "  rate limit:  {} requests / {}s, idle expiry {}s",
                policy.requests,
                policy.window.as_secs(),
                policy.idle_expiration.as_secs()
            );
            Ok(())
        }

        Commands::Tokens { config } => {
            let cfg = load_config(&config)?;

            let pool = load_pool(&cfg)?;
            println!("{} credentials in {}", pool.len(), pool.path().display());
            for (i, credential) in pool.snapshot().iter().enumerate() {
                println!("  [{}] {}", i + 1, credential.preview());
            }
            Ok(())
        }
    }
}
