use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use context_sync::config::Config;
use context_sync::gateway::{AnalyticsApi, HttpAnalyticsClient};
use context_sync::paths::PlatformPaths;
use context_sync::types::CodeObjectId;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// Talk to the analytics backend directly, without an editor
#[derive(Parser, Debug)]
#[command(name = "context-sync", version, long_version = LONG_VERSION)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Base URL of the analytics API
    #[arg(long, env = "CONTEXT_SYNC_API_URL")]
    api_url: Option<String>,

    /// Bearer token for the analytics API
    #[arg(long, env = "CONTEXT_SYNC_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the environments known to the backend
    Environments,

    /// Fetch summaries for code objects
    Summaries {
        #[arg(short, long)]
        environment: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Fetch insights for code objects
    Insights {
        #[arg(short, long)]
        environment: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Fetch errors recorded for a method
    Errors {
        #[arg(short, long)]
        environment: String,
        id: String,
    },

    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let config = load_config(&cli)?;

    if let Command::Config { save } = &cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        if *save {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(PlatformPaths::default_config_path);
            config.save(&path)?;
            eprintln!("Saved to {}", path.display());
        }
        return Ok(());
    }

    let client = HttpAnalyticsClient::new(&config.analytics)?;
    tracing::debug!("Using analytics API at {}", client.base_url());

    match cli.command {
        Command::Environments => print_json(&client.list_environments().await?),
        Command::Summaries { environment, ids } => {
            print_json(&client.fetch_summaries(&environment, &to_ids(ids)).await?)
        }
        Command::Insights { environment, ids } => {
            print_json(&client.fetch_insights(&environment, &to_ids(ids)).await?)
        }
        Command::Errors { environment, id } => print_json(
            &client
                .fetch_errors_for_code_object(&environment, &CodeObjectId::new(id))
                .await?,
        ),
        Command::Config { .. } => Ok(()),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => Config::new()?,
    };

    if let Some(url) = &cli.api_url {
        config.analytics.base_url = url.clone();
    }
    if let Some(token) = &cli.api_token {
        config.analytics.api_token = Some(token.clone());
    }
    config.validate()?;
    Ok(config)
}

fn to_ids(ids: Vec<String>) -> Vec<CodeObjectId> {
    ids.into_iter().map(CodeObjectId::new).collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn setup_tracing(verbose: bool) {
    let default = if verbose { "context_sync=debug" } else { "context_sync=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
