//! Diagnostic CLI for the session continuity channels.
//!
//! Usage:
//!   sc-probe status --token <T>
//!   sc-probe query timers --token <T>
//!   sc-probe config show
//!
//! Env vars:
//!   SC_CONFIG  : config path (default: continuity.toml)
//!   SC_TOKEN   : access token for `status` / `query`
//!   RUST_LOG   : log filter (overrides `observability.default_filter`)

mod cli;
mod commands;

use clap::Parser;
use sc_domain::config::ObservabilityConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Status {
            token,
            max_attempts,
        } => {
            let (config, _) = cli::load_config()?;
            init_tracing(&config.observability);
            commands::status(&config, token, max_attempts).await
        }
        Command::Query {
            operation,
            query,
            variables,
            token,
        } => {
            let (config, _) = cli::load_config()?;
            init_tracing(&config.observability);
            commands::query(&config, operation, query, variables, token).await
        }
        Command::Config(ConfigCommand::Validate) => {
            let (_, config_path) = cli::load_config()?;
            println!("Config OK ({config_path})");
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _) = cli::load_config()?;
            cli::show(&config)
        }
    }
}

/// JSON lines or compact stderr output, per `observability.json_logs`.
fn init_tracing(obs: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&obs.default_filter));

    if obs.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}
