use std::path::Path;

use clap::{Parser, Subcommand};
use sc_domain::config::Config;

/// sc-probe: exercise the session continuity channels by hand.
#[derive(Debug, Parser)]
#[command(name = "sc-probe", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect the realtime channel and print every status change until it
    /// settles or Ctrl-C is pressed.
    Status {
        /// Access token for the socket handshake.
        #[arg(long, env = "SC_TOKEN")]
        token: String,
        /// Attempt budget override.
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Execute one RPC through the refresh coordinator and print the result.
    Query {
        /// Operation name.
        operation: String,
        /// Full query document (defaults to `query <op> { <op> }`).
        #[arg(long)]
        query: Option<String>,
        /// Variables as a JSON object.
        #[arg(long)]
        variables: Option<String>,
        /// Access token to start the session with.
        #[arg(long, env = "SC_TOKEN")]
        token: Option<String>,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load config from `SC_CONFIG` (default `continuity.toml`).
///
/// A missing file yields the built-in defaults.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("SC_CONFIG").unwrap_or_else(|_| "continuity.toml".into());
    let config = load_config_from(Path::new(&config_path))?;
    Ok((config, config_path))
}

pub fn load_config_from(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    Config::from_toml_str(&raw).map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))
}

/// Dump the resolved config as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)?;
    print!("{output}");
    Ok(())
}
