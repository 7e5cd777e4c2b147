mod observability;
mod realtime;
mod rpc;

pub use observability::*;
pub use realtime::*;
pub use rpc::*;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Parse a TOML document, filling every missing field with its default.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(raw).map_err(|e| Error::Config(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the channels misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.rpc.refresh_operation.trim().is_empty() {
            return Err(Error::Config("rpc.refresh_operation must not be empty".into()));
        }
        if !self.rpc.refresh_token_pointer.starts_with('/') {
            return Err(Error::Config(format!(
                "rpc.refresh_token_pointer must be a JSON pointer, got '{}'",
                self.rpc.refresh_token_pointer
            )));
        }
        if self.realtime.backoff_factor < 1.0 {
            return Err(Error::Config(format!(
                "realtime.backoff_factor must be >= 1.0, got {}",
                self.realtime.backoff_factor
            )));
        }
        if self.realtime.max_delay_ms < self.realtime.initial_delay_ms {
            return Err(Error::Config(
                "realtime.max_delay_ms must be >= realtime.initial_delay_ms".into(),
            ));
        }
        Ok(())
    }
}
