//! Builder pattern for constructing a [`ConnectionManager`].

use std::sync::Arc;
use std::time::Duration;

use sc_domain::config::RealtimeConfig;

use crate::manager::ConnectionManager;
use crate::reconnect::ReconnectBackoff;
use crate::socket::SocketConnector;
use crate::types::RealtimeError;
use crate::ws::WsConnector;

/// Fluent builder for [`ConnectionManager`].
///
/// # Example
///
/// ```rust,no_run
/// # use sc_realtime::{ConnectionManagerBuilder, ReconnectBackoff};
/// # async fn demo() {
/// let manager = ConnectionManagerBuilder::new()
///     .reconnect_backoff(ReconnectBackoff::default())
///     .handshake_timeout(std::time::Duration::from_secs(5))
///     .build()
///     .unwrap();
/// # }
/// ```
pub struct ConnectionManagerBuilder {
    pub(crate) connector: Option<Arc<dyn SocketConnector>>,
    pub(crate) reconnect_backoff: ReconnectBackoff,
    pub(crate) handshake_timeout: Duration,
}

impl ConnectionManagerBuilder {
    pub fn new() -> Self {
        Self {
            connector: None,
            reconnect_backoff: ReconnectBackoff::default(),
            handshake_timeout: Duration::from_secs(10),
        }
    }

    /// Seed backoff settings from the `[realtime]` config section.
    pub fn from_config(cfg: &RealtimeConfig) -> Self {
        Self::new().reconnect_backoff(ReconnectBackoff::from_config(cfg))
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Override the reconnect backoff policy.
    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.reconnect_backoff = cfg;
        self
    }

    /// Timeout for the WebSocket upgrade (default 10s).  Only used by the
    /// default connector.
    pub fn handshake_timeout(mut self, d: Duration) -> Self {
        self.handshake_timeout = d;
        self
    }

    // ── Capabilities ─────────────────────────────────────────────────

    /// Replace the default tokio-tungstenite connector.
    pub fn connector(mut self, connector: Arc<dyn SocketConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Build the [`ConnectionManager`].
    pub fn build(self) -> Result<ConnectionManager, RealtimeError> {
        if self.reconnect_backoff.backoff_factor < 1.0 {
            return Err(RealtimeError::Config(
                "backoff_factor must be >= 1.0".into(),
            ));
        }
        if self.reconnect_backoff.max_delay < self.reconnect_backoff.initial_delay {
            return Err(RealtimeError::Config(
                "max_delay must be >= initial_delay".into(),
            ));
        }

        let connector = match self.connector {
            Some(c) => c,
            None => Arc::new(WsConnector::new(self.handshake_timeout)),
        };
        Ok(ConnectionManager::new(connector, self.reconnect_backoff))
    }
}

impl Default for ConnectionManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
