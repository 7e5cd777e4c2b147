//! Connection status, connect parameters, and errors.

use std::sync::Arc;

use serde::Serialize;

use crate::socket::{DisconnectReason, RealtimeEvent};

// ── Documented status strings ────────────────────────────────────────

pub const STATUS_DISCONNECTED: &str = "Disconnected";
pub const STATUS_LIVE: &str = "Live";
pub const STATUS_MAX_ATTEMPTS: &str = "Connection failed (Max attempts)";
pub const STATUS_CLIENT_DISCONNECT: &str = "Disconnected by client";
pub const STATUS_SERVER_DISCONNECT: &str = "Disconnected by server";
pub const STATUS_NOT_AUTHENTICATED: &str = "Not authenticated";
pub const STATUS_NO_ENDPOINT: &str = "No endpoint configured";

/// Error text longer than this is cut for display.
const MAX_STATUS_ERROR_CHARS: usize = 80;

/// Lifecycle phase of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    Failed,
}

/// What callers see.  `status_message` is display-only; branch on
/// `connected` or `phase` instead of parsing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub status_message: String,
    pub phase: ConnectionPhase,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::idle(STATUS_DISCONNECTED)
    }
}

impl ConnectionStatus {
    pub(crate) fn idle(message: &str) -> Self {
        Self {
            connected: false,
            status_message: message.into(),
            phase: ConnectionPhase::Disconnected,
        }
    }

    pub(crate) fn connecting(attempt: u32, max_attempts: u32) -> Self {
        Self {
            connected: false,
            status_message: format!("Connecting (attempt {}/{max_attempts})", attempt + 1),
            phase: ConnectionPhase::Connecting { attempt },
        }
    }

    pub(crate) fn live() -> Self {
        Self {
            connected: true,
            status_message: STATUS_LIVE.into(),
            phase: ConnectionPhase::Connected,
        }
    }

    pub(crate) fn connect_error(attempt: u32, error: &str) -> Self {
        Self {
            connected: false,
            status_message: format!("Connection error: {}", truncate_for_display(error)),
            phase: ConnectionPhase::Connecting { attempt },
        }
    }

    pub(crate) fn lost(attempt: u32, reason: &DisconnectReason) -> Self {
        Self {
            connected: false,
            status_message: format!("Connection lost ({reason}), reconnecting"),
            phase: ConnectionPhase::Connecting { attempt },
        }
    }

    pub(crate) fn failed() -> Self {
        Self {
            connected: false,
            status_message: STATUS_MAX_ATTEMPTS.into(),
            phase: ConnectionPhase::Failed,
        }
    }

    /// No automatic recovery will follow this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, ConnectionPhase::Failed | ConnectionPhase::Disconnected)
    }
}

fn truncate_for_display(text: &str) -> String {
    if text.chars().count() <= MAX_STATUS_ERROR_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_STATUS_ERROR_CHARS).collect();
    format!("{cut}…")
}

// ── Connect parameters ───────────────────────────────────────────────

/// Callback receiving server events while connected.
pub type EventCallback = Arc<dyn Fn(RealtimeEvent) + Send + Sync>;

#[derive(Clone)]
pub struct ConnectParams {
    pub endpoint: String,
    pub token: Option<String>,
    /// Socket opens allowed before `Failed`; `0` fails without opening.
    pub max_attempts: u32,
    pub on_event: Option<EventCallback>,
}

impl ConnectParams {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token,
            max_attempts: 5,
            on_event: None,
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn on_event(mut self, cb: impl Fn(RealtimeEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(cb));
        self
    }
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("max_attempts", &self.max_attempts)
            .field("on_event", &self.on_event.is_some())
            .finish()
    }
}

/// Top-level realtime error.
#[derive(thiserror::Error, Debug)]
pub enum RealtimeError {
    #[error("config: {0}")]
    Config(String),
    #[error("websocket: {0}")]
    WebSocket(String),
    #[error("handshake: {0}")]
    Handshake(String),
}
