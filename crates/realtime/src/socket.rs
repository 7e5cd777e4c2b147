//! Socket capability interface driven by the connection manager.
//!
//! A socket is opened synchronously and reports its lifecycle through an
//! event channel.  "Listeners" are whatever consumes that channel; removing
//! them means the socket stops delivering events at all.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Options
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    WebSocket,
    Polling,
}

/// Handshake auth payload.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct SocketAuth {
    pub token: String,
}

/// Everything a [`SocketConnector`] needs to open one socket.
///
/// `Debug` is manually implemented to redact the token.
#[derive(Clone, PartialEq, Eq)]
pub struct SocketOptions {
    pub endpoint: String,
    /// Allowed transports.  The manager always asks for exactly one so the
    /// socket never silently falls back to another protocol.
    pub transports: Vec<TransportMode>,
    pub auth: SocketAuth,
    pub headers: BTreeMap<String, String>,
    /// Whether the socket may reconnect by itself.  Always `false` here:
    /// the manager owns reconnection.
    pub reconnection: bool,
}

impl SocketOptions {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        let token = token.into();
        let mut headers = BTreeMap::new();
        headers.insert("authorization".to_string(), format!("Bearer {token}"));
        Self {
            endpoint: endpoint.into(),
            transports: vec![TransportMode::WebSocket],
            auth: SocketAuth { token },
            headers,
            reconnection: false,
        }
    }

    pub fn token(&self) -> &str {
        &self.auth.token
    }
}

impl std::fmt::Debug for SocketOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketOptions")
            .field("endpoint", &self.endpoint)
            .field("transports", &self.transports)
            .field("auth", &"[REDACTED]")
            .field("reconnection", &self.reconnection)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A named server push with an opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    #[serde(rename = "event")]
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Why an established connection ended.  String forms follow the
/// socket.io reason vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// This side closed the socket on purpose.
    ClientDisconnect,
    /// The server closed the socket on purpose.
    ServerDisconnect,
    TransportClose,
    TransportError,
    PingTimeout,
    Other(String),
}

impl DisconnectReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ClientDisconnect => "io client disconnect",
            Self::ServerDisconnect => "io server disconnect",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
            Self::PingTimeout => "ping timeout",
            Self::Other(s) => s,
        }
    }

    /// Deliberate closes are terminal; everything else is retried.
    pub fn is_deliberate(&self) -> bool {
        matches!(self, Self::ClientDisconnect | Self::ServerDisconnect)
    }
}

impl From<&str> for DisconnectReason {
    fn from(s: &str) -> Self {
        match s {
            "io client disconnect" => Self::ClientDisconnect,
            "io server disconnect" => Self::ServerDisconnect,
            "transport close" => Self::TransportClose,
            "transport error" => Self::TransportError,
            "ping timeout" => Self::PingTimeout,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Connected,
    ConnectError(String),
    Disconnected(DisconnectReason),
    Message(RealtimeEvent),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Control surface of one open socket.
pub trait SocketHandle: Send {
    /// Stop delivering events to this socket's listeners.
    fn remove_all_listeners(&mut self);

    /// Close the connection.
    fn disconnect(&mut self);
}

/// A freshly opened socket: its control handle plus its event stream.
pub struct SocketSession {
    pub handle: Box<dyn SocketHandle>,
    pub events: mpsc::UnboundedReceiver<SocketEvent>,
}

impl SocketSession {
    /// Detach listeners, then close.  Consumes the session so its event
    /// stream is gone too.
    pub fn teardown(mut self) {
        self.handle.remove_all_listeners();
        self.handle.disconnect();
    }
}

impl std::fmt::Debug for SocketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketSession").finish_non_exhaustive()
    }
}

/// Factory for sockets.  `open` must not block; the outcome of the
/// connection attempt arrives as the first lifecycle event.
pub trait SocketConnector: Send + Sync {
    fn open(&self, options: &SocketOptions) -> SocketSession;
}
