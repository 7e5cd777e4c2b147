//! `sc-realtime`: self-healing persistent socket for live updates.
//!
//! A [`ConnectionManager`] owns at most one socket per `(endpoint, token)`
//! pair.  It authenticates the handshake with the session token, and when
//! the connection fails or drops it reconnects with jittered back-off until
//! the attempt budget runs out.  Callers observe a
//! [`ConnectionStatus`] (`connected` + a display string) and receive server
//! events through a callback.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  let manager = ConnectionManagerBuilder::from_config(&cfg)   │
//! │      .handshake_timeout(Duration::from_secs(5))              │
//! │      .build()?;                                              │
//! │                                                              │
//! │  manager.connect(ConnectParams::new(url, Some(token))).await;│
//! │  let mut status = manager.subscribe();                       │
//! │                                                              │
//! │  // or: follow_session(manager, session, url, 5, cb, stop)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection lifecycle (one driver task per connection)
//!
//! ```text
//! Disconnected ─▶ Connecting(n) ─ok──▶ Connected ─drop──▶ Connecting(0)
//!                    │    ▲                 │
//!                    │    └─error, n+1 < max│deliberate close
//!                    ▼                      ▼
//!                  Failed              Disconnected
//! ```
//!
//! 1. Tear down the previous socket (listeners first, then close)
//! 2. Open a WebSocket-only socket with `reconnection: false`, carrying the
//!    token as both an auth payload and an `Authorization` header
//! 3. On connect: reset the attempt counter, publish "Live"
//! 4. On error or unexpected drop: publish, sleep `delay_for_attempt(n)`,
//!    try again
//!
//! The socket implementation is injected through [`SocketConnector`]; the
//! crate ships [`WsConnector`] built on `tokio-tungstenite`.

pub mod builder;
pub mod follow;
pub mod manager;
pub mod reconnect;
pub mod socket;
pub mod types;
pub mod ws;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::ConnectionManagerBuilder;
pub use follow::follow_session;
pub use manager::ConnectionManager;
pub use reconnect::ReconnectBackoff;
pub use socket::{
    DisconnectReason, RealtimeEvent, SocketConnector, SocketEvent, SocketHandle, SocketOptions,
    SocketSession, TransportMode,
};
pub use types::{ConnectParams, ConnectionPhase, ConnectionStatus, EventCallback, RealtimeError};
pub use ws::WsConnector;
