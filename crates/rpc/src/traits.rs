use sc_domain::error::Result;

use crate::envelope::{RpcRequest, TransportError};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Injected capabilities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The concrete request sender.
///
/// Implementations send the request exactly as given (headers included)
/// and report server-side failures as [`TransportError::Errors`].
#[async_trait::async_trait]
pub trait RpcTransport: Send + Sync {
    /// Send one request and return the `data` payload.
    async fn send(&self, request: RpcRequest) -> std::result::Result<serde_json::Value, TransportError>;
}

/// The credential refresh exchange.
///
/// Relies on a long-lived credential carried out of band (e.g. an HTTP-only
/// cookie), so it takes no arguments.  Must return a non-empty token.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<String>;
}

/// Where the user is sent after an unrecoverable authentication loss.
pub trait Navigator: Send + Sync {
    /// The route currently displayed (path, optionally with a query).
    fn current_route(&self) -> String;

    fn navigate(&self, route: &str);
}
