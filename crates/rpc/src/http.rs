//! reqwest-backed [`RpcTransport`] speaking a GraphQL-style JSON envelope.
//!
//! The client keeps a cookie store so the long-lived refresh credential
//! (an HTTP-only cookie set at login) rides along with the refresh call
//! without ever being handled by this crate.

use std::time::Duration;

use serde::Deserialize;
use sc_domain::config::RpcConfig;
use sc_domain::error::{Error, Result};

use crate::envelope::{RpcRequest, ServerError, TransportError};
use crate::traits::RpcTransport;

/// Response body: `data` on success, `errors` on failure (possibly both).
#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Option<Vec<ServerError>>,
}

pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Http(format!("building HTTP client: {e}")))?;
        Ok(Self::with_client(client, config.endpoint.clone()))
    }

    /// Use a caller-built client (shared connection pool, custom TLS, ...).
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, request: RpcRequest) -> std::result::Result<serde_json::Value, TransportError> {
        let mut builder = self.client.post(&self.endpoint).json(&request);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Network(format!("timeout: {e}"))
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::Network(format!("reading response: {e}")))?;

        tracing::trace!(
            operation = %request.operation_name,
            status,
            bytes = body.len(),
            "rpc response"
        );
        interpret_response(status, &body)
    }
}

/// Turn an HTTP status and body into the transport result.
///
/// Structured `errors` always win.  A non-2xx status without them becomes a
/// synthetic error carrying the status, so a bare 401 still reads as expiry.
fn interpret_response(
    status: u16,
    body: &str,
) -> std::result::Result<serde_json::Value, TransportError> {
    let success = (200..300).contains(&status);

    match (serde_json::from_str::<ResponseBody>(body), success) {
        (
            Ok(ResponseBody {
                errors: Some(errors),
                ..
            }),
            _,
        ) if !errors.is_empty() => Err(TransportError::Errors(errors)),
        (Ok(parsed), true) => Ok(parsed.data.unwrap_or(serde_json::Value::Null)),
        (_, false) => Err(TransportError::Errors(vec![
            ServerError::new(format!("HTTP {status}")).with_status(status),
        ])),
        (Err(e), true) => Err(TransportError::Network(format!("malformed response: {e}"))),
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
