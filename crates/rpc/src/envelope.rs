//! Wire types: the outgoing request envelope and the error shapes the
//! server sends back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Header carrying the bearer credential.  Keys are stored lowercase.
pub const AUTHORIZATION: &str = "authorization";

const BEARER_PREFIX: &str = "Bearer ";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One outgoing RPC call.
///
/// `query` and `variables` are opaque business payloads; only the
/// operation name and the headers matter to the refresh logic.
/// `Debug` is manually implemented to redact the authorization header.
#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    pub operation_name: String,
    pub query: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub variables: serde_json::Value,
    #[serde(skip)]
    pub headers: BTreeMap<String, String>,
}

impl RpcRequest {
    pub fn new(operation_name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            query: query.into(),
            variables: serde_json::Value::Null,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_variables(mut self, variables: serde_json::Value) -> Self {
        self.variables = variables;
        self
    }

    /// Set a header.  The name is lowercased so lookups are
    /// case-insensitive.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Replace the authorization header with `Bearer <token>`.
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header(AUTHORIZATION, format!("{BEARER_PREFIX}{token}"))
    }

    /// Token this request was (or will be) sent with, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.strip_prefix(BEARER_PREFIX))
    }
}

impl std::fmt::Debug for RpcRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers: BTreeMap<&str, &str> = self
            .headers
            .iter()
            .map(|(k, v)| {
                if k == AUTHORIZATION {
                    (k.as_str(), "[REDACTED]")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("RpcRequest")
            .field("operation_name", &self.operation_name)
            .field("headers", &headers)
            .finish_non_exhaustive()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A structured error entry from the server's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ErrorExtensions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorExtensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_error: Option<OriginalError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.extensions.get_or_insert_with(Default::default).code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.extensions
            .get_or_insert_with(Default::default)
            .original_error
            .get_or_insert_with(Default::default)
            .status_code = Some(status);
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.code.as_deref()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.extensions.as_ref()?.original_error.as_ref()?.status_code
    }
}

/// Failure reported by an [`RpcTransport`](crate::traits::RpcTransport).
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The server answered with one or more structured errors.
    #[error("{}", summarize(.0))]
    Errors(Vec<ServerError>),
    /// The request never produced a usable answer.
    #[error("network: {0}")]
    Network(String),
}

pub(crate) fn summarize(errors: &[ServerError]) -> String {
    match errors {
        [] => "server returned an empty error list".into(),
        [only] => only.message.clone(),
        [first, rest @ ..] => format!("{} (+{} more)", first.message, rest.len()),
    }
}
