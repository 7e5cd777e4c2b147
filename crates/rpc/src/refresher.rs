//! [`TokenRefresher`] that issues the refresh operation through an
//! [`RpcTransport`].

use std::sync::Arc;

use sc_domain::config::RpcConfig;
use sc_domain::error::{Error, Result};

use crate::envelope::RpcRequest;
use crate::traits::{RpcTransport, TokenRefresher};

pub struct TransportRefresher {
    transport: Arc<dyn RpcTransport>,
    operation: String,
    query: String,
    token_pointer: String,
}

impl TransportRefresher {
    /// Build from config.  The default query selects `accessToken` on the
    /// refresh operation, matching the default token pointer.
    pub fn new(transport: Arc<dyn RpcTransport>, config: &RpcConfig) -> Self {
        let op = &config.refresh_operation;
        Self {
            transport,
            operation: op.clone(),
            query: format!("mutation {op} {{ {op} {{ accessToken }} }}"),
            token_pointer: config.refresh_token_pointer.clone(),
        }
    }

    /// Override the query document sent with the refresh operation.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }
}

#[async_trait::async_trait]
impl TokenRefresher for TransportRefresher {
    async fn refresh(&self) -> Result<String> {
        // No bearer header: the refresh credential travels as a cookie.
        let request = RpcRequest::new(&self.operation, &self.query);
        let data = self
            .transport
            .send(request)
            .await
            .map_err(|e| Error::Auth(format!("refresh call failed: {e}")))?;

        extract_token(&data, &self.token_pointer)
    }
}

fn extract_token(data: &serde_json::Value, pointer: &str) -> Result<String> {
    data.pointer(pointer)
        .and_then(serde_json::Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| Error::Auth(format!("refresh response has no token at '{pointer}'")))
}

impl std::fmt::Debug for TransportRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRefresher")
            .field("operation", &self.operation)
            .field("token_pointer", &self.token_pointer)
            .finish()
    }
}
