use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RPC channel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// URL the RPC envelopes are POSTed to.
    #[serde(default = "d_rpc_endpoint")]
    pub endpoint: String,
    /// Operation name of the token refresh call.  This request never
    /// carries the bearer token and never triggers a nested refresh.
    #[serde(default = "d_refresh_operation")]
    pub refresh_operation: String,
    /// JSON pointer locating the new access token inside the refresh
    /// response `data`.
    #[serde(default = "d_refresh_token_pointer")]
    pub refresh_token_pointer: String,
    /// Unauthenticated landing route used after an unrecoverable refresh
    /// failure.
    #[serde(default = "d_login_route")]
    pub login_route: String,
    #[serde(default = "d_15000")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: d_rpc_endpoint(),
            refresh_operation: d_refresh_operation(),
            refresh_token_pointer: d_refresh_token_pointer(),
            login_route: d_login_route(),
            timeout_ms: 15_000,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_rpc_endpoint() -> String {
    "http://127.0.0.1:4000/graphql".into()
}
fn d_refresh_operation() -> String {
    "refreshToken".into()
}
fn d_refresh_token_pointer() -> String {
    "/refreshToken/accessToken".into()
}
fn d_login_route() -> String {
    "/login".into()
}
fn d_15000() -> u64 {
    15_000
}
