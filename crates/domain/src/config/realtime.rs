use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Realtime socket
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persistent socket connection and its reconnect budget.
///
/// Delays are expressed in milliseconds so the TOML stays flat; the
/// realtime crate converts them into its back-off policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "d_realtime_endpoint")]
    pub endpoint: String,
    /// Connection attempts before the status turns terminal.
    #[serde(default = "d_5")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "d_1000")]
    pub initial_delay_ms: u64,
    #[serde(default = "d_30000")]
    pub max_delay_ms: u64,
    #[serde(default = "d_2_0")]
    pub backoff_factor: f64,
    /// Upper bound of the random component added to every delay.
    #[serde(default = "d_1000")]
    pub jitter_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: d_realtime_endpoint(),
            max_reconnect_attempts: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            jitter_ms: 1_000,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_realtime_endpoint() -> String {
    "ws://127.0.0.1:4000/realtime".into()
}
fn d_5() -> u32 {
    5
}
fn d_1000() -> u64 {
    1_000
}
fn d_30000() -> u64 {
    30_000
}
fn d_2_0() -> f64 {
    2.0
}
