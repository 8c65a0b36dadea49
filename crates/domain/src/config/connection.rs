use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat server connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the engine reaches the chat server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket endpoint of the chat server (`ws://` or `wss://`).
    #[serde(default = "d_server_url")]
    pub server_url: String,

    /// Time allowed between opening the socket and receiving
    /// `session_welcome` (or `agents_unavailable`).
    #[serde(default = "d_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Interval between keep-alive pings while connected.
    #[serde(default = "d_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Inbound frames larger than this are dropped before parsing.
    #[serde(default = "d_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Retry policy for establishing the socket.  This is the transport's
    /// retry loop; the session state machine itself never retries.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_url: d_server_url(),
            connect_timeout_ms: d_connect_timeout_ms(),
            heartbeat_interval_secs: d_heartbeat_interval_secs(),
            max_frame_bytes: d_max_frame_bytes(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Jittered exponential back-off for socket establishment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "d_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "d_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "d_backoff_factor")]
    pub backoff_factor: f64,
    /// Attempts before the transport reports failure.  `0` means a single
    /// attempt with no retries.
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: d_initial_delay_ms(),
            max_delay_ms: d_max_delay_ms(),
            backoff_factor: d_backoff_factor(),
            max_attempts: d_max_attempts(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_server_url() -> String {
    "ws://localhost:3410/v1/chat/ws".into()
}
fn d_connect_timeout_ms() -> u64 {
    10_000
}
fn d_heartbeat_interval_secs() -> u64 {
    30
}
fn d_max_frame_bytes() -> usize {
    256 * 1024
}
fn d_initial_delay_ms() -> u64 {
    1_000
}
fn d_max_delay_ms() -> u64 {
    60_000
}
fn d_backoff_factor() -> f64 {
    2.0
}
fn d_max_attempts() -> u32 {
    3
}
