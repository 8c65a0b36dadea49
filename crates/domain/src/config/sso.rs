use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Single sign-on
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identity verification handshake settings.  Whether the handshake runs
/// at all is decided by the host per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoConfig {
    #[serde(default)]
    pub failure_policy: SsoFailurePolicy,

    /// Timeout for the key-generation request.
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            failure_policy: SsoFailurePolicy::default(),
            timeout_ms: d_timeout_ms(),
        }
    }
}

/// What to do when the key-generation endpoint fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SsoFailurePolicy {
    /// Warn and continue with an unverified session.
    #[default]
    Degrade,
    /// Abort the connection attempt.
    Block,
}

fn d_timeout_ms() -> u64 {
    5_000
}
