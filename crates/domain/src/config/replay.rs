use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reconnect cache
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reconnect cache settings.  Whether caching is used for a given session
/// is decided by the host at session start; these only bound it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Directory for persisted snapshots.  `None` keeps snapshots in memory
    /// only, so nothing survives a process restart.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Snapshots older than this are not resumable and are evicted the next
    /// time the cache is searched.
    #[serde(default = "d_max_age_secs")]
    pub max_age_secs: u64,

    /// Upper bound on cached lines per snapshot; the oldest are dropped first.
    #[serde(default = "d_max_messages")]
    pub max_messages: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            max_age_secs: d_max_age_secs(),
            max_messages: d_max_messages(),
        }
    }
}

fn d_max_age_secs() -> u64 {
    30 * 60
}
fn d_max_messages() -> usize {
    500
}
