//! Snapshot expiry: decides when a cached session is too old to resume.
//!
//! Expiry is evaluated lazily whenever the cache is searched for a
//! resumable snapshot; there is no background sweep.

use chrono::{DateTime, Duration, Utc};

use crate::snapshot::ReplaySnapshot;

/// Reason a snapshot was evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictReason {
    Expired { idle_secs: i64 },
}

impl std::fmt::Display for EvictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired { idle_secs } => write!(f, "expired (idle {idle_secs}s)"),
        }
    }
}

/// Age-based expiry measured from the snapshot's last update.
#[derive(Debug, Clone, Copy)]
pub struct ExpiryPolicy {
    max_age: Duration,
}

impl ExpiryPolicy {
    pub fn new(max_age_secs: u64) -> Self {
        let secs = i64::try_from(max_age_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000);
        Self {
            max_age: Duration::seconds(secs),
        }
    }

    /// Returns `Some(reason)` if the snapshot should no longer be resumed.
    pub fn should_evict(
        &self,
        snapshot: &ReplaySnapshot,
        now: DateTime<Utc>,
    ) -> Option<EvictReason> {
        let idle = now.signed_duration_since(snapshot.updated_at);
        if idle >= self.max_age {
            Some(EvictReason::Expired {
                idle_secs: idle.num_seconds(),
            })
        } else {
            None
        }
    }
}
