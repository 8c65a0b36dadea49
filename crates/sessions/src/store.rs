//! Reconnect cache.
//!
//! Holds one [`ReplaySnapshot`] per session token in memory.  When a state
//! directory is configured every change is also handed to a
//! [`SnapshotWriter`] so the cache survives a process restart.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use lc_domain::config::ReplayConfig;
use lc_domain::error::Result;
use lc_domain::trace::TraceEvent;
use lc_domain::Destination;

use crate::expiry::ExpiryPolicy;
use crate::persist::{self, SnapshotWriter};
use crate::snapshot::ReplaySnapshot;

/// Bounded store of resumable session snapshots.
pub struct ReplayCache {
    snapshots: RwLock<HashMap<String, ReplaySnapshot>>,
    expiry: ExpiryPolicy,
    max_messages: usize,
    writer: Option<SnapshotWriter>,
}

impl ReplayCache {
    /// A cache that never touches disk.
    pub fn in_memory(config: &ReplayConfig) -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            expiry: ExpiryPolicy::new(config.max_age_secs),
            max_messages: config.max_messages,
            writer: None,
        }
    }

    /// Open the cache described by `config`.
    ///
    /// With a `state_dir`, previously persisted snapshots are loaded and a
    /// background writer is started (requires a Tokio runtime).  Corrupt
    /// files are dropped rather than failing the open.
    pub fn open(config: &ReplayConfig) -> Result<Self> {
        let Some(dir) = config.state_dir.as_deref() else {
            return Ok(Self::in_memory(config));
        };

        let writer = SnapshotWriter::spawn(dir)?;
        let loaded = persist::load_all(dir)?;

        tracing::info!(
            snapshots = loaded.len(),
            path = %dir.display(),
            "replay cache loaded"
        );

        let snapshots = loaded
            .into_iter()
            .map(|s| (s.session_token.clone(), s))
            .collect();

        Ok(Self {
            snapshots: RwLock::new(snapshots),
            expiry: ExpiryPolicy::new(config.max_age_secs),
            max_messages: config.max_messages,
            writer: Some(writer),
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.writer.is_some()
    }

    /// Insert or overwrite the snapshot for its session token.
    ///
    /// Returns as soon as the in-memory copy is updated; the disk write is
    /// queued.
    pub fn store(&self, snapshot: &ReplaySnapshot) {
        let mut snapshot = snapshot.clone();
        snapshot.trim_to(self.max_messages);

        TraceEvent::ReplayStored {
            session_token: snapshot.session_token.clone(),
            messages: snapshot.messages.len(),
            last_acked_seq: snapshot.last_acked_seq,
        }
        .emit();

        if let Some(writer) = &self.writer {
            writer.write(snapshot.clone());
        }
        self.snapshots
            .write()
            .insert(snapshot.session_token.clone(), snapshot);
    }

    /// Most recently updated, unexpired snapshot addressed to `destination`.
    ///
    /// Expired snapshots found along the way are evicted.  Nothing is
    /// removed on a successful read.
    pub fn load_resumable(&self, destination: &Destination) -> Option<ReplaySnapshot> {
        self.load_resumable_at(destination, Utc::now())
    }

    /// [`load_resumable`](Self::load_resumable) against an explicit clock.
    pub fn load_resumable_at(
        &self,
        destination: &Destination,
        now: DateTime<Utc>,
    ) -> Option<ReplaySnapshot> {
        let mut snapshots = self.snapshots.write();

        let expired: Vec<(String, String)> = snapshots
            .values()
            .filter_map(|s| {
                self.expiry
                    .should_evict(s, now)
                    .map(|reason| (s.session_token.clone(), reason.to_string()))
            })
            .collect();

        for (token, reason) in expired {
            snapshots.remove(&token);
            if let Some(writer) = &self.writer {
                writer.remove(&token);
            }
            TraceEvent::ReplayEvicted {
                session_token: token,
                reason,
            }
            .emit();
        }

        snapshots
            .values()
            .filter(|s| &s.destination == destination)
            .max_by_key(|s| s.updated_at)
            .cloned()
    }

    /// Look up a snapshot by token without any expiry check.
    pub fn get(&self, session_token: &str) -> Option<ReplaySnapshot> {
        self.snapshots.read().get(session_token).cloned()
    }

    /// Remove the snapshot for a session that ended cleanly.
    pub fn discard(&self, session_token: &str) {
        let removed = self.snapshots.write().remove(session_token).is_some();
        if let Some(writer) = &self.writer {
            writer.remove(session_token);
        }
        if removed {
            tracing::debug!(session_token, "replay snapshot discarded");
        }
    }

    /// Remove every snapshot.
    pub fn clear(&self) {
        self.snapshots.write().clear();
        if let Some(writer) = &self.writer {
            writer.clear();
        }
    }

    /// Wait until all queued disk operations have completed.  A no-op for
    /// in-memory caches.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}
