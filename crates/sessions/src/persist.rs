//! Durable snapshot files.
//!
//! One `<token>.json` file per snapshot under the state directory.  Writes
//! go through a temp file and an atomic rename so a crash mid-write leaves
//! either the previous snapshot or the new one, never a torn file.
//!
//! [`SnapshotWriter`] owns a background task that applies write/remove
//! operations in submission order, so callers can enqueue after every chat
//! line without waiting on disk I/O.

use std::io::Write;
use std::path::{Path, PathBuf};

use lc_domain::error::{Error, Result};
use lc_domain::trace::TraceEvent;
use tokio::sync::{mpsc, oneshot};

use crate::snapshot::ReplaySnapshot;

enum WriteOp {
    Write(Box<ReplaySnapshot>),
    Remove(String),
    Clear,
    Flush(oneshot::Sender<()>),
}

/// Handle to the background writer task.
#[derive(Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl SnapshotWriter {
    /// Spawn the writer on the current Tokio runtime.
    pub fn spawn(dir: &Path) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Other(format!("replay writer needs a tokio runtime: {e}")))?;

        std::fs::create_dir_all(dir)?;
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();
        let task_dir = dir.to_path_buf();

        handle.spawn(async move {
            while let Some(op) = rx.recv().await {
                if let WriteOp::Flush(done) = op {
                    let _ = done.send(());
                    continue;
                }
                let dir = task_dir.clone();
                let result = tokio::task::spawn_blocking(move || apply(&dir, op))
                    .await
                    .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")));
                if let Err(e) | Ok(Err(e)) = result {
                    tracing::warn!(error = %e, "replay snapshot write failed");
                }
            }
            tracing::debug!("replay writer stopped");
        });

        Ok(Self {
            dir: dir.to_path_buf(),
            tx,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, snapshot: ReplaySnapshot) {
        self.send(WriteOp::Write(Box::new(snapshot)));
    }

    pub fn remove(&self, session_token: &str) {
        self.send(WriteOp::Remove(session_token.to_owned()));
    }

    pub fn clear(&self) {
        self.send(WriteOp::Clear);
    }

    /// Resolves once every operation enqueued before this call is on disk.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(WriteOp::Flush(done_tx));
        let _ = done_rx.await;
    }

    fn send(&self, op: WriteOp) {
        if self.tx.send(op).is_err() {
            tracing::warn!(dir = %self.dir.display(), "replay writer is gone, dropping operation");
        }
    }
}

fn apply(dir: &Path, op: WriteOp) -> Result<()> {
    match op {
        WriteOp::Write(snapshot) => write_snapshot(dir, &snapshot),
        WriteOp::Remove(token) => remove_file(&snapshot_path(dir, &token)),
        WriteOp::Clear => {
            for path in snapshot_files(dir)? {
                remove_file(&path)?;
            }
            Ok(())
        }
        WriteOp::Flush(_) => Ok(()),
    }
}

fn write_snapshot(dir: &Path, snapshot: &ReplaySnapshot) -> Result<()> {
    let json = serde_json::to_vec(snapshot)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(snapshot_path(dir, &snapshot.session_token))
        .map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn remove_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// File path for a session token.  The token is hex-encoded, so distinct
/// tokens get distinct files and none can escape the state directory.
pub fn snapshot_path(dir: &Path, session_token: &str) -> PathBuf {
    dir.join(format!("{}.json", hex::encode(session_token)))
}

fn snapshot_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        }
    }
    Ok(files)
}

/// Read every snapshot file in `dir`.
///
/// Files that fail to parse are logged, deleted, and skipped: losing
/// reconnect continuity is recoverable, refusing to start is not.
pub fn load_all(dir: &Path) -> Result<Vec<ReplaySnapshot>> {
    let mut snapshots = Vec::new();
    for path in snapshot_files(dir)? {
        let parsed = std::fs::read(&path)
            .map_err(Error::Io)
            .and_then(|raw| serde_json::from_slice::<ReplaySnapshot>(&raw).map_err(Error::Json));
        match parsed {
            Ok(snapshot) if snapshot.is_consistent() => snapshots.push(snapshot),
            Ok(snapshot) => {
                report_corrupt(&path, "acknowledged sequence beyond cached lines");
                tracing::debug!(session_token = %snapshot.session_token, "dropping inconsistent snapshot");
            }
            Err(e) => report_corrupt(&path, &e.to_string()),
        }
    }
    Ok(snapshots)
}

fn report_corrupt(path: &Path, error: &str) {
    TraceEvent::ReplayCorrupt {
        path: path.display().to_string(),
        error: error.to_owned(),
    }
    .emit();
    tracing::warn!(path = %path.display(), error, "discarding corrupt replay snapshot");
    if let Err(e) = remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "could not delete corrupt snapshot");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_cannot_escape_the_directory() {
        let dir = Path::new("/state");
        let path = snapshot_path(dir, "../../etc/passwd");
        assert_eq!(path.parent(), Some(dir));
        assert_eq!(snapshot_path(dir, "t1"), PathBuf::from("/state/7431.json"));
    }

    #[test]
    fn similar_tokens_get_distinct_files() {
        let dir = Path::new("/state");
        assert_ne!(snapshot_path(dir, "a.b"), snapshot_path(dir, "a_b"));
        assert_ne!(snapshot_path(dir, "a/b"), snapshot_path(dir, "a_b"));
    }
}
