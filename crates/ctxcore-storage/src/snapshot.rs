//! Snapshot Store (§4.3): bounded-retention, immutable, on-disk capture of
//! session state for rollback/recovery.
//!
//! Layout: `<root>/sessions/<session_id>/snapshots/<snapshot_id>.json`, one
//! file per snapshot, written atomically (temp + rename) and never mutated
//! after.
//!
//! Callers must have flushed the Session History Store for `session_id`
//! before calling [`SnapshotStore::create`], so the snapshot's captured
//! state never outruns what Session History durably has on disk.

use std::path::PathBuf;

use async_trait::async_trait;
use ctxcore_core::{Snapshot, SnapshotId, SnapshotPurpose, SnapshotState, SessionId};
use tracing::{info, instrument};

use crate::errors::{Result, StorageError};

/// A chronological snapshot summary (§4.3 `list`).
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotSummary {
    /// The snapshot's id.
    pub id: SnapshotId,
    /// When it was created.
    pub created_at: f64,
    /// Why it was created.
    pub purpose: SnapshotPurpose,
}

/// Retention policy applied by [`SnapshotStore::prune`] (§3: "keep the most
/// recent N (default 5) per session; purpose=emergency entries count
/// separately and are retained longer").
#[derive(Clone, Copy, Debug)]
pub struct RetentionPolicy {
    /// Max non-emergency snapshots retained.
    pub max_retained: usize,
    /// Max emergency snapshots retained (independent budget).
    pub max_emergency_retained: usize,
}

impl RetentionPolicy {
    /// The §3 default: 5 non-emergency, a generous 20 emergency budget
    /// (emergency snapshots are rare and valuable for postmortems).
    #[must_use]
    pub fn default_policy() -> Self {
        Self {
            max_retained: 5,
            max_emergency_retained: 20,
        }
    }
}

/// Capability surface for Snapshot persistence (§4.3).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Write a single atomic snapshot file; returns its fresh id.
    async fn create(
        &self,
        session_id: &SessionId,
        state: SnapshotState,
        purpose: SnapshotPurpose,
    ) -> Result<SnapshotId>;

    /// Chronological, newest first.
    async fn list(&self, session_id: &SessionId) -> Result<Vec<SnapshotSummary>>;

    /// Load one snapshot in full.
    async fn get(&self, session_id: &SessionId, snapshot_id: &SnapshotId) -> Result<Snapshot>;

    /// Load a snapshot for rollback. Identical to [`SnapshotStore::get`];
    /// does not itself mutate any Active Context (§4.3).
    async fn rollback(&self, session_id: &SessionId, snapshot_id: &SnapshotId) -> Result<Snapshot> {
        self.get(session_id, snapshot_id).await
    }

    /// Apply `policy`, deleting snapshots beyond the retained window.
    async fn prune(&self, session_id: &SessionId, policy: RetentionPolicy) -> Result<()>;
}

/// File-based [`SnapshotStore`] implementation.
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    /// A store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn snapshots_dir(&self, session_id: &SessionId) -> PathBuf {
        self.root
            .join("sessions")
            .join(session_id.as_str())
            .join("snapshots")
    }

    fn snapshot_path(&self, session_id: &SessionId, snapshot_id: &SnapshotId) -> PathBuf {
        self.snapshots_dir(session_id)
            .join(format!("{}.json", snapshot_id.as_str()))
    }

    async fn read_snapshot(&self, path: &std::path::Path) -> Result<Snapshot> {
        let raw = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&raw)
            .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    #[instrument(skip(self, state), fields(session_id = %session_id, ?purpose))]
    async fn create(
        &self,
        session_id: &SessionId,
        state: SnapshotState,
        purpose: SnapshotPurpose,
    ) -> Result<SnapshotId> {
        let id = SnapshotId::new();
        let created_at = now_millis();
        let snapshot = Snapshot::new(id.clone(), session_id.clone(), created_at, purpose, state)
            .map_err(StorageError::InvalidSnapshot)?;

        let dir = self.snapshots_dir(session_id);
        tokio::fs::create_dir_all(&dir).await?;

        let final_path = self.snapshot_path(session_id, &id);
        let tmp_path = final_path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        tokio::fs::write(&tmp_path, &body).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        info!(session_id = %session_id, snapshot_id = %id, "snapshot created");
        Ok(id)
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn list(&self, session_id: &SessionId) -> Result<Vec<SnapshotSummary>> {
        let dir = self.snapshots_dir(session_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let snapshot = self.read_snapshot(&entry.path()).await?;
            summaries.push(SnapshotSummary {
                id: snapshot.id,
                created_at: snapshot.created_at,
                purpose: snapshot.purpose,
            });
        }
        summaries.sort_by(|a, b| b.created_at.partial_cmp(&a.created_at).unwrap());
        Ok(summaries)
    }

    #[instrument(skip(self), fields(session_id = %session_id, snapshot_id = %snapshot_id))]
    async fn get(&self, session_id: &SessionId, snapshot_id: &SnapshotId) -> Result<Snapshot> {
        let path = self.snapshot_path(session_id, snapshot_id);
        if !path.exists() {
            return Err(StorageError::SnapshotNotFound(snapshot_id.to_string()));
        }
        self.read_snapshot(&path).await
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn prune(&self, session_id: &SessionId, policy: RetentionPolicy) -> Result<()> {
        let mut summaries = self.list(session_id).await?;
        summaries.sort_by(|a, b| b.created_at.partial_cmp(&a.created_at).unwrap());

        let (emergency, regular): (Vec<_>, Vec<_>) = summaries
            .into_iter()
            .partition(|s| matches!(s.purpose, SnapshotPurpose::Emergency));

        let mut to_delete = Vec::new();
        to_delete.extend(regular.into_iter().skip(policy.max_retained));
        to_delete.extend(emergency.into_iter().skip(policy.max_emergency_retained));

        for summary in to_delete {
            let path = self.snapshot_path(session_id, &summary.id);
            tokio::fs::remove_file(&path).await?;
            info!(session_id = %session_id, snapshot_id = %summary.id, "snapshot pruned");
        }
        Ok(())
    }
}

fn now_millis() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
        * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (FileSnapshotStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        (store, dir)
    }

    fn sample_state() -> SnapshotState {
        SnapshotState {
            messages: vec![ctxcore_core::Message::user("hi", 0.0)],
            checkpoints: vec![],
            goals: None,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let (store, _dir) = store();
        let session_id = SessionId::new();
        let id = store
            .create(&session_id, sample_state(), SnapshotPurpose::Recovery)
            .await
            .unwrap();
        let snapshot = store.get(&session_id, &id).await.unwrap();
        assert_eq!(snapshot.id, id);
        assert_eq!(snapshot.purpose, SnapshotPurpose::Recovery);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (store, _dir) = store();
        let session_id = SessionId::new();
        let first = store
            .create(&session_id, sample_state(), SnapshotPurpose::Recovery)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = store
            .create(&session_id, sample_state(), SnapshotPurpose::Recovery)
            .await
            .unwrap();
        let list = store.list(&session_id).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second);
        assert_eq!(list[1].id, first);
    }

    #[tokio::test]
    async fn rollback_does_not_delete_other_snapshots() {
        let (store, _dir) = store();
        let session_id = SessionId::new();
        let s1 = store
            .create(&session_id, sample_state(), SnapshotPurpose::Recovery)
            .await
            .unwrap();
        let s2 = store
            .create(&session_id, sample_state(), SnapshotPurpose::Rollback)
            .await
            .unwrap();
        let s3 = store
            .create(&session_id, sample_state(), SnapshotPurpose::Recovery)
            .await
            .unwrap();
        let _ = store.rollback(&session_id, &s2).await.unwrap();
        let list = store.list(&session_id).await.unwrap();
        let ids: Vec<_> = list.into_iter().map(|s| s.id).collect();
        assert!(ids.contains(&s1));
        assert!(ids.contains(&s2));
        assert!(ids.contains(&s3));
    }

    #[tokio::test]
    async fn prune_keeps_most_recent_n() {
        let (store, _dir) = store();
        let session_id = SessionId::new();
        for _ in 0..7 {
            store
                .create(&session_id, sample_state(), SnapshotPurpose::Recovery)
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        store
            .prune(
                &session_id,
                RetentionPolicy {
                    max_retained: 5,
                    max_emergency_retained: 20,
                },
            )
            .await
            .unwrap();
        let list = store.list(&session_id).await.unwrap();
        assert_eq!(list.len(), 5);
    }

    #[tokio::test]
    async fn prune_retains_emergency_snapshots_separately() {
        let (store, _dir) = store();
        let session_id = SessionId::new();
        for _ in 0..6 {
            store
                .create(&session_id, sample_state(), SnapshotPurpose::Recovery)
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        store
            .create(&session_id, sample_state(), SnapshotPurpose::Emergency)
            .await
            .unwrap();
        store
            .prune(
                &session_id,
                RetentionPolicy {
                    max_retained: 5,
                    max_emergency_retained: 20,
                },
            )
            .await
            .unwrap();
        let list = store.list(&session_id).await.unwrap();
        assert_eq!(list.len(), 6, "5 regular retained + 1 emergency retained");
        assert!(list.iter().any(|s| s.purpose == SnapshotPurpose::Emergency));
    }

    #[tokio::test]
    async fn get_unknown_snapshot_errors() {
        let (store, _dir) = store();
        let session_id = SessionId::new();
        let err = store.get(&session_id, &SnapshotId::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::SnapshotNotFound(_)));
    }

    #[tokio::test]
    async fn placeholder_session_id_is_rejected() {
        let (store, _dir) = store();
        let session_id = SessionId::from("default");
        let err = store
            .create(&session_id, sample_state(), SnapshotPurpose::Recovery)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidSnapshot(_)));
    }
}
