//! Session History Store (§4.2).
//!
//! Layout under `<root>/sessions/<session_id>/` (§6):
//! - `history.log` — JSON lines, one [`Message`] per line.
//! - `checkpoints.log` — JSON lines, one [`CheckpointRecord`] per line.
//! - `metadata.json` — rewritten atomically (write-to-temp + rename).
//!
//! Appends are debounced into batches of `≤ batch_size` messages or
//! `≤ batch_interval`, whichever comes first (§4.2); [`FileHistoryStore::flush`]
//! forces an immediate durable write and must be called before acknowledging
//! any snapshot that references the buffered messages.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ctxcore_core::{CheckpointRecord, Message, SessionHistory, SessionId, SessionMetadata};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::errors::{Result, StorageError};

/// Capability surface for Session History persistence (§4.2). A trait so
/// `ctxcore-context`/`ctxcore-orchestrator` can depend on an interface and
/// the concrete filesystem implementation can be swapped for a mock in
/// tests (§9 "dynamic dispatch across storage backends").
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Durably append `message` to `session_id`'s history. May be buffered
    /// internally; see module docs.
    async fn append(&self, session_id: &SessionId, message: Message) -> Result<()>;

    /// Durably append a checkpoint record. Never buffered: always
    /// immediately fsynced.
    async fn record_checkpoint(&self, session_id: &SessionId, record: CheckpointRecord) -> Result<()>;

    /// Force any buffered appends for `session_id` to disk.
    async fn flush(&self, session_id: &SessionId) -> Result<()>;

    /// Full read of a session's history.
    async fn load(&self, session_id: &SessionId) -> Result<SessionHistory>;

    /// List every known session and its metadata.
    async fn list_sessions(&self) -> Result<Vec<(SessionId, SessionMetadata)>>;
}

struct Buffer {
    pending: Vec<Message>,
    opened_at: Instant,
}

impl Buffer {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            opened_at: Instant::now(),
        }
    }
}

/// File-based [`HistoryStore`] implementation.
pub struct FileHistoryStore {
    root: PathBuf,
    batch_size: usize,
    batch_interval: Duration,
    buffers: Mutex<HashMap<SessionId, Buffer>>,
}

impl FileHistoryStore {
    /// A store rooted at `root`, flushing every `batch_size` buffered
    /// messages or every `batch_interval`, whichever comes first.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, batch_size: usize, batch_interval: Duration) -> Self {
        Self {
            root: root.into(),
            batch_size: batch_size.max(1),
            batch_interval,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.root.join("sessions").join(session_id.as_str())
    }

    fn history_log_path(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join("history.log")
    }

    fn checkpoints_log_path(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join("checkpoints.log")
    }

    fn metadata_path(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join("metadata.json")
    }

    async fn ensure_session_dir(&self, session_id: &SessionId) -> Result<()> {
        tokio::fs::create_dir_all(self.session_dir(session_id)).await?;
        Ok(())
    }

    async fn read_metadata(&self, session_id: &SessionId) -> Result<SessionMetadata> {
        let path = self.metadata_path(session_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| StorageError::Corrupt(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(SessionMetadata::new(now_millis()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_metadata_atomic(&self, session_id: &SessionId, metadata: &SessionMetadata) -> Result<()> {
        let final_path = self.metadata_path(session_id);
        let tmp_path = final_path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(metadata)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        tokio::fs::write(&tmp_path, &body).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    async fn append_line(&self, path: &Path, line: &[u8]) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn flush_locked(&self, session_id: &SessionId, buffer: &mut Buffer) -> Result<()> {
        if buffer.pending.is_empty() {
            return Ok(());
        }
        self.ensure_session_dir(session_id).await?;
        let path = self.history_log_path(session_id);
        let mut body = Vec::new();
        for message in &buffer.pending {
            serde_json::to_writer(&mut body, message)
                .map_err(|e| StorageError::Corrupt(e.to_string()))?;
            body.push(b'\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&body).await?;
        file.flush().await?;
        file.sync_all().await?;

        let mut metadata = self.read_metadata(session_id).await?;
        metadata.totals.message_count += buffer.pending.len() as u64;
        for message in &buffer.pending {
            metadata.totals.token_count += u64::from(message.token_count.unwrap_or(0));
        }
        metadata.last_update = now_millis();
        self.write_metadata_atomic(session_id, &metadata).await?;

        debug!(session_id = %session_id, flushed = buffer.pending.len(), "history buffer flushed");
        buffer.pending.clear();
        buffer.opened_at = Instant::now();
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

#[async_trait]
impl HistoryStore for FileHistoryStore {
    #[instrument(skip(self, message), fields(session_id = %session_id))]
    async fn append(&self, session_id: &SessionId, message: Message) -> Result<()> {
        let mut buffers = self.buffers.lock().await;
        let buffer = buffers.entry(session_id.clone()).or_insert_with(Buffer::new);
        buffer.pending.push(message);
        let should_flush = buffer.pending.len() >= self.batch_size
            || buffer.opened_at.elapsed() >= self.batch_interval;
        if should_flush {
            self.flush_locked(session_id, buffer).await?;
        }
        Ok(())
    }

    #[instrument(skip(self, record), fields(session_id = %session_id))]
    async fn record_checkpoint(&self, session_id: &SessionId, record: CheckpointRecord) -> Result<()> {
        self.ensure_session_dir(session_id).await?;
        let line = serde_json::to_vec(&record).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        self.append_line(&self.checkpoints_log_path(session_id), &line)
            .await?;
        let mut metadata = self.read_metadata(session_id).await?;
        metadata.compression_count += 1;
        metadata.last_update = now_millis();
        self.write_metadata_atomic(session_id, &metadata).await
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn flush(&self, session_id: &SessionId) -> Result<()> {
        let mut buffers = self.buffers.lock().await;
        if let Some(buffer) = buffers.get_mut(session_id) {
            self.flush_locked(session_id, buffer).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn load(&self, session_id: &SessionId) -> Result<SessionHistory> {
        self.flush(session_id).await?;

        let history_path = self.history_log_path(session_id);
        let messages = match tokio::fs::read_to_string(&history_path).await {
            Ok(raw) => parse_jsonl(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let checkpoints_path = self.checkpoints_log_path(session_id);
        let checkpoint_records = match tokio::fs::read_to_string(&checkpoints_path).await {
            Ok(raw) => parse_jsonl(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let metadata = self.read_metadata(session_id).await?;

        Ok(SessionHistory {
            session_id: session_id.clone(),
            messages,
            checkpoint_records,
            metadata,
            structural_tag: ctxcore_core::StructuralTag::SessionHistory,
        })
    }

    #[instrument(skip(self))]
    async fn list_sessions(&self) -> Result<Vec<(SessionId, SessionMetadata)>> {
        let sessions_dir = self.root.join("sessions");
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&sessions_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let session_id = SessionId::from(name);
            let metadata = self.read_metadata(&session_id).await?;
            out.push((session_id, metadata));
        }
        Ok(out)
    }
}

fn parse_jsonl<T: serde::de::DeserializeOwned>(raw: &str) -> Result<Vec<T>> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| StorageError::Corrupt(e.to_string())))
        .collect()
}
