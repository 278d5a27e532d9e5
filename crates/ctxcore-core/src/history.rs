//! On-disk Session History model (§3 `Session History`, §6 filesystem
//! layout).
//!
//! Session History is the permanent, full-fidelity record: every message
//! ever added, plus a metadata record per compression. It is append-only
//! and is never assembled into a prompt.

use serde::{Deserialize, Serialize};

use crate::boundary::StructuralTag;
use crate::checkpoint::CheckpointRecord;
use crate::ids::SessionId;
use crate::message::Message;

/// Aggregate counters tracked in `metadata.json` (§3 `Session History.metadata.totals`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionTotals {
    /// Number of messages appended so far.
    pub message_count: u64,
    /// Sum of every message's `token_count` observed so far (best-effort;
    /// messages counted before a provider tokenizer was bound may be
    /// heuristic estimates).
    pub token_count: u64,
}

/// The small sidecar record rewritten atomically on every mutation (§4.2:
/// "metadata in a small sidecar rewritten atomically").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Epoch milliseconds of session creation.
    pub start_time: f64,
    /// Epoch milliseconds of the most recent mutation.
    pub last_update: f64,
    /// Running totals.
    pub totals: SessionTotals,
    /// Number of compressions committed so far.
    pub compression_count: u64,
}

impl SessionMetadata {
    /// A fresh metadata record for a session created at `now`.
    #[must_use]
    pub fn new(now: f64) -> Self {
        Self {
            start_time: now,
            last_update: now,
            totals: SessionTotals::default(),
            compression_count: 0,
        }
    }
}

/// A full, in-memory read of one session's on-disk history (§4.2 `load`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionHistory {
    /// The session this history belongs to.
    pub session_id: SessionId,
    /// Every message ever appended, in append order.
    pub messages: Vec<Message>,
    /// Every checkpoint record ever appended, in append order.
    pub checkpoint_records: Vec<CheckpointRecord>,
    /// Aggregate metadata.
    pub metadata: SessionMetadata,
    /// Structural tag (§4.8 boundary guard); always
    /// [`StructuralTag::SessionHistory`].
    #[serde(rename = "__structural_tag", default = "default_tag")]
    pub structural_tag: StructuralTag,
}

fn default_tag() -> StructuralTag {
    StructuralTag::SessionHistory
}

impl SessionHistory {
    /// An empty history for a freshly created session.
    #[must_use]
    pub fn empty(session_id: SessionId, now: f64) -> Self {
        Self {
            session_id,
            messages: Vec::new(),
            checkpoint_records: Vec::new(),
            metadata: SessionMetadata::new(now),
            structural_tag: StructuralTag::SessionHistory,
        }
    }
}

/// A single line of `<root>/sessions/<session_id>/history.log` (§6).
pub type HistoryLogLine = Message;

/// A single line of `<root>/sessions/<session_id>/checkpoints.log` (§6).
pub type CheckpointLogLine = CheckpointRecord;
