//! Checkpoint summaries (§3 `Checkpoint Summary`).
//!
//! A [`Checkpoint`] replaces a span of messages with an LLM-written
//! summary. It is created by the Compressor and never mutated in place;
//! re-compression retires one checkpoint and produces a new one with an
//! incremented `compression_generation`.

use serde::{Deserialize, Serialize};

use crate::ids::{CheckpointId, MessageId};

/// Compression level. 3 = detailed (youngest span), 2 = moderate, 1 =
/// compact (oldest, possibly merged from multiple level-1s).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum CheckpointLevel {
    /// Compact: oldest, most aggressively summarized.
    Compact = 1,
    /// Moderate: merged from level-3 checkpoints.
    Moderate = 2,
    /// Detailed: summarizes raw recent messages directly.
    Detailed = 3,
}

impl CheckpointLevel {
    /// One level older (saturating at [`CheckpointLevel::Compact`]).
    #[must_use]
    pub fn older(self) -> Self {
        match self {
            Self::Detailed => Self::Moderate,
            Self::Moderate | Self::Compact => Self::Compact,
        }
    }
}

/// A single checkpoint summary (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique id, fresh on every (re-)compression.
    pub id: CheckpointId,
    /// Epoch milliseconds at creation.
    pub created_at: f64,
    /// The LLM-produced summary text.
    pub summary_text: String,
    /// Ids of every message this checkpoint (transitively) summarizes.
    pub origin_message_ids: Vec<MessageId>,
    /// Token count of `summary_text`, from the Token Counter.
    pub token_count: u32,
    /// Compression level.
    pub level: CheckpointLevel,
    /// Incremented each time this lineage is re-compressed.
    pub compression_generation: u32,
    /// Identifier of the model that produced this summary.
    pub model_used: String,
    /// Epoch milliseconds of the last re-compression, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_compressed_at: Option<f64>,
}

/// Metadata recorded in Session History per compression (§3
/// `Session History.checkpoint_records[]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// The checkpoint this record describes.
    pub checkpoint_id: CheckpointId,
    /// Ids of the messages/checkpoints replaced by this compression.
    pub origin_message_ids: Vec<MessageId>,
    /// Combined token size of the replaced span, before compression.
    pub original_tokens: u32,
    /// Token size of the resulting summary.
    pub compressed_tokens: u32,
    /// `compressed_tokens / original_tokens`.
    pub ratio: f64,
    /// Level produced by this compression.
    pub level: CheckpointLevel,
    /// Epoch milliseconds when this compression committed.
    pub created_at: f64,
}

impl CheckpointRecord {
    /// Build a record from a committed [`Checkpoint`] and the token size of
    /// the span it replaced.
    #[must_use]
    pub fn new(checkpoint: &Checkpoint, original_tokens: u32) -> Self {
        let compressed_tokens = checkpoint.token_count;
        let ratio = if original_tokens == 0 {
            0.0
        } else {
            f64::from(compressed_tokens) / f64::from(original_tokens)
        };
        Self {
            checkpoint_id: checkpoint.id.clone(),
            origin_message_ids: checkpoint.origin_message_ids.clone(),
            original_tokens,
            compressed_tokens,
            ratio,
            level: checkpoint.level,
            created_at: checkpoint.created_at,
        }
    }
}
