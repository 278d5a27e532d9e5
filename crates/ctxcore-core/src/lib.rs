//! Wire types for the context orchestration core.
//!
//! Everything here is pure data: messages, content blocks, and the branded
//! id newtypes used to key sessions, checkpoints, and snapshots. None of it
//! knows how to persist itself or talk to a model — that lives in
//! `ctxcore-storage`, `ctxcore-context`, and `ctxcore-llm`.

#![deny(unsafe_code)]

pub mod active_context;
pub mod boundary;
pub mod checkpoint;
pub mod content;
pub mod history;
pub mod ids;
pub mod message;
pub mod snapshot;

pub use active_context::{ActiveContextValidationError, ActiveContextView, TokenBreakdown};
pub use boundary::{scan_for_forbidden_tag, StructuralTag, STRUCTURAL_TAG_KEY};
pub use checkpoint::{Checkpoint, CheckpointLevel, CheckpointRecord};
pub use content::{AssistantContent, ToolResultContent, UserContent};
pub use history::{SessionHistory, SessionMetadata, SessionTotals};
pub use ids::{CheckpointId, MessageId, SessionId, SnapshotId};
pub use message::{Message, MessageRole, ToolResultMessageContent, UserMessageContent};
pub use snapshot::{is_placeholder, Snapshot, SnapshotPurpose, SnapshotState, SNAPSHOT_SCHEMA_VERSION};
