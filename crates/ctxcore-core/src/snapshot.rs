//! On-disk Snapshot model (§3 `Snapshot`, §6 snapshot file schema).
//!
//! Snapshots are append-created and delete-only: nothing in this module
//! offers a way to mutate one in place.

use serde::{Deserialize, Serialize};

use crate::boundary::StructuralTag;
use crate::checkpoint::Checkpoint;
use crate::ids::{SessionId, SnapshotId};
use crate::message::Message;

/// Current snapshot file schema version (§6: "breaking changes require a
/// `schema_version` bump").
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Why a snapshot was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPurpose {
    /// Routine recovery point.
    Recovery,
    /// Explicit user-requested rollback point.
    Rollback,
    /// Created by the emergency-compaction protocol (§7).
    Emergency,
}

/// The captured conversational state inside a [`Snapshot`].
///
/// Carries full state (`messages[]` plus `checkpoints[]`), per §9's
/// mandate that snapshots be sufficient for faithful rollback. No compact
/// variant is implemented (see `DESIGN.md`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    /// Full-fidelity messages at the time of the snapshot.
    pub messages: Vec<Message>,
    /// Live checkpoints at the time of the snapshot.
    pub checkpoints: Vec<Checkpoint>,
    /// Freeform session goals, if the caller tracks any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<serde_json::Value>,
    /// Freeform metadata attached by the caller.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// An immutable, on-disk capture of session state (§3, §6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique id.
    pub id: SnapshotId,
    /// Owning session.
    pub session_id: SessionId,
    /// Epoch milliseconds.
    pub created_at: f64,
    /// Why this snapshot exists.
    pub purpose: SnapshotPurpose,
    /// The captured state.
    pub state: SnapshotState,
    /// Schema version, for forward-compatible reads.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Structural tag (§4.8 boundary guard); always [`StructuralTag::Snapshot`].
    #[serde(rename = "__structural_tag", default = "default_tag")]
    pub structural_tag: StructuralTag,
}

fn default_schema_version() -> u32 {
    SNAPSHOT_SCHEMA_VERSION
}

fn default_tag() -> StructuralTag {
    StructuralTag::Snapshot
}

impl Snapshot {
    /// Construct a new snapshot. `session_id` and `model_used` (embedded in
    /// `state.metadata` by the caller) must be real values — placeholders
    /// like `"default"`/`"unknown"` are forbidden by §9 and rejected here.
    ///
    /// # Errors
    /// Returns an error message if `session_id` looks like a placeholder.
    pub fn new(
        id: SnapshotId,
        session_id: SessionId,
        created_at: f64,
        purpose: SnapshotPurpose,
        state: SnapshotState,
    ) -> Result<Self, String> {
        if is_placeholder(session_id.as_str()) {
            return Err(format!(
                "refusing to construct Snapshot with placeholder session_id {:?}",
                session_id.as_str()
            ));
        }
        Ok(Self {
            id,
            session_id,
            created_at,
            purpose,
            state,
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            structural_tag: StructuralTag::Snapshot,
        })
    }
}

/// Reject the well-known placeholder values called out in §9.
#[must_use]
pub fn is_placeholder(value: &str) -> bool {
    matches!(value, "default" | "unknown" | "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> SnapshotState {
        SnapshotState {
            messages: vec![Message::user("hi", 0.0)],
            checkpoints: vec![],
            goals: None,
            metadata: serde_json::json!({"model_used": "claude-test"}),
        }
    }

    #[test]
    fn construction_rejects_placeholder_session_id() {
        let err = Snapshot::new(
            SnapshotId::new(),
            SessionId::from("default"),
            0.0,
            SnapshotPurpose::Recovery,
            sample_state(),
        )
        .unwrap_err();
        assert!(err.contains("placeholder"));
    }

    #[test]
    fn construction_rejects_empty_session_id() {
        let err = Snapshot::new(
            SnapshotId::new(),
            SessionId::from(""),
            0.0,
            SnapshotPurpose::Recovery,
            sample_state(),
        )
        .unwrap_err();
        assert!(err.contains("placeholder"));
    }

    #[test]
    fn construction_accepts_real_session_id() {
        let snapshot = Snapshot::new(
            SnapshotId::new(),
            SessionId::new(),
            0.0,
            SnapshotPurpose::Emergency,
            sample_state(),
        )
        .unwrap();
        assert_eq!(snapshot.schema_version, SNAPSHOT_SCHEMA_VERSION);
        assert_eq!(snapshot.structural_tag, StructuralTag::Snapshot);
    }

    #[test]
    fn serialized_snapshot_carries_structural_tag() {
        let snapshot = Snapshot::new(
            SnapshotId::new(),
            SessionId::new(),
            0.0,
            SnapshotPurpose::Rollback,
            sample_state(),
        )
        .unwrap();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["__structural_tag"], "snapshot");
        assert_eq!(
            crate::boundary::scan_for_forbidden_tag(&json),
            Some(StructuralTag::Snapshot)
        );
    }
}
