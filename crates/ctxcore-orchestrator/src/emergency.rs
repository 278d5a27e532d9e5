//! Emergency compaction protocol (§7): the four-step cascade run when a
//! mutation cannot be brought under `tier.hard_cap` by ordinary compression.
//!
//! Each step commits atomically before the next is attempted (§7: "Each
//! step updates the Active Context atomically before the next is
//! attempted"), so a crash mid-cascade never leaves a half-applied step.

use std::sync::Arc;

use ctxcore_core::{SnapshotPurpose, SnapshotState};
use ctxcore_storage::SnapshotStore;
use tracing::{info, instrument, warn};

use crate::errors::{OrchestratorError, Result};
use crate::session::SessionState;

/// Run the §7 cascade against an already-locked [`SessionState`]. Returns
/// the id of the emergency snapshot created in step (a).
#[instrument(skip(state, snapshots), fields(session_id = %session_id, before_total = state.manager.token_count().total))]
pub(crate) async fn run_emergency_compaction(
    state: &mut SessionState,
    session_id: &ctxcore_core::SessionId,
    snapshots: &Arc<dyn SnapshotStore>,
    now: f64,
) -> Result<ctxcore_core::SnapshotId> {
    // (a) snapshot first, so the pre-cascade state is always recoverable.
    let view = state.manager.snapshot_view();
    let snapshot_state = SnapshotState {
        messages: view.recent_messages.clone(),
        checkpoints: view.checkpoints.clone(),
        goals: None,
        metadata: serde_json::json!({"model_used": state.model_id, "reason": "emergency_compaction"}),
    };
    let snapshot_id = snapshots
        .create(session_id, snapshot_state, SnapshotPurpose::Emergency)
        .await?;
    warn!(session_id = %session_id, snapshot_id = %snapshot_id, "emergency snapshot created");

    if state.manager.token_count().total <= state.tier.hard_cap {
        return Ok(snapshot_id);
    }

    // (b) re-run compression one level deeper than normal: loop the
    // ordinary compressor until either under hard_cap or no span remains.
    while state.manager.token_count().total > state.tier.hard_cap {
        match state.compressor.compress(&mut state.manager, &state.tier, &state.model_id, now).await {
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    if state.manager.token_count().total <= state.tier.hard_cap {
        info!(session_id = %session_id, "emergency recompression brought total under hard_cap");
        return Ok(snapshot_id);
    }

    // (c) drop oldest checkpoints one at a time.
    while state.manager.token_count().total > state.tier.hard_cap && !state.manager.checkpoints().is_empty() {
        drop_oldest_checkpoint(state).await;
    }
    if state.manager.token_count().total <= state.tier.hard_cap {
        warn!(session_id = %session_id, "emergency path dropped checkpoints to recover budget");
        return Ok(snapshot_id);
    }

    // (d) clear all checkpoints and trim recent_messages to recent_keep_min.
    trim_to_recent_keep_min(state).await;
    if state.manager.token_count().total > state.tier.hard_cap {
        return Err(OrchestratorError::BudgetExceeded(
            "emergency compaction exhausted every recovery step and is still over hard_cap".into(),
        ));
    }
    warn!(session_id = %session_id, "emergency path trimmed recent_messages to recent_keep_min");
    Ok(snapshot_id)
}

/// Rebuild the manager with its oldest checkpoint removed, keeping the rest
/// of the Active Context unchanged. Implemented by rehydrating rather than
/// mutating `ActiveContextManager` directly, since dropping a checkpoint
/// outright (not merging it into anything) has no counterpart among its
/// ordinary operations.
async fn drop_oldest_checkpoint(state: &mut SessionState) {
    let view = state.manager.snapshot_view();
    let mut checkpoints = view.checkpoints;
    if checkpoints.is_empty() {
        return;
    }
    checkpoints.remove(0);
    state.manager = ctxcore_context::ActiveContextManager::rehydrate(
        view.system_prompt,
        checkpoints,
        view.recent_messages,
        state.counter.clone(),
        state.model_id.clone(),
    )
    .await;
}

async fn trim_to_recent_keep_min(state: &mut SessionState) {
    let view = state.manager.snapshot_view();
    let keep_min = state.tier.recent_keep_min;
    let recent = view.recent_messages;
    let trimmed = if recent.len() > keep_min {
        recent[recent.len() - keep_min..].to_vec()
    } else {
        recent
    };
    state.manager = ctxcore_context::ActiveContextManager::rehydrate(
        view.system_prompt,
        Vec::new(),
        trimmed,
        state.counter.clone(),
        state.model_id.clone(),
    )
    .await;
}
