//! The Active Context view (§3 `Active Context`): the only structure ever
//! sent to a model.
//!
//! This module holds the *data* shape and its invariant checks. The
//! mutable manager that builds and evolves one lives in `ctxcore-context`.

use serde::{Deserialize, Serialize};

use crate::boundary::scan_for_forbidden_tag;
use crate::checkpoint::Checkpoint;
use crate::message::Message;

/// Token accounting for an [`ActiveContextView`] (§3
/// `token_count: { system, checkpoints, recent, total }`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBreakdown {
    /// Tokens in the system prompt.
    pub system: u32,
    /// Tokens across all live checkpoints.
    pub checkpoints: u32,
    /// Tokens across all recent messages.
    pub recent: u32,
    /// `system + checkpoints + recent`.
    pub total: u32,
}

impl TokenBreakdown {
    /// Recompute from component counts.
    #[must_use]
    pub fn new(system: u32, checkpoints: u32, recent: u32) -> Self {
        Self {
            system,
            checkpoints,
            recent,
            total: system + checkpoints + recent,
        }
    }

    /// `true` if `total == system + checkpoints + recent` (§3 invariant).
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.total == self.system + self.checkpoints + self.recent
    }
}

/// An immutable, deep view of Active Context, suitable for a model call
/// (§4.4 `snapshot_view`, §4.8 `prepare_llm_input`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveContextView {
    /// The system prompt. Never compressed, mutated by recent additions, or
    /// reordered (§3 invariant).
    pub system_prompt: Message,
    /// Live checkpoints, oldest first.
    pub checkpoints: Vec<Checkpoint>,
    /// Recent raw messages, oldest first.
    pub recent_messages: Vec<Message>,
    /// Token accounting.
    pub token_count: TokenBreakdown,
}

/// Errors surfaced by [`ActiveContextView::validate`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ActiveContextValidationError {
    /// `token_count.total != system + checkpoints + recent`.
    #[error("token_count.total ({total}) is inconsistent with its components (system={system}, checkpoints={checkpoints}, recent={recent})")]
    InconsistentTokenCount {
        /// Recorded `total`.
        total: u32,
        /// Component `system`.
        system: u32,
        /// Component `checkpoints`.
        checkpoints: u32,
        /// Component `recent`.
        recent: u32,
    },
    /// `total` exceeds the caller-supplied `hard_cap`.
    #[error("token_count.total ({total}) exceeds hard_cap ({hard_cap})")]
    HardCapExceeded {
        /// Recorded `total`.
        total: u32,
        /// The tier's hard cap.
        hard_cap: u32,
    },
    /// `recent_messages.len()` falls outside `[recent_keep_min, recent_keep_max]`.
    #[error("recent_messages.len() ({len}) outside [{min}, {max}]")]
    RecentMessagesOutOfRange {
        /// Observed length.
        len: usize,
        /// Lower bound.
        min: usize,
        /// Upper bound.
        max: usize,
    },
    /// A Snapshot or Session History object was found nested inside the
    /// view (§4.8 boundary guard).
    #[error("boundary violation: {0:?} detected inside Active Context view")]
    BoundaryViolation(crate::boundary::StructuralTag),
}

impl ActiveContextView {
    /// Check the §3 invariants plus, optionally, the tier's `recent_keep`
    /// bounds (only meaningful after the orchestrator has finished a
    /// mutation, per §3: "after any orchestrator operation completes").
    ///
    /// # Errors
    /// See [`ActiveContextValidationError`].
    pub fn validate(
        &self,
        hard_cap: u32,
        recent_keep_bounds: Option<(usize, usize)>,
    ) -> Result<(), ActiveContextValidationError> {
        if !self.token_count.is_consistent() {
            return Err(ActiveContextValidationError::InconsistentTokenCount {
                total: self.token_count.total,
                system: self.token_count.system,
                checkpoints: self.token_count.checkpoints,
                recent: self.token_count.recent,
            });
        }
        if self.token_count.total > hard_cap {
            return Err(ActiveContextValidationError::HardCapExceeded {
                total: self.token_count.total,
                hard_cap,
            });
        }
        if let Some((min, max)) = recent_keep_bounds {
            let len = self.recent_messages.len();
            if len < min || len > max {
                return Err(ActiveContextValidationError::RecentMessagesOutOfRange {
                    len,
                    min,
                    max,
                });
            }
        }
        if let Some(tag) = self.scan_for_boundary_violation() {
            return Err(ActiveContextValidationError::BoundaryViolation(tag));
        }
        Ok(())
    }

    /// Serialize this view and scan it for an embedded Snapshot or Session
    /// History structural tag (§4.8 `prevent_snapshot_in_prompt`,
    /// `prevent_history_in_prompt`).
    #[must_use]
    pub fn scan_for_boundary_violation(&self) -> Option<crate::boundary::StructuralTag> {
        let value = serde_json::to_value(self).ok()?;
        scan_for_forbidden_tag(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MessageId;

    fn sample_view(total: u32) -> ActiveContextView {
        ActiveContextView {
            system_prompt: Message::system("be helpful", 0.0),
            checkpoints: vec![],
            recent_messages: vec![Message::user("hi", 1.0)],
            token_count: TokenBreakdown {
                system: 5,
                checkpoints: 0,
                recent: total - 5,
                total,
            },
        }
    }

    #[test]
    fn valid_view_passes() {
        let view = sample_view(10);
        assert!(view.validate(100, Some((1, 5))).is_ok());
    }

    #[test]
    fn inconsistent_total_is_rejected() {
        let mut view = sample_view(10);
        view.token_count.total = 999;
        let err = view.validate(1000, None).unwrap_err();
        assert!(matches!(
            err,
            ActiveContextValidationError::InconsistentTokenCount { .. }
        ));
    }

    #[test]
    fn hard_cap_exceeded_is_rejected() {
        let view = sample_view(10);
        let err = view.validate(5, None).unwrap_err();
        assert!(matches!(
            err,
            ActiveContextValidationError::HardCapExceeded { .. }
        ));
    }

    #[test]
    fn recent_messages_out_of_bounds_is_rejected() {
        let view = sample_view(10);
        let err = view.validate(100, Some((2, 5))).unwrap_err();
        assert!(matches!(
            err,
            ActiveContextValidationError::RecentMessagesOutOfRange { .. }
        ));
    }

    #[test]
    fn clean_view_has_no_boundary_violation() {
        let view = sample_view(10);
        assert!(view.scan_for_boundary_violation().is_none());
    }

    #[test]
    fn view_with_injected_snapshot_json_is_flagged() {
        let view = sample_view(10);
        let mut value = serde_json::to_value(&view).unwrap();
        value["recent_messages"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({
                "__structural_tag": "snapshot",
                "id": "m-fake"
            }));
        assert_eq!(
            scan_for_forbidden_tag(&value),
            Some(crate::boundary::StructuralTag::Snapshot)
        );
        let _ = MessageId::new();
    }
}
