//! Active Context Manager (§4.4): the in-memory holder of
//! `{ system_prompt, checkpoints[], recent_messages[] }` with budget
//! accounting.
//!
//! Every mutation recomputes `token_count` and enforces the §4.4 contract:
//! if the result would exceed `tier.hard_cap`, the mutation is rejected and
//! nothing changes. The caller (`ctxcore-orchestrator`) is responsible for
//! running compression or an emergency action before retrying.

use std::sync::Arc;

use ctxcore_core::{ActiveContextView, Checkpoint, Message, TokenBreakdown};
use ctxcore_tokens::TokenCounter;
use tracing::{debug, instrument};

use crate::errors::{ContextError, Result};
use crate::tier::Tier;

/// The mutable Active Context for one session.
pub struct ActiveContextManager {
    system_prompt: Message,
    checkpoints: Vec<Checkpoint>,
    recent_messages: Vec<Message>,
    token_count: TokenBreakdown,
    counter: Arc<TokenCounter>,
    model_id: String,
}

impl ActiveContextManager {
    /// Build a fresh manager with an initial system prompt and no history.
    pub async fn new(system_prompt: Message, counter: Arc<TokenCounter>, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        let system_tokens = counter.count_message(&system_prompt, &model_id).await;
        Self {
            system_prompt,
            checkpoints: Vec::new(),
            recent_messages: Vec::new(),
            token_count: TokenBreakdown::new(system_tokens, 0, 0),
            counter,
            model_id,
        }
    }

    /// Current token accounting.
    #[must_use]
    pub fn token_count(&self) -> TokenBreakdown {
        self.token_count
    }

    /// Current live checkpoints, oldest first.
    #[must_use]
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Current recent messages, oldest first.
    #[must_use]
    pub fn recent_messages(&self) -> &[Message] {
        &self.recent_messages
    }

    /// Replace the system prompt (§4.4 `set_system_prompt`). Never subject
    /// to the hard-cap rejection: the system prompt itself is produced by
    /// the Prompt Assembler under its own tier-aware budget, so by the time
    /// it reaches here it is already sized correctly.
    #[instrument(skip(self, msg))]
    pub async fn set_system_prompt(&mut self, msg: Message) {
        let tokens = self.counter.count_message(&msg, &self.model_id).await;
        self.system_prompt = msg;
        self.token_count.system = tokens;
        self.token_count.total = self.token_count.system + self.token_count.checkpoints + self.token_count.recent;
    }

    /// Append a message to the end of `recent_messages` (§4.4
    /// `append_recent`). Rejected if it would exceed `tier.hard_cap`.
    #[instrument(skip(self, msg), fields(hard_cap = tier.hard_cap))]
    pub async fn append_recent(&mut self, msg: Message, tier: &Tier) -> Result<()> {
        let msg_tokens = self.counter.count_message(&msg, &self.model_id).await;
        let would_be_total = self.token_count.total + msg_tokens;
        if would_be_total > tier.hard_cap {
            return Err(ContextError::WouldExceedHardCap {
                would_be_total,
                hard_cap: tier.hard_cap,
            });
        }
        self.recent_messages.push(msg);
        self.token_count.recent += msg_tokens;
        self.token_count.total = would_be_total;
        debug!(total = self.token_count.total, "appended recent message");
        Ok(())
    }

    /// Replace a span with a freshly compressed checkpoint (§4.4
    /// `replace_segment`, §4.5 step 7).
    ///
    /// `checkpoints_suffix` is how many checkpoints to remove from the end
    /// of `checkpoints` (the newest, i.e. chronologically closest to
    /// `recent_messages`); `recent_prefix` is how many messages to remove
    /// from the start of `recent_messages`. The new checkpoint is inserted
    /// where the removed checkpoints were.
    #[instrument(skip(self, checkpoint), fields(checkpoints_suffix, recent_prefix))]
    pub async fn replace_segment(
        &mut self,
        checkpoints_suffix: usize,
        recent_prefix: usize,
        checkpoint: Checkpoint,
    ) -> Result<()> {
        if checkpoints_suffix > self.checkpoints.len() || recent_prefix > self.recent_messages.len() {
            return Err(ContextError::NoEligibleSpan(
                "replace_segment span exceeds current context".into(),
            ));
        }
        let split_at = self.checkpoints.len() - checkpoints_suffix;
        let removed_checkpoint_tokens: u32 = self.checkpoints[split_at..].iter().map(|c| c.token_count).sum();
        let removed_recent: Vec<Message> = self.recent_messages.drain(0..recent_prefix).collect();
        let removed_recent_tokens = self.counter.count_messages(&removed_recent, &self.model_id).await;

        self.checkpoints.truncate(split_at);
        self.token_count.checkpoints = self.token_count.checkpoints - removed_checkpoint_tokens + checkpoint.token_count;
        self.token_count.recent -= removed_recent_tokens;
        self.checkpoints.push(checkpoint);
        self.token_count.total = self.token_count.system + self.token_count.checkpoints + self.token_count.recent;
        Ok(())
    }

    /// Like [`Self::replace_segment`], but commits atomically (§4.5 step 7):
    /// performs the swap, then validates against `tier`; on failure the
    /// manager is restored to its pre-call state and the error is returned.
    #[instrument(skip(self, checkpoint))]
    pub async fn replace_segment_validated(
        &mut self,
        checkpoints_suffix: usize,
        recent_prefix: usize,
        checkpoint: Checkpoint,
        tier: &Tier,
    ) -> Result<()> {
        let backup_checkpoints = self.checkpoints.clone();
        let backup_recent = self.recent_messages.clone();
        let backup_tokens = self.token_count;
        self.replace_segment(checkpoints_suffix, recent_prefix, checkpoint).await?;
        if let Err(err) = self.validate(tier) {
            self.checkpoints = backup_checkpoints;
            self.recent_messages = backup_recent;
            self.token_count = backup_tokens;
            return Err(err);
        }
        Ok(())
    }

    /// Return a deep, immutable view for the model call (§4.4
    /// `snapshot_view`).
    #[must_use]
    pub fn snapshot_view(&self) -> ActiveContextView {
        ActiveContextView {
            system_prompt: self.system_prompt.clone(),
            checkpoints: self.checkpoints.clone(),
            recent_messages: self.recent_messages.clone(),
            token_count: self.token_count,
        }
    }

    /// Check every §3 invariant against the given tier (§4.4 `validate`).
    pub fn validate(&self, tier: &Tier) -> Result<()> {
        self.snapshot_view()
            .validate(tier.hard_cap, Some((tier.recent_keep_min, tier.recent_keep_max)))
            .map_err(ContextError::from)
    }

    /// Rehydrate a manager from persisted state (e.g. after restart or a
    /// snapshot rollback), recomputing token counts from scratch.
    pub async fn rehydrate(
        system_prompt: Message,
        checkpoints: Vec<Checkpoint>,
        recent_messages: Vec<Message>,
        counter: Arc<TokenCounter>,
        model_id: impl Into<String>,
    ) -> Self {
        let model_id = model_id.into();
        let system = counter.count_message(&system_prompt, &model_id).await;
        let checkpoints_tokens: u32 = checkpoints.iter().map(|c| c.token_count).sum();
        let recent = counter.count_messages(&recent_messages, &model_id).await;
        Self {
            system_prompt,
            checkpoints,
            recent_messages,
            token_count: TokenBreakdown::new(system, checkpoints_tokens, recent),
            counter,
            model_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::tier_for_window;
    use ctxcore_core::CheckpointLevel;
    use std::collections::HashMap;

    fn tier() -> Tier {
        tier_for_window(8192, &HashMap::new())
    }

    async fn manager() -> ActiveContextManager {
        let counter = Arc::new(TokenCounter::heuristic_only());
        ActiveContextManager::new(Message::system("be helpful", 0.0), counter, "test-model").await
    }

    #[tokio::test]
    async fn new_manager_has_zero_recent_and_checkpoint_tokens() {
        let mgr = manager().await;
        assert_eq!(mgr.token_count().checkpoints, 0);
        assert_eq!(mgr.token_count().recent, 0);
        assert!(mgr.token_count().system > 0);
    }

    #[tokio::test]
    async fn append_recent_increases_total() {
        let mut mgr = manager().await;
        let tier = tier();
        let before = mgr.token_count().total;
        mgr.append_recent(Message::user("hello", 1.0), &tier).await.unwrap();
        assert!(mgr.token_count().total > before);
        assert_eq!(mgr.recent_messages().len(), 1);
    }

    #[tokio::test]
    async fn append_recent_rejects_when_it_would_exceed_hard_cap() {
        let mut mgr = manager().await;
        let mut tight_tier = tier();
        tight_tier.hard_cap = mgr.token_count().total;
        let err = mgr
            .append_recent(Message::user("this pushes us over", 1.0), &tight_tier)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::WouldExceedHardCap { .. }));
        assert_eq!(mgr.recent_messages().len(), 0, "rejected mutation must not change state");
    }

    #[tokio::test]
    async fn replace_segment_replaces_recent_prefix_with_checkpoint() {
        let mut mgr = manager().await;
        let tier = tier();
        for i in 0..4 {
            mgr.append_recent(Message::user(format!("msg {i}"), f64::from(i)), &tier)
                .await
                .unwrap();
        }
        let checkpoint = Checkpoint {
            id: ctxcore_core::CheckpointId::new(),
            created_at: 10.0,
            summary_text: "summary of first two".into(),
            origin_message_ids: vec![],
            token_count: 12,
            level: CheckpointLevel::Detailed,
            compression_generation: 0,
            model_used: "test-model".into(),
            last_compressed_at: None,
        };
        mgr.replace_segment(0, 2, checkpoint).await.unwrap();
        assert_eq!(mgr.recent_messages().len(), 2);
        assert_eq!(mgr.checkpoints().len(), 1);
        assert_eq!(mgr.checkpoints()[0].token_count, 12);
    }

    #[tokio::test]
    async fn replace_segment_rejects_out_of_range_span() {
        let mut mgr = manager().await;
        let checkpoint = Checkpoint {
            id: ctxcore_core::CheckpointId::new(),
            created_at: 0.0,
            summary_text: "x".into(),
            origin_message_ids: vec![],
            token_count: 1,
            level: CheckpointLevel::Detailed,
            compression_generation: 0,
            model_used: "m".into(),
            last_compressed_at: None,
        };
        let err = mgr.replace_segment(0, 5, checkpoint).await.unwrap_err();
        assert!(matches!(err, ContextError::NoEligibleSpan(_)));
    }

    #[tokio::test]
    async fn validate_rejects_fresh_manager_below_recent_keep_min() {
        let mgr = manager().await;
        let tier = tier();
        let err = mgr.validate(&tier).unwrap_err();
        assert!(matches!(
            err,
            ContextError::InvalidState(ctxcore_core::ActiveContextValidationError::RecentMessagesOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn snapshot_view_has_no_boundary_violation() {
        let mgr = manager().await;
        let view = mgr.snapshot_view();
        assert!(view.scan_for_boundary_violation().is_none());
    }

    #[tokio::test]
    async fn replace_segment_validated_rolls_back_on_invalid_result() {
        let mut mgr = manager().await;
        let tier = tier();
        for i in 0..4 {
            mgr.append_recent(Message::user(format!("msg {i}"), f64::from(i)), &tier)
                .await
                .unwrap();
        }
        let before_recent = mgr.recent_messages().to_vec();
        let before_tokens = mgr.token_count();
        let mut tight_tier = tier;
        tight_tier.recent_keep_min = 10;
        let checkpoint = Checkpoint {
            id: ctxcore_core::CheckpointId::new(),
            created_at: 0.0,
            summary_text: "x".into(),
            origin_message_ids: vec![],
            token_count: 1,
            level: CheckpointLevel::Detailed,
            compression_generation: 0,
            model_used: "m".into(),
            last_compressed_at: None,
        };
        let err = mgr
            .replace_segment_validated(0, 2, checkpoint, &tight_tier)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::InvalidState(_)));
        assert_eq!(mgr.recent_messages(), before_recent.as_slice(), "rollback must restore recent_messages");
        assert_eq!(mgr.token_count(), before_tokens, "rollback must restore token_count");
    }
}
