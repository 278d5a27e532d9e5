//! Checkpoint Compressor (§4.5): replaces a span of `checkpoints` +
//! `recent_messages` with a single freshly-summarized [`Checkpoint`].
//!
//! Invoked by the orchestrator when `active.total >= tier.soft_cap` or
//! `recent_messages.len() > tier.recent_keep_max`. At most one compression
//! per session may be in flight (§5); that guarantee is the caller's — the
//! orchestrator's per-session serialization point already ensures this
//! method is never entered twice concurrently for the same session, so a
//! second trigger simply waits its turn rather than being coalesced here.

use std::sync::Arc;

use ctxcore_core::{Checkpoint, CheckpointId, CheckpointLevel, CheckpointRecord, Message};
use ctxcore_tokens::TokenCounter;
use tracing::{info, instrument, warn};

use crate::errors::{ContextError, Result};
use crate::manager::ActiveContextManager;
use crate::summarizer::{serialize_messages, KeywordSummarizer, Summarizer};
use crate::tier::Tier;

/// A span selected for compression (§4.5 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    /// How many checkpoints to remove from the newest end of `checkpoints`.
    checkpoints_suffix: usize,
    /// How many messages to remove from the oldest end of `recent_messages`.
    recent_prefix: usize,
}

impl Span {
    fn items(self) -> usize {
        self.checkpoints_suffix + self.recent_prefix
    }
}

/// Runs the full §4.5 algorithm against an [`ActiveContextManager`].
pub struct CheckpointCompressor {
    summarizer: Arc<dyn Summarizer>,
    fallback: KeywordSummarizer,
    counter: Arc<TokenCounter>,
}

impl CheckpointCompressor {
    /// Build a compressor backed by `summarizer` for the primary attempt and
    /// the model-free [`KeywordSummarizer`] as the tighter-template retry.
    #[must_use]
    pub fn new(summarizer: Arc<dyn Summarizer>, counter: Arc<TokenCounter>) -> Self {
        Self {
            summarizer,
            fallback: KeywordSummarizer::new(),
            counter,
        }
    }

    /// Run one compression pass: select a span, summarize it, and commit
    /// the result atomically. Returns the [`CheckpointRecord`] to append to
    /// Session History.
    #[instrument(skip(self, manager, tier, model_id), fields(session_total = manager.token_count().total))]
    pub async fn compress(
        &self,
        manager: &mut ActiveContextManager,
        tier: &Tier,
        model_id: &str,
        now: f64,
    ) -> Result<CheckpointRecord> {
        let span = select_span(manager, tier)
            .ok_or_else(|| ContextError::NoEligibleSpan("no span meets the reclaim floor without touching recent_keep_min".into()))?;

        let checkpoints = manager.checkpoints();
        let split_at = checkpoints.len() - span.checkpoints_suffix;
        let included_checkpoints = &checkpoints[split_at..];
        let included_recent = &manager.recent_messages()[..span.recent_prefix];

        let level = output_level(included_checkpoints);
        let budget = Tier::budget_for_level(level);

        let span_messages = span_as_messages(included_checkpoints, included_recent);
        let original_tokens: u32 = {
            let checkpoint_tokens: u32 = included_checkpoints.iter().map(|c| c.token_count).sum();
            checkpoint_tokens + self.counter.count_messages(included_recent, model_id).await
        };

        let summary_text = self.summarize_with_retry(&span_messages, budget, model_id).await?;
        let token_count = self.counter.count(&summary_text, model_id).await;

        let mut origin_message_ids: Vec<_> = included_checkpoints
            .iter()
            .flat_map(|c| c.origin_message_ids.clone())
            .collect();
        origin_message_ids.extend(included_recent.iter().map(|m| m.id.clone()));

        let compression_generation = included_checkpoints
            .iter()
            .map(|c| c.compression_generation)
            .max()
            .map_or(0, |g| g + 1);

        let checkpoint = Checkpoint {
            id: CheckpointId::new(),
            created_at: now,
            summary_text,
            origin_message_ids,
            token_count,
            level,
            compression_generation,
            model_used: model_id.to_owned(),
            last_compressed_at: if included_checkpoints.is_empty() { None } else { Some(now) },
        };
        let record = CheckpointRecord::new(&checkpoint, original_tokens);

        manager
            .replace_segment_validated(span.checkpoints_suffix, span.recent_prefix, checkpoint, tier)
            .await?;

        info!(
            level = ?record.level,
            ratio = record.ratio,
            items = span.items(),
            "compression committed"
        );
        Ok(record)
    }

    /// Step 4-5: call the model, validate, retry once with the tighter
    /// fallback template, then give up.
    async fn summarize_with_retry(&self, span: &[Message], budget: u32, model_id: &str) -> Result<String> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let max_tokens = (f64::from(budget) * 1.25) as u32;
        match self.summarizer.summarize(span, budget).await {
            Ok(text) if self.is_valid(&text, max_tokens, model_id).await => return Ok(text),
            Ok(text) => warn!(len = text.len(), "primary summary failed validation, retrying with tighter template"),
            Err(err) => warn!(%err, "primary summarizer call failed, retrying with tighter template"),
        }
        match self.fallback.summarize(span, budget).await {
            Ok(text) if !text.trim().is_empty() => Ok(text),
            Ok(_) => Err(ContextError::CompressionFailed("fallback summary was empty".into())),
            Err(err) => Err(ContextError::CompressionFailed(format!("fallback summarizer failed: {err}"))),
        }
    }

    /// Validate a candidate summary against the *same* counter the
    /// Compressor uses to size the checkpoint it ultimately commits (§4.1:
    /// "must be the same function the Compressor uses to size outputs"), so
    /// this check can never disagree with the `token_count` actually stored.
    async fn is_valid(&self, text: &str, max_tokens: u32, model_id: &str) -> bool {
        !text.trim().is_empty() && self.counter.count(text, model_id).await <= max_tokens
    }
}

/// Step 2: the output level is one step older than the oldest (lowest)
/// level present among the checkpoints being merged; pure-recent spans
/// (no checkpoints included) always produce [`CheckpointLevel::Detailed`].
fn output_level(included_checkpoints: &[Checkpoint]) -> CheckpointLevel {
    included_checkpoints
        .iter()
        .map(|c| c.level)
        .min()
        .map_or(CheckpointLevel::Detailed, CheckpointLevel::older)
}

/// Flatten the selected checkpoints (as synthetic assistant messages
/// carrying their summary text) and raw recent messages into one ordered
/// slice for serialization into the compression prompt.
fn span_as_messages(included_checkpoints: &[Checkpoint], included_recent: &[Message]) -> Vec<Message> {
    let mut messages: Vec<Message> = included_checkpoints
        .iter()
        .map(|c| Message::assistant(format!("[prior summary] {}", c.summary_text), c.created_at))
        .collect();
    messages.extend(included_recent.iter().cloned());
    messages
}

/// Step 1: select the oldest-first span whose combined token size meets
/// `tier.compress_target_ratio * (total - soft_cap)`, never touching the
/// last `tier.recent_keep_min` messages, preferring the fewest items
/// replaced and, among ties, the older content (checkpoints before
/// recent messages).
fn select_span(manager: &ActiveContextManager, tier: &Tier) -> Option<Span> {
    let total = manager.token_count().total;
    let reclaim_target = if total > tier.soft_cap {
        (f64::from(total - tier.soft_cap) * tier.compress_target_ratio) as u32
    } else {
        0
    };

    let checkpoints = manager.checkpoints();
    let recent = manager.recent_messages();
    let max_recent_prefix = recent.len().saturating_sub(tier.recent_keep_min);

    let mut reclaimed = 0u32;
    let mut checkpoints_suffix = 0usize;
    for checkpoint in checkpoints.iter().rev() {
        if reclaimed >= reclaim_target && checkpoints_suffix >= 1 {
            break;
        }
        reclaimed += checkpoint.token_count;
        checkpoints_suffix += 1;
    }

    let mut recent_prefix = 0usize;
    if reclaimed < reclaim_target {
        for msg in recent.iter().take(max_recent_prefix) {
            if reclaimed >= reclaim_target {
                break;
            }
            reclaimed += msg.token_count.unwrap_or_else(|| ctxcore_tokens::estimate_message_tokens(msg));
            recent_prefix += 1;
        }
    }

    let span = Span {
        checkpoints_suffix,
        recent_prefix,
    };

    if span.items() < 2 {
        // Floor: a span of fewer than two items is not a merge, so refuse a
        // lone recent message or a lone checkpoint with nothing paired to it.
        if span.checkpoints_suffix == 0 {
            return if max_recent_prefix >= 2 {
                Some(Span {
                    checkpoints_suffix: 0,
                    recent_prefix: 2,
                })
            } else {
                None
            };
        }
        // span.checkpoints_suffix == 1 && span.recent_prefix == 0 here: pair
        // the lone checkpoint with a recent message if one is available,
        // else pull in a second checkpoint, else there is nothing to merge.
        if max_recent_prefix >= 1 {
            return Some(Span {
                checkpoints_suffix: span.checkpoints_suffix,
                recent_prefix: 1,
            });
        }
        return if checkpoints.len() >= 2 {
            Some(Span {
                checkpoints_suffix: 2,
                recent_prefix: 0,
            })
        } else {
            None
        };
    }
    Some(span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::tier_for_window;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockSummarizer {
        calls: AtomicUsize,
        response: String,
        fail: bool,
    }

    impl MockSummarizer {
        fn ok(response: impl Into<String>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: response.into(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: String::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Summarizer for MockSummarizer {
        async fn summarize(&self, _messages: &[Message], _budget_tokens: u32) -> std::result::Result<String, crate::summarizer::SummarizerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(crate::summarizer::SummarizerError::CallFailed("mock failure".into()));
            }
            Ok(self.response.clone())
        }
    }

    fn tier() -> Tier {
        let mut t = tier_for_window(8192, &HashMap::new());
        t.recent_keep_min = 2;
        t.compress_target_ratio = 0.5;
        t
    }

    async fn filled_manager(n: usize) -> ActiveContextManager {
        let counter = Arc::new(TokenCounter::heuristic_only());
        let mut mgr = ActiveContextManager::new(Message::system("be helpful", 0.0), counter, "test-model").await;
        let tier = tier();
        for i in 0..n {
            mgr.append_recent(Message::user(format!("message number {i} with some content"), f64::from(i)), &tier)
                .await
                .unwrap();
        }
        mgr
    }

    #[tokio::test]
    async fn compress_replaces_recent_prefix_with_new_checkpoint() {
        let mut mgr = filled_manager(10).await;
        let tier = tier();
        let summarizer = Arc::new(MockSummarizer::ok("a tidy summary of early messages"));
        let compressor = CheckpointCompressor::new(summarizer, Arc::new(TokenCounter::heuristic_only()));

        let before_recent_len = mgr.recent_messages().len();
        let record = compressor.compress(&mut mgr, &tier, "test-model", 100.0).await.unwrap();

        assert_eq!(record.level, CheckpointLevel::Detailed);
        assert_eq!(mgr.checkpoints().len(), 1);
        assert!(mgr.recent_messages().len() < before_recent_len);
        assert!(mgr.recent_messages().len() >= tier.recent_keep_min);
    }

    #[tokio::test]
    async fn compress_never_touches_recent_keep_min() {
        let mut mgr = filled_manager(4).await;
        let mut tier = tier();
        tier.recent_keep_min = 4;
        let summarizer = Arc::new(MockSummarizer::ok("summary"));
        let compressor = CheckpointCompressor::new(summarizer, Arc::new(TokenCounter::heuristic_only()));

        let err = compressor.compress(&mut mgr, &tier, "test-model", 0.0).await.unwrap_err();
        assert!(matches!(err, ContextError::NoEligibleSpan(_)));
        assert_eq!(mgr.recent_messages().len(), 4);
    }

    #[tokio::test]
    async fn compress_falls_back_to_keyword_summarizer_on_primary_failure() {
        let mut mgr = filled_manager(10).await;
        let tier = tier();
        let summarizer = Arc::new(MockSummarizer::failing());
        let compressor = CheckpointCompressor::new(summarizer, Arc::new(TokenCounter::heuristic_only()));

        let record = compressor.compress(&mut mgr, &tier, "test-model", 0.0).await.unwrap();
        assert!(record.compressed_tokens > 0);
    }

    #[tokio::test]
    async fn compress_merging_detailed_checkpoints_produces_moderate() {
        let mut mgr = filled_manager(10).await;
        let tier = tier();
        let summarizer = Arc::new(MockSummarizer::ok("first summary"));
        let compressor = CheckpointCompressor::new(summarizer, Arc::new(TokenCounter::heuristic_only()));
        compressor.compress(&mut mgr, &tier, "test-model", 0.0).await.unwrap();

        for i in 10..20 {
            mgr.append_recent(Message::user(format!("more content {i}"), f64::from(i)), &tier)
                .await
                .unwrap();
        }
        let summarizer2 = Arc::new(MockSummarizer::ok("second summary"));
        let compressor2 = CheckpointCompressor::new(summarizer2, Arc::new(TokenCounter::heuristic_only()));
        let mut tight_tier = tier;
        tight_tier.recent_keep_min = 18;
        tight_tier.recent_keep_max = 18;
        let record = compressor2.compress(&mut mgr, &tight_tier, "test-model", 50.0).await.unwrap();
        assert_eq!(record.level, CheckpointLevel::Moderate);
    }

    #[tokio::test]
    async fn select_span_never_returns_a_lone_checkpoint() {
        let counter = Arc::new(TokenCounter::heuristic_only());
        let mut mgr = ActiveContextManager::new(Message::system("be helpful", 0.0), counter, "test-model").await;
        let mut tier = tier_for_window(8192, &HashMap::new());
        tier.recent_keep_min = 2;
        tier.recent_keep_max = 3;
        tier.soft_cap = u32::MAX / 2;

        for i in 0..3 {
            mgr.append_recent(Message::user(format!("seed {i}"), f64::from(i)), &tier)
                .await
                .unwrap();
        }
        let checkpoint = Checkpoint {
            id: CheckpointId::new(),
            created_at: 0.0,
            summary_text: "early summary".into(),
            origin_message_ids: vec![],
            token_count: 5,
            level: CheckpointLevel::Detailed,
            compression_generation: 0,
            model_used: "test-model".into(),
            last_compressed_at: None,
        };
        mgr.replace_segment(0, 3, checkpoint).await.unwrap();

        for i in 3..8 {
            mgr.append_recent(Message::user(format!("more {i}"), f64::from(i)), &tier)
                .await
                .unwrap();
        }

        // Compression is triggered purely by recent_keep_max overflow here,
        // not by the soft cap, which is the scenario that used to slip a
        // lone checkpoint through.
        assert!(mgr.recent_messages().len() > tier.recent_keep_max);
        assert!(mgr.token_count().total <= tier.soft_cap);

        let span = select_span(&mgr, &tier).expect("a span must be selected");
        assert!(span.items() >= 2, "must never select fewer than two items");
        assert!(
            !(span.checkpoints_suffix == 1 && span.recent_prefix == 0),
            "must never compress a single checkpoint alone"
        );
    }

    #[test]
    fn output_level_pure_recent_span_is_detailed() {
        assert_eq!(output_level(&[]), CheckpointLevel::Detailed);
    }

    #[test]
    fn output_level_merging_moderate_checkpoints_is_compact() {
        let checkpoint = Checkpoint {
            id: CheckpointId::new(),
            created_at: 0.0,
            summary_text: "s".into(),
            origin_message_ids: vec![],
            token_count: 10,
            level: CheckpointLevel::Moderate,
            compression_generation: 1,
            model_used: "m".into(),
            last_compressed_at: None,
        };
        assert_eq!(output_level(&[checkpoint]), CheckpointLevel::Compact);
    }
}
