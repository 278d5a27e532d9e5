//! Prompt Assembler (§4.7): builds the `system_prompt` Message from mode
//! template + mandates + skill/tool descriptors + tier preamble.
//!
//! Concatenation order is part of the external contract and never changes:
//! `core_mandates -> skills -> tools -> tier_preamble -> mode_body`. Each
//! section has a fixed token budget, enforced through the shared
//! [`TokenCounter`] so the Assembler never disagrees with the Active
//! Context Manager about how large its own output is.

use std::sync::Arc;

use ctxcore_core::Message;
use ctxcore_tokens::TokenCounter;
use tracing::instrument;

use crate::errors::{ContextError, Result};
use crate::tier::Tier;

/// Core invariants expressed as text, unconditionally present in every
/// system prompt ahead of anything mode- or tier-specific.
pub const CORE_MANDATES: &str = "\
You operate within a bounded context window. Never fabricate information \
that isn't present in the conversation, checkpoints, or tool results \
available to you. When a checkpoint summarizes earlier history, treat it \
as authoritative for that span; do not contradict it.";

const TAIL_TRUNCATION_MARKER: &str = "\n[... truncated to fit section budget ...]";

/// Fixed per-section token budgets (§4.7: "enforced using the Token
/// Counter"). Frozen here as the single source of truth for the Assembler,
/// the same way [`Tier::budget_for_level`] is frozen for the Compressor.
#[derive(Clone, Copy, Debug)]
pub struct SectionBudgets {
    /// Budget for `core_mandates`.
    pub core_mandates: u32,
    /// Budget for `skills`.
    pub skills: u32,
    /// Budget for `tools`.
    pub tools: u32,
    /// Budget for `tier_preamble`.
    pub tier_preamble: u32,
    /// Budget for `mode_body`.
    pub mode_body: u32,
}

impl Default for SectionBudgets {
    fn default() -> Self {
        Self {
            core_mandates: 200,
            skills: 600,
            tools: 800,
            tier_preamble: 150,
            mode_body: 1200,
        }
    }
}

/// Fetches a mode's body text by name (§4.7 "mode template ... from a
/// template store"). An external collaborator per the system's scope
/// (out of scope for this core; implemented by the embedding application).
pub trait ModeTemplateStore: Send + Sync {
    /// The mode's body text, or `None` if `mode_name` isn't registered.
    fn mode_body(&self, mode_name: &str) -> Option<String>;
}

/// Enumerates the skill and tool descriptors currently registered (§4.7
/// "skill/tool descriptors enumerated from the tool registry"). An
/// external collaborator, like [`ModeTemplateStore`].
pub trait ToolRegistry: Send + Sync {
    /// One line per available skill.
    fn skill_descriptors(&self) -> Vec<String>;
    /// One line per available tool.
    fn tool_descriptors(&self) -> Vec<String>;
}

/// Assembles the system prompt from the fixed section order.
pub struct PromptAssembler {
    templates: Arc<dyn ModeTemplateStore>,
    tools: Arc<dyn ToolRegistry>,
    counter: Arc<TokenCounter>,
    budgets: SectionBudgets,
}

impl PromptAssembler {
    /// Build an assembler with the default frozen [`SectionBudgets`].
    #[must_use]
    pub fn new(templates: Arc<dyn ModeTemplateStore>, tools: Arc<dyn ToolRegistry>, counter: Arc<TokenCounter>) -> Self {
        Self::with_budgets(templates, tools, counter, SectionBudgets::default())
    }

    /// Build an assembler with explicit section budgets (primarily for
    /// tests exercising the truncation path without huge fixtures).
    #[must_use]
    pub fn with_budgets(
        templates: Arc<dyn ModeTemplateStore>,
        tools: Arc<dyn ToolRegistry>,
        counter: Arc<TokenCounter>,
        budgets: SectionBudgets,
    ) -> Self {
        Self {
            templates,
            tools,
            counter,
            budgets,
        }
    }

    /// Produce the `system_prompt` Message for `mode_name` under `tier`
    /// (§4.7). Called on session start, `bind_model`, and `set_mode`; the
    /// tier preamble is always derived from the *current* `tier` argument,
    /// so `sanity_checks_enabled` can never lag behind a tier change.
    #[instrument(skip(self), fields(mode_name, tier_id = ?tier.id))]
    pub async fn assemble(&self, mode_name: &str, tier: &Tier, model_id: &str, now: f64) -> Result<Message> {
        let mode_body = self
            .templates
            .mode_body(mode_name)
            .ok_or_else(|| ContextError::ModeNotFound(mode_name.to_owned()))?;

        let skills = self.tools.skill_descriptors().join("\n");
        let tools = self.tools.tool_descriptors().join("\n");
        let tier_preamble = tier_preamble_text(tier);

        let sections = [
            (CORE_MANDATES, self.budgets.core_mandates),
            (skills.as_str(), self.budgets.skills),
            (tools.as_str(), self.budgets.tools),
            (tier_preamble.as_str(), self.budgets.tier_preamble),
            (mode_body.as_str(), self.budgets.mode_body),
        ];

        let mut rendered = Vec::with_capacity(sections.len());
        for (text, budget) in sections {
            rendered.push(self.enforce_budget(text, budget, model_id).await);
        }

        let full_text = rendered.into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join("\n\n");
        Ok(Message::system(full_text, now))
    }

    /// Step: truncate `text` deterministically from the tail, with a
    /// marker, if its token count exceeds `budget`.
    async fn enforce_budget(&self, text: &str, budget: u32, model_id: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let tokens = self.counter.count(text, model_id).await;
        if tokens <= budget {
            return text.to_owned();
        }
        truncate_to_budget(text, budget)
    }
}

/// Tier-specific preamble (§4.7 (d)): extra sanity-check instructions on
/// tiers 1-2, nothing on tiers 3-4.
fn tier_preamble_text(tier: &Tier) -> String {
    if tier.sanity_checks_enabled {
        "This session is running with a small context window. Before any \
         destructive or hard-to-reverse action, restate your plan in one \
         sentence and confirm it matches the user's last instruction."
            .to_owned()
    } else {
        String::new()
    }
}

/// Truncate `text` to fit roughly within `budget` tokens (chars/4
/// heuristic, matching [`ctxcore_tokens::estimate_text_tokens`]), from the
/// tail, with a trailing marker.
fn truncate_to_budget(text: &str, budget: u32) -> String {
    let marker_chars = TAIL_TRUNCATION_MARKER.len();
    let max_chars = (budget as usize * 4).saturating_sub(marker_chars);
    let boundary = (0..=max_chars.min(text.len())).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
    format!("{}{}", &text[..boundary], TAIL_TRUNCATION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::tier_for_window;
    use std::collections::HashMap;

    struct FixedTemplates;
    impl ModeTemplateStore for FixedTemplates {
        fn mode_body(&self, mode_name: &str) -> Option<String> {
            match mode_name {
                "default" => Some("You are in default mode. Be helpful and precise.".to_owned()),
                "long" => Some("x".repeat(20_000)),
                _ => None,
            }
        }
    }

    struct FixedTools;
    impl ToolRegistry for FixedTools {
        fn skill_descriptors(&self) -> Vec<String> {
            vec!["search: find files by content".to_owned()]
        }
        fn tool_descriptors(&self) -> Vec<String> {
            vec!["read_file(path) -> String".to_owned(), "write_file(path, content)".to_owned()]
        }
    }

    fn assembler() -> PromptAssembler {
        PromptAssembler::new(Arc::new(FixedTemplates), Arc::new(FixedTools), Arc::new(TokenCounter::heuristic_only()))
    }

    #[tokio::test]
    async fn assembles_sections_in_fixed_order() {
        let assembler = assembler();
        let tier = tier_for_window(8192, &HashMap::new());
        let msg = assembler.assemble("default", &tier, "test-model", 0.0).await.unwrap();
        let text = msg.text_content();

        let mandates_pos = text.find("bounded context window").unwrap();
        let skills_pos = text.find("search:").unwrap();
        let tools_pos = text.find("read_file").unwrap();
        let preamble_pos = text.find("small context window").unwrap();
        let mode_pos = text.find("default mode").unwrap();
        assert!(mandates_pos < skills_pos);
        assert!(skills_pos < tools_pos);
        assert!(tools_pos < preamble_pos);
        assert!(preamble_pos < mode_pos);
    }

    #[tokio::test]
    async fn unknown_mode_is_rejected() {
        let assembler = assembler();
        let tier = tier_for_window(8192, &HashMap::new());
        let err = assembler.assemble("nonexistent", &tier, "test-model", 0.0).await.unwrap_err();
        assert!(matches!(err, ContextError::ModeNotFound(_)));
    }

    #[tokio::test]
    async fn standard_tier_omits_sanity_preamble() {
        let assembler = assembler();
        let tier = tier_for_window(65536, &HashMap::new());
        assert!(!tier.sanity_checks_enabled);
        let msg = assembler.assemble("default", &tier, "test-model", 0.0).await.unwrap();
        assert!(!msg.text_content().contains("small context window"));
    }

    #[tokio::test]
    async fn oversized_mode_body_is_truncated_with_marker() {
        let assembler = assembler();
        let tier = tier_for_window(8192, &HashMap::new());
        let msg = assembler.assemble("long", &tier, "test-model", 0.0).await.unwrap();
        let text = msg.text_content();
        assert!(text.contains("truncated to fit section budget"));
        assert!(text.len() < 20_000);
    }

    #[tokio::test]
    async fn mode_change_uses_current_tier_not_stale_prompt() {
        let assembler = assembler();
        let minimal_tier = tier_for_window(2048, &HashMap::new());
        let full_tier = tier_for_window(65536, &HashMap::new());
        let first = assembler.assemble("default", &minimal_tier, "test-model", 0.0).await.unwrap();
        let second = assembler.assemble("default", &full_tier, "test-model", 1.0).await.unwrap();
        assert!(first.text_content().contains("small context window"));
        assert!(!second.text_content().contains("small context window"));
    }

    #[test]
    fn truncate_to_budget_adds_marker_and_shrinks() {
        let long = "a".repeat(1000);
        let result = truncate_to_budget(&long, 10);
        assert!(result.len() < 1000);
        insta::assert_snapshot!(result, @"\n[... truncated to fit section budget ...]");
    }
}
