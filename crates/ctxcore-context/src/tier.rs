//! Tier Controller (§4.6): classifies a model's advertised context window
//! into one of four discrete tiers and exposes the budgets for that tier.
//!
//! This table is the **single source of truth** (§4.6, §9): the Compressor
//! and Prompt Assembler read `Tier` fields through this module rather than
//! duplicating thresholds, which is the fix for the "two tables
//! disagreeing" bug called out in §9.
//!
//! Exact numbers are not fixed by `spec.md` (§9 "open questions"); the
//! table below is frozen per the decision recorded in `DESIGN.md`.

use std::collections::HashMap;

use ctxcore_core::CheckpointLevel;
use ctxcore_settings::TierOverride;
use serde::{Deserialize, Serialize};

/// Discrete tier identity (§3 `Tier.id`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierId {
    /// `W <= 4096`.
    #[serde(rename = "1_minimal")]
    Minimal,
    /// `4096 < W <= 8192`.
    #[serde(rename = "2_basic")]
    Basic,
    /// `8192 < W <= 32768`.
    #[serde(rename = "3_standard")]
    Standard,
    /// `W > 32768`.
    #[serde(rename = "4_full")]
    Full,
}

impl TierId {
    /// Stable key used in `tier_overrides` settings maps.
    #[must_use]
    pub fn settings_key(self) -> &'static str {
        match self {
            Self::Minimal => "1_minimal",
            Self::Basic => "2_basic",
            Self::Standard => "3_standard",
            Self::Full => "4_full",
        }
    }
}

/// Budgets and policies for one tier (§3 `Tier`, §4.6).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tier {
    /// Which tier this is.
    pub id: TierId,
    /// The model's advertised context window, in tokens.
    pub window_tokens: u32,
    /// Ceiling enforced at `prepare_llm_input` time.
    pub hard_cap: u32,
    /// Threshold that triggers compression.
    pub soft_cap: u32,
    /// Minimum recent messages ever kept (never compressed).
    pub recent_keep_min: usize,
    /// Maximum recent messages kept before compression is mandatory.
    pub recent_keep_max: usize,
    /// Fraction of the reclaim target a single compression must achieve.
    pub compress_target_ratio: f64,
    /// Maximum live checkpoints before the oldest must be merged.
    pub max_checkpoints: usize,
    /// Whether extra sanity-check preamble is injected (§4.7, tiers 1-2).
    pub sanity_checks_enabled: bool,
}

impl Tier {
    /// Per-level summary token budget `B_level` (§4.5 step 3, §9 frozen
    /// constants): 600 for [`CheckpointLevel::Detailed`], 300 for
    /// [`CheckpointLevel::Moderate`], 150 for [`CheckpointLevel::Compact`].
    /// Fixed across tiers — the tier only affects *when* compression
    /// triggers, not how large a summary it asks for.
    #[must_use]
    pub fn budget_for_level(level: CheckpointLevel) -> u32 {
        match level {
            CheckpointLevel::Detailed => 600,
            CheckpointLevel::Moderate => 300,
            CheckpointLevel::Compact => 150,
        }
    }

    /// Retry margin added to `max_output_tokens` on the Compressor's model
    /// call (§4.5 step 4): `B_level + 64`.
    #[must_use]
    pub fn max_output_tokens_for_level(level: CheckpointLevel) -> u32 {
        Self::budget_for_level(level) + 64
    }
}

fn base_tier(id: TierId, window_tokens: u32, reserve: u32, recent_keep_min: usize, recent_keep_max: usize, compress_target_ratio: f64, max_checkpoints: usize, sanity_checks_enabled: bool) -> Tier {
    let hard_cap = window_tokens.saturating_sub(reserve);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let soft_cap = (f64::from(hard_cap) * 0.75) as u32;
    Tier {
        id,
        window_tokens,
        hard_cap,
        soft_cap,
        recent_keep_min,
        recent_keep_max,
        compress_target_ratio,
        max_checkpoints,
        sanity_checks_enabled,
    }
}

/// Classify `window` into a [`TierId`] per the discrete thresholds in §4.6.
/// Never a runtime percentage of the window (§9 explicit prohibition).
#[must_use]
pub fn classify(window: u32) -> TierId {
    if window <= 4096 {
        TierId::Minimal
    } else if window <= 8192 {
        TierId::Basic
    } else if window <= 32768 {
        TierId::Standard
    } else {
        TierId::Full
    }
}

/// Build the [`Tier`] for `window`, applying any matching entry from
/// `overrides` (§6 "advanced" tier-table overrides).
#[must_use]
pub fn tier_for_window(window: u32, overrides: &HashMap<String, TierOverride>) -> Tier {
    let id = classify(window);
    let mut tier = match id {
        TierId::Minimal => base_tier(id, window, 256, 2, 6, 0.50, 4, true),
        TierId::Basic => base_tier(id, window, 512, 2, 10, 0.50, 6, true),
        TierId::Standard => base_tier(id, window, 1024, 4, 20, 0.40, 10, false),
        TierId::Full => base_tier(id, window, 2048, 6, 40, 0.35, 16, false),
    };
    if let Some(ov) = overrides.get(id.settings_key()) {
        if let Some(v) = ov.hard_cap {
            tier.hard_cap = v;
        }
        if let Some(v) = ov.soft_cap {
            tier.soft_cap = v;
        }
        if let Some(v) = ov.recent_keep_min {
            tier.recent_keep_min = v;
        }
        if let Some(v) = ov.recent_keep_max {
            tier.recent_keep_max = v;
        }
    }
    tier
}
