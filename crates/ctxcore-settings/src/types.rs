//! Settings types.

use serde::{Deserialize, Serialize};

/// Per-tier overrides to the frozen tier table (`ctxcore_context::tier::TIER_TABLE`).
///
/// Advanced/optional (§6: "default tier-table overrides (advanced)").
/// Any field left `None` falls back to the compiled default for that tier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierOverride {
    /// Override `hard_cap` (tokens).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hard_cap: Option<u32>,
    /// Override `soft_cap` (tokens).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_cap: Option<u32>,
    /// Override `recent_keep_min`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_keep_min: Option<usize>,
    /// Override `recent_keep_max`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_keep_max: Option<usize>,
}

/// Top-level settings for the context orchestration core (§6 "Environment/
/// configuration recognized").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreSettings {
    /// Root directory under which `sessions/<session_id>/...` is laid out.
    pub storage_root: String,
    /// Maximum snapshots retained per session (§3 default 5).
    pub max_snapshots_retained: usize,
    /// Batch size for Session History append debouncing (§4.2).
    pub history_batch_size: usize,
    /// Batch interval for Session History append debouncing, in ms (§4.2).
    pub history_batch_interval_ms: u64,
    /// Advanced per-tier overrides, keyed by tier id (`"1_minimal"`, etc.).
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub tier_overrides: std::collections::HashMap<String, TierOverride>,
    /// Default window to assume when a model's advertised context is unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model_window: Option<u32>,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            storage_root: "./ctxcore-data".to_owned(),
            max_snapshots_retained: 5,
            history_batch_size: 20,
            history_batch_interval_ms: 500,
            tier_overrides: std::collections::HashMap::new(),
            default_model_window: Some(8192),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let settings = CoreSettings::default();
        assert_eq!(settings.max_snapshots_retained, 5);
        assert_eq!(settings.storage_root, "./ctxcore-data");
    }

    #[test]
    fn tier_override_serde_roundtrip() {
        let ov = TierOverride {
            hard_cap: Some(4000),
            soft_cap: None,
            recent_keep_min: Some(3),
            recent_keep_max: None,
        };
        let json = serde_json::to_value(&ov).unwrap();
        assert_eq!(json["hardCap"], 4000);
        assert!(json.get("softCap").is_none());
        let back: TierOverride = serde_json::from_value(json).unwrap();
        assert_eq!(back, ov);
    }
}
