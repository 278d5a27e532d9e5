//! Settings loading: compiled defaults, deep-merged with an optional JSON
//! file, then overridden by environment variables.
//!
//! Grounded on `tron-settings::loader`'s `deep_merge`/`read_env_*` idiom:
//! settings are loaded as plain `serde_json::Value` trees and merged
//! recursively (source wins on leaf conflicts, `null` preserves the target,
//! non-object values are replaced wholesale), then re-deserialized into the
//! typed struct. No config-framework crate sits in front of this; the merge
//! is hand-rolled the same way the teacher's loader does it.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, instrument};

use crate::errors::{Result, SettingsError};
use crate::types::CoreSettings;

/// Recursively merge `source` into `target`.
///
/// - If both values are objects, merge key by key.
/// - If `source`'s value for a key is `null`, the `target`'s value is kept.
/// - Otherwise `source` wins.
fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) if source.is_null() => Value::Null,
        (_, source) => source,
    }
}

fn read_env_string(key: &str) -> Option<Value> {
    std::env::var(key).ok().map(Value::String)
}

fn read_env_usize(key: &str) -> Option<Value> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .map(|v| Value::Number(v.into()))
}

fn read_env_u64(key: &str) -> Option<Value> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(|v| Value::Number(v.into()))
}

fn read_env_u32(key: &str) -> Option<Value> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .map(|v| Value::Number(v.into()))
}

/// Build the env-override overlay as a sparse JSON object (§6: env vars
/// recognized — `CTXCORE_STORAGE_ROOT`, `CTXCORE_MAX_SNAPSHOTS_RETAINED`,
/// `CTXCORE_HISTORY_BATCH_SIZE`, `CTXCORE_HISTORY_BATCH_INTERVAL_MS`,
/// `CTXCORE_DEFAULT_MODEL_WINDOW`).
fn env_overlay() -> Value {
    let mut map = serde_json::Map::new();
    if let Some(v) = read_env_string("CTXCORE_STORAGE_ROOT") {
        map.insert("storageRoot".into(), v);
    }
    if let Some(v) = read_env_usize("CTXCORE_MAX_SNAPSHOTS_RETAINED") {
        map.insert("maxSnapshotsRetained".into(), v);
    }
    if let Some(v) = read_env_usize("CTXCORE_HISTORY_BATCH_SIZE") {
        map.insert("historyBatchSize".into(), v);
    }
    if let Some(v) = read_env_u64("CTXCORE_HISTORY_BATCH_INTERVAL_MS") {
        map.insert("historyBatchIntervalMs".into(), v);
    }
    if let Some(v) = read_env_u32("CTXCORE_DEFAULT_MODEL_WINDOW") {
        map.insert("defaultModelWindow".into(), v);
    }
    Value::Object(map)
}

/// Resolve the default settings file path: `$CTXCORE_SETTINGS_PATH` if set,
/// otherwise `./ctxcore.settings.json`.
#[must_use]
pub fn settings_path() -> PathBuf {
    std::env::var("CTXCORE_SETTINGS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("ctxcore.settings.json"))
}

/// Load settings from the default path (see [`settings_path`]), falling back
/// to compiled defaults if the file does not exist.
#[instrument]
pub fn load_settings() -> Result<CoreSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from an explicit path, deep-merged over compiled defaults
/// and then overridden by recognized environment variables.
#[instrument(skip(path), fields(path = %path.as_ref().display()))]
pub fn load_settings_from_path(path: impl AsRef<Path>) -> Result<CoreSettings> {
    let path = path.as_ref();
    let defaults = serde_json::to_value(CoreSettings::default())
        .expect("CoreSettings defaults always serialize");

    let merged = if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let file_value: Value = serde_json::from_str(&raw)?;
        debug!("settings file found, merging over compiled defaults");
        deep_merge(defaults, file_value)
    } else {
        debug!("no settings file at this path, using compiled defaults");
        defaults
    };

    let merged = deep_merge(merged, env_overlay());

    let settings: CoreSettings = serde_json::from_value(merged)?;
    validate(&settings)?;
    Ok(settings)
}

/// Validate a loaded [`CoreSettings`], rejecting values that would make the
/// rest of the crate misbehave (§8 boundary behavior: `recent_keep_min == 0`
/// must be rejected at load time, not discovered later as a silent no-op
/// compaction).
pub fn validate(settings: &CoreSettings) -> Result<()> {
    if settings.max_snapshots_retained == 0 {
        return Err(SettingsError::InvalidValue(
            "maxSnapshotsRetained must be >= 1".to_owned(),
        ));
    }
    if settings.history_batch_size == 0 {
        return Err(SettingsError::InvalidValue(
            "historyBatchSize must be >= 1".to_owned(),
        ));
    }
    for (tier_id, ov) in &settings.tier_overrides {
        if ov.recent_keep_min == Some(0) {
            return Err(SettingsError::InvalidValue(format!(
                "tier override {tier_id}: recentKeepMin must be >= 1"
            )));
        }
        if let (Some(min), Some(max)) = (ov.recent_keep_min, ov.recent_keep_max) {
            if min > max {
                return Err(SettingsError::InvalidValue(format!(
                    "tier override {tier_id}: recentKeepMin must be <= recentKeepMax"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn deep_merge_source_wins_on_leaves() {
        let target = serde_json::json!({"a": 1, "b": {"c": 2, "d": 3}});
        let source = serde_json::json!({"b": {"c": 99}});
        let merged = deep_merge(target, source);
        assert_eq!(merged, serde_json::json!({"a": 1, "b": {"c": 99, "d": 3}}));
    }

    #[test]
    fn deep_merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged, serde_json::json!({"a": 1}));
    }

    #[test]
    fn deep_merge_non_object_replaces_wholesale() {
        let target = serde_json::json!({"a": [1, 2, 3]});
        let source = serde_json::json!({"a": [9]});
        let merged = deep_merge(target, source);
        assert_eq!(merged, serde_json::json!({"a": [9]}));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = load_settings_from_path("/nonexistent/ctxcore.settings.json").unwrap();
        assert_eq!(settings, CoreSettings::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctxcore.settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"storageRoot": "/srv/ctxcore", "maxSnapshotsRetained": 9}}"#).unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.storage_root, "/srv/ctxcore");
        assert_eq!(settings.max_snapshots_retained, 9);
        assert_eq!(settings.history_batch_size, CoreSettings::default().history_batch_size);
    }

    #[test]
    fn rejects_zero_max_snapshots_retained() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctxcore.settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"maxSnapshotsRetained": 0}}"#).unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }

    #[test]
    fn rejects_zero_recent_keep_min_override() {
        let mut settings = CoreSettings::default();
        settings.tier_overrides.insert(
            "3_full".to_owned(),
            crate::types::TierOverride {
                hard_cap: None,
                soft_cap: None,
                recent_keep_min: Some(0),
                recent_keep_max: None,
            },
        );
        let err = validate(&settings).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
    }
}
