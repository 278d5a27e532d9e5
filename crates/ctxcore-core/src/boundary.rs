//! Structural tagging used to enforce the §3/§4.8 boundary invariant:
//! Snapshot and Session History objects must never appear inside an
//! assembled Active Context.
//!
//! Rust's type system already makes this nearly impossible through the
//! normal API surface — [`crate::active_context::ActiveContextView`] has no
//! field typed as [`crate::snapshot::Snapshot`] or
//! [`crate::history::SessionHistory`]. The tag below is defense in depth
//! for the boundary guards in §4.8 (`prevent_snapshot_in_prompt`,
//! `prevent_history_in_prompt`), which the spec asks to reject "by
//! structural tag" rather than purely by type — relevant when an Active
//! Context is rehydrated from an untrusted or hand-built JSON value (e.g.
//! during session recovery) rather than constructed through the typed API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A marker embedded in every [`crate::snapshot::Snapshot`] and
/// [`crate::history::SessionHistory`], serialized under
/// [`STRUCTURAL_TAG_KEY`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralTag {
    /// Tags a [`crate::snapshot::Snapshot`].
    #[serde(rename = "snapshot")]
    Snapshot,
    /// Tags a [`crate::history::SessionHistory`].
    #[serde(rename = "session_history")]
    SessionHistory,
}

/// The JSON key under which [`StructuralTag`] is serialized.
pub const STRUCTURAL_TAG_KEY: &str = "__structural_tag";

/// Recursively scan a JSON value for an embedded [`StructuralTag`],
/// returning the first one found (objects and array elements are visited
/// depth-first).
#[must_use]
pub fn scan_for_forbidden_tag(value: &Value) -> Option<StructuralTag> {
    match value {
        Value::Object(map) => {
            if let Some(tag_value) = map.get(STRUCTURAL_TAG_KEY) {
                if let Ok(tag) = serde_json::from_value::<StructuralTag>(tag_value.clone()) {
                    return Some(tag);
                }
            }
            map.values().find_map(scan_for_forbidden_tag)
        }
        Value::Array(items) => items.iter().find_map(scan_for_forbidden_tag),
        _ => None,
    }
}
