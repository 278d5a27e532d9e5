//! Configuration for the context orchestration core: storage root, retention
//! limits, batching thresholds, and advanced tier-table overrides.
//!
//! Settings load in three layers, each overriding the last (§6): compiled
//! defaults, an optional JSON settings file, then recognized environment
//! variables. See [`loader::load_settings`].

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{CoreSettings, TierOverride};
