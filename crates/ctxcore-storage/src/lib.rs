//! Durable, file-based persistence for the context orchestration core:
//! the Session History Store (§4.2) and the Snapshot Store (§4.3).
//!
//! Both stores write under a single configured root (`storage_root` in
//! `ctxcore-settings`), one directory per session, matching the filesystem
//! layout in §6. Neither store's contents are ever assembled into a model
//! prompt — that boundary is enforced structurally in `ctxcore-core`.

#![deny(unsafe_code)]

pub mod errors;
pub mod history;
pub mod snapshot;

pub use errors::{Result, StorageError};
pub use history::{FileHistoryStore, HistoryStore};
pub use snapshot::{FileSnapshotStore, RetentionPolicy, SnapshotStore, SnapshotSummary};
