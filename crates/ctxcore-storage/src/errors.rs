//! Storage error types.
//!
//! Mirrors `tron-runtime::errors::RuntimeError`: a flat enum with
//! `is_recoverable()`/`category()` helpers so callers (ultimately
//! `ctxcore-orchestrator::OrchestratorError`) can decide whether to retry
//! locally or surface `StorageUnavailable` (§7).

use thiserror::Error;

/// Errors raised by [`crate::history::HistoryStore`] and
/// [`crate::snapshot::SnapshotStore`] implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The filesystem refused a read or write (permissions, disk full,
    /// missing directory). Maps to §7's `StorageUnavailable`.
    #[error("storage unavailable: {0}")]
    Io(#[from] std::io::Error),
    /// A stored file failed to parse as JSON (corrupt `history.log` line,
    /// malformed `metadata.json`).
    #[error("corrupt storage record: {0}")]
    Corrupt(String),
    /// A session directory was expected to exist but did not.
    #[error("session not found: {0}")]
    SessionNotFound(String),
    /// A snapshot id was not found under the given session.
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
    /// Construction of a [`ctxcore_core::Snapshot`] was refused (e.g. a
    /// placeholder `session_id`).
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl StorageError {
    /// `true` if the caller may reasonably retry the same operation later
    /// without further intervention (§7 propagation policy).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// A short, stable category label for telemetry.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Corrupt(_) => "corrupt",
            Self::SessionNotFound(_) => "session_not_found",
            Self::SnapshotNotFound(_) => "snapshot_not_found",
            Self::InvalidSnapshot(_) => "invalid_snapshot",
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_recoverable() {
        let err = StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "io");
    }

    #[test]
    fn corrupt_records_are_not_recoverable() {
        let err = StorageError::Corrupt("bad line 3".into());
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), "corrupt");
    }

    #[test]
    fn not_found_categories() {
        assert_eq!(
            StorageError::SessionNotFound("s1".into()).category(),
            "session_not_found"
        );
        assert_eq!(
            StorageError::SnapshotNotFound("sn1".into()).category(),
            "snapshot_not_found"
        );
    }
}
