//! Error types for the Active Context Manager, Checkpoint Compressor, and
//! Prompt Assembler.

use thiserror::Error;

/// Errors raised inside `ctxcore-context`.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A mutation would have pushed `token_count.total` above
    /// `tier.hard_cap` (§4.4 contract); the mutation was rejected and
    /// nothing changed. The caller must run compression or an emergency
    /// action before retrying.
    #[error("mutation would exceed hard_cap ({hard_cap}); total would have been {would_be_total}")]
    WouldExceedHardCap {
        /// The attempted new total.
        would_be_total: u32,
        /// The tier's hard cap.
        hard_cap: u32,
    },
    /// `validate()` found a §3 invariant violation.
    #[error(transparent)]
    InvalidState(#[from] ctxcore_core::ActiveContextValidationError),
    /// The Compressor could not find any span eligible for compression
    /// (e.g. everything is within `recent_keep_min`, or the only
    /// candidate span is a single message, which §8 explicitly refuses).
    #[error("no span eligible for compression: {0}")]
    NoEligibleSpan(String),
    /// The Compressor exhausted its retry and gave up (§4.5 step 5, §7
    /// `CompressionFailed`).
    #[error("compression failed: {0}")]
    CompressionFailed(String),
    /// The model provider call inside compression failed outright.
    #[error("model provider call failed during compression: {0}")]
    ProviderFailed(String),
    /// The Prompt Assembler was asked for a mode template that the template
    /// store doesn't know.
    #[error("unknown mode template: {0}")]
    ModeNotFound(String),
}

impl ContextError {
    /// `true` if retrying the same high-level operation later, without
    /// intervention, might succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoEligibleSpan(_) | Self::CompressionFailed(_) | Self::ProviderFailed(_)
        )
    }

    /// A short, stable category label for telemetry.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::WouldExceedHardCap { .. } => "hard_cap_exceeded",
            Self::InvalidState(_) => "invalid_state",
            Self::NoEligibleSpan(_) => "no_eligible_span",
            Self::CompressionFailed(_) => "compression_failed",
            Self::ProviderFailed(_) => "provider_failed",
            Self::ModeNotFound(_) => "mode_not_found",
        }
    }
}

/// Result type for `ctxcore-context` operations.
pub type Result<T> = std::result::Result<T, ContextError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_cap_exceeded_is_not_recoverable_by_retry_alone() {
        let err = ContextError::WouldExceedHardCap {
            would_be_total: 9000,
            hard_cap: 8000,
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), "hard_cap_exceeded");
    }

    #[test]
    fn compression_failed_is_recoverable() {
        let err = ContextError::CompressionFailed("retry exhausted".into());
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "compression_failed");
    }
}
