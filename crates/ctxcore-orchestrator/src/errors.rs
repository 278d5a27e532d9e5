//! Top-level error type for the Orchestrator façade (§7).

use thiserror::Error;

/// Errors surfaced by [`crate::Orchestrator`] operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// On-disk writes are failing; the session degrades to read-only
    /// mutations, but `prepare_llm_input` still succeeds from memory.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] ctxcore_storage::StorageError),

    /// The model provider call failed; `add_*_message` still succeeds and
    /// compression is deferred.
    #[error("model provider unavailable: {0}")]
    ModelUnavailable(#[from] ctxcore_llm::ProviderError),

    /// The Compressor gave up; the next trigger retries.
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// `prepare_llm_input` would exceed `hard_cap` and no compression can
    /// help; this surfaces to the caller and triggers emergency recovery.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// A Snapshot or Session History object was detected inside an
    /// assembled Active Context. Fatal for that call; never recovered
    /// around silently (§7 propagation policy).
    #[error("boundary violation: {0}")]
    BoundaryViolation(String),

    /// An unknown session id was used.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A caller-supplied value failed validation (e.g. unknown mode,
    /// unknown snapshot id format).
    #[error("validation error: {0}")]
    Validation(String),
}

impl From<ctxcore_context::ContextError> for OrchestratorError {
    fn from(err: ctxcore_context::ContextError) -> Self {
        match err {
            ctxcore_context::ContextError::CompressionFailed(msg) => Self::CompressionFailed(msg),
            ctxcore_context::ContextError::ProviderFailed(msg) => Self::CompressionFailed(msg),
            ctxcore_context::ContextError::WouldExceedHardCap { would_be_total, hard_cap } => {
                Self::BudgetExceeded(format!("total would be {would_be_total}, hard_cap is {hard_cap}"))
            }
            ctxcore_context::ContextError::InvalidState(
                ctxcore_core::ActiveContextValidationError::BoundaryViolation(tag),
            ) => Self::BoundaryViolation(format!("{tag:?}")),
            ctxcore_context::ContextError::InvalidState(e) => Self::Validation(e.to_string()),
            ctxcore_context::ContextError::NoEligibleSpan(msg) => Self::CompressionFailed(msg),
            ctxcore_context::ContextError::ModeNotFound(name) => Self::Validation(format!("unknown mode: {name}")),
        }
    }
}

impl OrchestratorError {
    /// `true` if retrying the same high-level operation later, without
    /// intervention, might succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::StorageUnavailable(e) => e.is_recoverable(),
            Self::ModelUnavailable(e) => e.is_retryable(),
            Self::CompressionFailed(_) => true,
            Self::BudgetExceeded(_) | Self::BoundaryViolation(_) | Self::SessionNotFound(_) | Self::Validation(_) => false,
        }
    }

    /// A short, stable category label for telemetry.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::CompressionFailed(_) => "compression_failed",
            Self::BudgetExceeded(_) => "budget_exceeded",
            Self::BoundaryViolation(_) => "boundary_violation",
            Self::SessionNotFound(_) => "session_not_found",
            Self::Validation(_) => "validation",
        }
    }
}

/// Result type for Orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
