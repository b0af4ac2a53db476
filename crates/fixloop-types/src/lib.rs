//! Shared error taxonomy for the fixloop engine.
//!
//! Every fixloop crate reports failures through [`FixloopError`] so that the
//! engine's transition loop can classify them in one place:
//! - transient model-call failures are retried with backoff
//! - everything else that escapes a phase ends the run as `FATAL`

/// Unified error type for all fixloop subsystems.
#[derive(Debug, thiserror::Error)]
pub enum FixloopError {
    // === LLM Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    // === Tool Errors ===
    #[error("Tool '{tool}' error: {message}")]
    ToolError { tool: String, message: String },

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    // === Engine Errors ===
    #[error("Could not interpret {phase} output as a plan: {message}")]
    UnparsablePlan { phase: String, message: String },

    #[error("Plan rejected: {0}")]
    InvalidPlan(String),

    #[error("Build tool could not be run: {0}")]
    BuildUnavailable(String),

    #[error("Transition limit reached: {limit} transitions")]
    TransitionLimit { limit: usize },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl FixloopError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FixloopError::RateLimited { .. }
                | FixloopError::RequestTimeout { .. }
                | FixloopError::ProviderError {
                    retryable: true,
                    ..
                }
        )
    }
}

/// A convenience alias for `Result<T, FixloopError>`.
pub type Result<T> = std::result::Result<T, FixloopError>;
