// src/infra/errors.rs — Error types for plancraft

use thiserror::Error;

/// What a provider reported about a failure it could not express as a more
/// specific variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimit,
    Timeout,
    Upstream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The accumulated output does not match the expected plan shape.
    Validation,
    /// The provider finished without producing any text.
    EmptyOutput,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErrorKind::Validation => write!(f, "validation"),
            ParseErrorKind::EmptyOutput => write!(f, "empty_output"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PlanError {
    // Provider errors
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        kind: ProviderErrorKind,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Provider '{provider}' timed out after {timeout_ms}ms")]
    ProviderTimeout { provider: String, timeout_ms: u64 },

    // Output errors
    #[error("Plan output {kind} error: {message}")]
    Parse {
        kind: ParseErrorKind,
        message: String,
    },

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Attempt cap of {cap} reached for plan '{plan_id}'")]
    AttemptCapped { plan_id: String, cap: u32 },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PlanError {
    pub fn validation(message: impl Into<String>) -> Self {
        PlanError::Parse {
            kind: ParseErrorKind::Validation,
            message: message.into(),
        }
    }

    /// True for errors that mean the provider ran out of time, either by its
    /// own budget or by reporting a timeout kind.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PlanError::ProviderTimeout { .. }
                | PlanError::Provider {
                    kind: ProviderErrorKind::Timeout,
                    ..
                }
        )
    }
}
