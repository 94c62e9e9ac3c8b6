// src/core/classifier.rs — Failure classification and client-safe sanitizing

use serde::{Deserialize, Serialize};

use super::types::FailureClassification;
use crate::infra::errors::{ParseErrorKind, PlanError, ProviderErrorKind};

/// Map an attempt failure to the closed taxonomy.
///
/// Precedence, highest first: a forced classification, the timeout flag or a
/// timeout-kind error, a rate-limit error, a parser validation error, the
/// `kind` carried by a generic provider error. Anything else is a provider
/// error.
pub fn classify(
    error: Option<&PlanError>,
    timed_out: bool,
    forced: Option<FailureClassification>,
) -> FailureClassification {
    if let Some(forced) = forced {
        return forced;
    }

    if timed_out || matches!(error, Some(PlanError::ProviderTimeout { .. })) {
        return FailureClassification::Timeout;
    }

    match error {
        Some(PlanError::RateLimited { .. }) => FailureClassification::RateLimit,
        Some(PlanError::Parse {
            kind: ParseErrorKind::Validation,
            ..
        }) => FailureClassification::Validation,
        Some(PlanError::Provider { kind, .. }) => match kind {
            ProviderErrorKind::RateLimit => FailureClassification::RateLimit,
            ProviderErrorKind::Timeout => FailureClassification::Timeout,
            ProviderErrorKind::Upstream => FailureClassification::ProviderError,
        },
        _ => FailureClassification::ProviderError,
    }
}

/// The only failure shape that leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedFailure {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

pub fn sanitize(classification: FailureClassification) -> SanitizedFailure {
    let (code, message, retryable) = match classification {
        FailureClassification::Timeout => (
            "GENERATION_TIMEOUT",
            "Plan generation took too long and was stopped. Please try again.",
            true,
        ),
        FailureClassification::RateLimit => (
            "RATE_LIMITED",
            "The generation service is busy right now. Please wait a moment and retry.",
            true,
        ),
        FailureClassification::ProviderError => (
            "PROVIDER_ERROR",
            "The generation service returned an error. Please try again.",
            true,
        ),
        FailureClassification::Validation => (
            "INVALID_OUTPUT",
            "The generated plan could not be understood. Try adjusting your topic or notes.",
            false,
        ),
        FailureClassification::Capped => (
            "ATTEMPT_CAP_REACHED",
            "This plan has reached its maximum number of generation attempts.",
            false,
        ),
        FailureClassification::InProgress => (
            "GENERATION_IN_PROGRESS",
            "A generation for this plan is already running.",
            true,
        ),
        FailureClassification::Unknown => (
            "GENERATION_FAILED",
            "Plan generation failed.",
            false,
        ),
    };

    SanitizedFailure {
        code: code.into(),
        message: message.into(),
        retryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_err(kind: ProviderErrorKind) -> PlanError {
        PlanError::Provider {
            provider: "test".into(),
            message: "boom".into(),
            kind,
        }
    }

    #[test]
    fn test_forced_always_wins() {
        let err = PlanError::ProviderTimeout {
            provider: "test".into(),
            timeout_ms: 10,
        };
        assert_eq!(
            classify(Some(&err), true, Some(FailureClassification::Capped)),
            FailureClassification::Capped
        );
        assert_eq!(
            classify(None, false, Some(FailureClassification::InProgress)),
            FailureClassification::InProgress
        );
    }

    #[test]
    fn test_timed_out_flag_beats_error_kind() {
        let err = PlanError::RateLimited {
            provider: "test".into(),
            retry_after_ms: 0,
        };
        assert_eq!(classify(Some(&err), true, None), FailureClassification::Timeout);
        assert_eq!(
            classify(Some(&PlanError::Cancelled), true, None),
            FailureClassification::Timeout
        );
    }

    #[test]
    fn test_timeout_error() {
        let err = PlanError::ProviderTimeout {
            provider: "test".into(),
            timeout_ms: 10,
        };
        assert_eq!(classify(Some(&err), false, None), FailureClassification::Timeout);
    }

    #[test]
    fn test_rate_limited() {
        let err = PlanError::RateLimited {
            provider: "test".into(),
            retry_after_ms: 500,
        };
        assert_eq!(classify(Some(&err), false, None), FailureClassification::RateLimit);
    }

    #[test]
    fn test_parse_errors() {
        let err = PlanError::validation("bad json");
        assert_eq!(classify(Some(&err), false, None), FailureClassification::Validation);

        let err = PlanError::Parse {
            kind: ParseErrorKind::EmptyOutput,
            message: "nothing".into(),
        };
        assert_eq!(
            classify(Some(&err), false, None),
            FailureClassification::ProviderError
        );
    }

    #[test]
    fn test_provider_error_kind_mapping() {
        assert_eq!(
            classify(Some(&provider_err(ProviderErrorKind::RateLimit)), false, None),
            FailureClassification::RateLimit
        );
        assert_eq!(
            classify(Some(&provider_err(ProviderErrorKind::Timeout)), false, None),
            FailureClassification::Timeout
        );
        assert_eq!(
            classify(Some(&provider_err(ProviderErrorKind::Upstream)), false, None),
            FailureClassification::ProviderError
        );
    }

    #[test]
    fn test_default_is_provider_error() {
        assert_eq!(classify(None, false, None), FailureClassification::ProviderError);
        assert_eq!(
            classify(Some(&PlanError::Cancelled), false, None),
            FailureClassification::ProviderError
        );
    }

    #[test]
    fn test_classify_is_deterministic() {
        let err = provider_err(ProviderErrorKind::RateLimit);
        let first = classify(Some(&err), false, None);
        for _ in 0..10 {
            assert_eq!(classify(Some(&err), false, None), first);
        }
    }

    #[test]
    fn test_sanitize_retryable_split() {
        for c in [
            FailureClassification::Timeout,
            FailureClassification::RateLimit,
            FailureClassification::ProviderError,
            FailureClassification::InProgress,
        ] {
            assert!(sanitize(c).retryable, "{c} should be retryable");
        }
        for c in [FailureClassification::Validation, FailureClassification::Capped] {
            assert!(!sanitize(c).retryable, "{c} should not be retryable");
        }
    }

    #[test]
    fn test_sanitize_codes_are_distinct() {
        let all = [
            FailureClassification::Timeout,
            FailureClassification::RateLimit,
            FailureClassification::ProviderError,
            FailureClassification::Validation,
            FailureClassification::Capped,
            FailureClassification::InProgress,
            FailureClassification::Unknown,
        ];
        let mut codes: Vec<String> = all.iter().map(|c| sanitize(*c).code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
