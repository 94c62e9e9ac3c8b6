// src/api/types.rs

use serde::{Deserialize, Serialize};

use crate::core::classifier::{sanitize, SanitizedFailure};
use crate::core::types::{
    AttemptRecord, FailureClassification, GenerationFailure, GenerationInput, GenerationSuccess,
    ParsedModule,
};

/// Request body for `POST /api/v1/plans/{plan_id}/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub user_id: String,
    pub input: GenerationInput,
}

/// Payloads pushed over the generation event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamingEvent {
    #[serde(rename_all = "camelCase")]
    Start {
        plan_id: String,
        input: GenerationInput,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        plan_id: String,
        attempt_id: String,
        attempt_number: Option<u32>,
        modules: Vec<ParsedModule>,
        modules_count: u32,
        tasks_count: u32,
        duration_ms: u64,
        extended_timeout: bool,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        plan_id: String,
        #[serde(flatten)]
        failure: SanitizedFailure,
    },
}

impl StreamingEvent {
    pub fn start(plan_id: &str, input: &GenerationInput) -> Self {
        StreamingEvent::Start {
            plan_id: plan_id.to_string(),
            input: input.sanitized(),
        }
    }

    pub fn complete(plan_id: &str, success: &GenerationSuccess) -> Self {
        StreamingEvent::Complete {
            plan_id: plan_id.to_string(),
            attempt_id: success.attempt.id.clone(),
            attempt_number: success.attempt.attempt_number,
            modules: success.modules.clone(),
            modules_count: success.attempt.modules_count,
            tasks_count: success.attempt.tasks_count,
            duration_ms: success.duration_ms,
            extended_timeout: success.extended_timeout,
        }
    }

    pub fn failure(plan_id: &str, failure: &GenerationFailure) -> Self {
        Self::error(plan_id, failure.classification)
    }

    pub fn error(plan_id: &str, classification: FailureClassification) -> Self {
        StreamingEvent::Error {
            plan_id: plan_id.to_string(),
            failure: sanitize(classification),
        }
    }

    /// Opaque error for infrastructure faults.
    pub fn internal_error(plan_id: &str) -> Self {
        StreamingEvent::Error {
            plan_id: plan_id.to_string(),
            failure: SanitizedFailure {
                code: "INTERNAL_ERROR".into(),
                message: "Something went wrong while generating the plan.".into(),
                retryable: true,
            },
        }
    }
}

/// Response for the attempt listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptsResponse {
    pub plan_id: String,
    pub attempts: Vec<AttemptRecord>,
}

/// Response for the plan's current modules.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulesResponse {
    pub plan_id: String,
    pub modules: Vec<ParsedModule>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
