// src/core/ledger.rs — Attempt reservation, cap enforcement and finalization

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use super::clock::Clock;
use super::types::{
    count_tasks, AttemptCompletion, AttemptRecord, AttemptStatus, FailureClassification,
    GenerationInput, ParsedModule,
};
use crate::provider::ProviderMetadata;

pub const DEFAULT_ATTEMPT_CAP: u32 = 3;

/// Effective cap from a raw configured value. Anything below 1 falls back to the default.
pub fn resolve_attempt_cap(raw: Option<i64>) -> u32 {
    match raw {
        Some(value) if value >= 1 => u32::try_from(value).unwrap_or(u32::MAX),
        _ => DEFAULT_ATTEMPT_CAP,
    }
}

/// Persistence seam for attempt records and plan content.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Number of numbered attempts recorded for the plan.
    async fn count_attempts(&self, plan_id: &str) -> anyhow::Result<u32>;

    async fn insert_attempt(&self, record: &AttemptRecord) -> anyhow::Result<()>;

    /// Finalize an `in_progress` attempt. Errors if no such attempt exists.
    async fn complete_attempt(&self, completion: &AttemptCompletion)
        -> anyhow::Result<AttemptRecord>;

    async fn list_attempts(&self, plan_id: &str) -> anyhow::Result<Vec<AttemptRecord>>;

    async fn plan_modules(&self, plan_id: &str) -> anyhow::Result<Vec<ParsedModule>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub attempt_id: String,
    pub plan_id: String,
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub sanitized_input: GenerationInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    Capped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub cap: u32,
    pub attempts: u32,
    pub sanitized_input: GenerationInput,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptReservation {
    Reserved(Reservation),
    Rejected(Rejection),
}

/// What a successful attempt produced.
#[derive(Debug, Clone)]
pub struct SuccessOutcome {
    pub modules: Vec<ParsedModule>,
    pub metadata: ProviderMetadata,
    pub duration_ms: u64,
    pub extended_timeout: bool,
}

#[derive(Debug, Clone)]
pub struct FailureOutcome {
    pub classification: FailureClassification,
    pub metadata: Option<ProviderMetadata>,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub extended_timeout: bool,
}

pub struct AttemptLedger {
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
    cap: u32,
}

impl AttemptLedger {
    pub fn new(store: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>, cap: u32) -> Self {
        Self {
            store,
            clock,
            cap: cap.max(1),
        }
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    pub fn store(&self) -> &Arc<dyn AttemptStore> {
        &self.store
    }

    /// Reserve the next attempt number for `plan_id`, or reject once the cap is reached.
    ///
    /// Count and insert are separate store calls, so concurrent reservations for
    /// the same plan can overshoot the cap.
    pub async fn reserve(
        &self,
        plan_id: &str,
        user_id: &str,
        input: &GenerationInput,
    ) -> anyhow::Result<AttemptReservation> {
        let sanitized_input = input.sanitized();
        let attempts = self.store.count_attempts(plan_id).await?;

        if attempts >= self.cap {
            info!(plan_id, attempts, cap = self.cap, "Attempt cap reached");
            return Ok(AttemptReservation::Rejected(Rejection {
                reason: RejectionReason::Capped,
                cap: self.cap,
                attempts,
                sanitized_input,
            }));
        }

        let reservation = Reservation {
            attempt_id: uuid::Uuid::new_v4().to_string(),
            plan_id: plan_id.to_string(),
            attempt_number: attempts + 1,
            started_at: self.clock.now(),
            sanitized_input,
        };

        let record = AttemptRecord {
            id: reservation.attempt_id.clone(),
            plan_id: plan_id.to_string(),
            user_id: user_id.to_string(),
            attempt_number: Some(reservation.attempt_number),
            status: AttemptStatus::InProgress,
            classification: None,
            duration_ms: 0,
            modules_count: 0,
            tasks_count: 0,
            timed_out: false,
            extended_timeout: false,
            input: serde_json::to_value(&reservation.sanitized_input)?,
            metadata: None,
            created_at: reservation.started_at,
            completed_at: None,
        };
        self.store.insert_attempt(&record).await?;

        debug!(
            plan_id,
            attempt_id = %reservation.attempt_id,
            attempt_number = reservation.attempt_number,
            "Attempt reserved"
        );
        Ok(AttemptReservation::Reserved(reservation))
    }

    pub async fn finalize_success(
        &self,
        reservation: &Reservation,
        outcome: SuccessOutcome,
    ) -> anyhow::Result<AttemptRecord> {
        let modules_count = outcome.modules.len() as u32;
        let tasks_count = count_tasks(&outcome.modules) as u32;
        let completion = AttemptCompletion {
            attempt_id: reservation.attempt_id.clone(),
            plan_id: reservation.plan_id.clone(),
            status: AttemptStatus::Success,
            classification: None,
            duration_ms: outcome.duration_ms,
            timed_out: false,
            extended_timeout: outcome.extended_timeout,
            metadata: Some(serde_json::to_value(&outcome.metadata)?),
            modules: Some(outcome.modules),
            modules_count,
            tasks_count,
            completed_at: self.clock.now(),
        };
        self.store.complete_attempt(&completion).await
    }

    pub async fn finalize_failure(
        &self,
        reservation: &Reservation,
        outcome: FailureOutcome,
    ) -> anyhow::Result<AttemptRecord> {
        let metadata = outcome
            .metadata
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let completion = AttemptCompletion {
            attempt_id: reservation.attempt_id.clone(),
            plan_id: reservation.plan_id.clone(),
            status: AttemptStatus::Failure,
            classification: Some(outcome.classification),
            duration_ms: outcome.duration_ms,
            timed_out: outcome.timed_out,
            extended_timeout: outcome.extended_timeout,
            metadata,
            modules: None,
            modules_count: 0,
            tasks_count: 0,
            completed_at: self.clock.now(),
        };
        self.store.complete_attempt(&completion).await
    }

    /// Write the terminal record for a rejected reservation. No attempt number is allocated.
    pub async fn record_capped(
        &self,
        plan_id: &str,
        user_id: &str,
        rejection: &Rejection,
    ) -> anyhow::Result<AttemptRecord> {
        let now = self.clock.now();
        let record = AttemptRecord {
            id: uuid::Uuid::new_v4().to_string(),
            plan_id: plan_id.to_string(),
            user_id: user_id.to_string(),
            attempt_number: None,
            status: AttemptStatus::Failure,
            classification: Some(FailureClassification::Capped),
            duration_ms: 0,
            modules_count: 0,
            tasks_count: 0,
            timed_out: false,
            extended_timeout: false,
            input: serde_json::to_value(&rejection.sanitized_input)?,
            metadata: Some(serde_json::json!({
                "cap": rejection.cap,
                "attempts": rejection.attempts,
            })),
            created_at: now,
            completed_at: Some(now),
        };
        self.store.insert_attempt(&record).await?;
        Ok(record)
    }
}
