// src/core/orchestrator.rs — One generation attempt, end to end

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::classifier::classify;
use super::clock::Clock;
use super::ledger::{AttemptLedger, AttemptReservation, FailureOutcome, Reservation, SuccessOutcome};
use super::pacing::pace_plan;
use super::parser::{parse_plan_stream, ParsedPlan};
use super::timeout::{AdaptiveTimeout, TimeoutConfig};
use super::types::*;
use crate::infra::errors::PlanError;
use crate::provider::{GenerateOptions, PlanProvider, ProviderMetadata};

/// Who is generating what.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub plan_id: String,
    pub user_id: String,
    pub input: GenerationInput,
    /// Overrides the orchestrator's timeout for this call.
    pub timeout: Option<TimeoutConfig>,
}

impl GenerationContext {
    pub fn new(plan_id: impl Into<String>, user_id: impl Into<String>, input: GenerationInput) -> Self {
        Self {
            plan_id: plan_id.into(),
            user_id: user_id.into(),
            input,
            timeout: None,
        }
    }
}

/// Drives reserve → generate → parse → pace → persist for a single attempt.
pub struct GenerationOrchestrator {
    provider: Arc<dyn PlanProvider>,
    ledger: AttemptLedger,
    timeout: TimeoutConfig,
    clock: Arc<dyn Clock>,
}

/// Provider/parse phase outcome before persistence.
type AttemptOutcome = Result<(ParsedPlan, ProviderMetadata), (PlanError, Option<ProviderMetadata>)>;

impl GenerationOrchestrator {
    pub fn new(
        provider: Arc<dyn PlanProvider>,
        ledger: AttemptLedger,
        timeout: TimeoutConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            ledger,
            timeout,
            clock,
        }
    }

    pub fn ledger(&self) -> &AttemptLedger {
        &self.ledger
    }

    /// Run one attempt. Expected failures come back as `GenerationResult::Failure`;
    /// only persistence faults surface as `Err`.
    pub async fn run(
        &self,
        ctx: &GenerationContext,
        cancel: Option<&CancellationToken>,
    ) -> anyhow::Result<GenerationResult> {
        let reservation = match self
            .ledger
            .reserve(&ctx.plan_id, &ctx.user_id, &ctx.input)
            .await?
        {
            AttemptReservation::Reserved(r) => r,
            AttemptReservation::Rejected(rejection) => {
                let attempt = self
                    .ledger
                    .record_capped(&ctx.plan_id, &ctx.user_id, &rejection)
                    .await?;
                let classification = classify(None, false, Some(FailureClassification::Capped));
                warn!(
                    plan_id = %ctx.plan_id,
                    attempt_id = %attempt.id,
                    %classification,
                    "Generation rejected"
                );
                return Ok(GenerationResult::Failure(GenerationFailure {
                    classification,
                    error: PlanError::AttemptCapped {
                        plan_id: ctx.plan_id.clone(),
                        cap: rejection.cap,
                    },
                    duration_ms: 0,
                    extended_timeout: false,
                    timed_out: false,
                    attempt,
                }));
            }
        };

        let timeout = ctx.timeout.unwrap_or(self.timeout);
        let started = Instant::now();
        let timer = match cancel {
            Some(parent) => AdaptiveTimeout::start_with_parent(timeout, parent),
            None => AdaptiveTimeout::start(timeout),
        };

        let outcome = self.generate(&reservation, &timer, timeout).await;

        timer.cancel();
        let duration_ms = started.elapsed().as_millis() as u64;
        let extended_timeout = timer.did_extend();

        match outcome {
            Ok((plan, metadata)) => {
                let modules = pace_plan(
                    &plan.modules,
                    &reservation.sanitized_input,
                    self.clock.today(),
                );
                let attempt = self
                    .ledger
                    .finalize_success(
                        &reservation,
                        SuccessOutcome {
                            modules: modules.clone(),
                            metadata: metadata.clone(),
                            duration_ms,
                            extended_timeout,
                        },
                    )
                    .await?;

                info!(
                    plan_id = %ctx.plan_id,
                    attempt_id = %attempt.id,
                    attempt_number = reservation.attempt_number,
                    duration_ms,
                    modules = attempt.modules_count,
                    tasks = attempt.tasks_count,
                    extended_timeout,
                    "Generation succeeded"
                );

                Ok(GenerationResult::Success(GenerationSuccess {
                    modules,
                    raw_text: plan.raw_text,
                    metadata,
                    duration_ms,
                    extended_timeout,
                    attempt,
                }))
            }
            Err((error, metadata)) => {
                let timed_out = timer.timed_out() || error.is_timeout();
                let classification = classify(Some(&error), timed_out, None);

                warn!(
                    plan_id = %ctx.plan_id,
                    attempt_id = %reservation.attempt_id,
                    attempt_number = reservation.attempt_number,
                    %classification,
                    duration_ms,
                    timed_out,
                    error = %error,
                    "Generation failed"
                );

                let attempt = self
                    .ledger
                    .finalize_failure(
                        &reservation,
                        FailureOutcome {
                            classification,
                            metadata,
                            duration_ms,
                            timed_out,
                            extended_timeout,
                        },
                    )
                    .await?;

                Ok(GenerationResult::Failure(GenerationFailure {
                    classification,
                    error,
                    duration_ms,
                    extended_timeout,
                    timed_out,
                    attempt,
                }))
            }
        }
    }

    async fn generate(
        &self,
        reservation: &Reservation,
        timer: &AdaptiveTimeout,
        timeout: TimeoutConfig,
    ) -> AttemptOutcome {
        let signal = timer.signal().clone();
        let options = GenerateOptions {
            signal: signal.clone(),
            timeout: timeout.max_total(),
        };

        let response = tokio::select! {
            biased;
            _ = signal.cancelled() => Err(PlanError::Cancelled),
            r = self.provider.generate(&reservation.sanitized_input, options) => r,
        };
        let response = response.map_err(|e| (e, None))?;

        let metadata = response.metadata;
        match parse_plan_stream(response.stream, &signal, || {
            timer.notify_first_module();
        })
        .await
        {
            Ok(plan) => Ok((plan, metadata)),
            Err(e) => Err((e, Some(metadata))),
        }
    }
}
