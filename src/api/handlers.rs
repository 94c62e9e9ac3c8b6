// src/api/handlers.rs

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{BoxError, Json};

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::stream::{create_event_stream, EventStream};
use crate::api::{types::*, ApiState};
use crate::core::ledger::AttemptStore;
use crate::core::orchestrator::{GenerationContext, GenerationOrchestrator};
use crate::core::types::GenerationResult;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

fn internal_error(e: anyhow::Error) -> ApiError {
    tracing::error!("API request failed: {e:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "INTERNAL_ERROR".into(),
        }),
    )
}

/// POST /api/v1/plans/{plan_id}/generate — Run one attempt, streaming progress as SSE.
pub async fn generate_plan(
    State(state): State<ApiState>,
    Path(plan_id): Path<String>,
    Json(body): Json<GenerateRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, BoxError>>>, ApiError> {
    if body.user_id.trim().is_empty() {
        return Err(bad_request("userId cannot be empty"));
    }
    if body.input.topic.trim().is_empty() {
        return Err(bad_request("Topic cannot be empty"));
    }

    let ctx = GenerationContext::new(plan_id, body.user_id, body.input);
    let stream = generation_stream(state.orchestrator.clone(), ctx, None)
        .map(|item| -> Result<Event, BoxError> {
            let event = item?;
            Ok(Event::default().json_data(&event)?)
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Run one attempt on its own task, reporting `start` then `complete` or `error`.
pub fn generation_stream(
    orchestrator: Arc<GenerationOrchestrator>,
    ctx: GenerationContext,
    parent: Option<&CancellationToken>,
) -> EventStream {
    create_event_stream(parent, move |channel| async move {
        channel.emit(&StreamingEvent::start(&ctx.plan_id, &ctx.input));

        match orchestrator.run(&ctx, Some(channel.signal())).await {
            Ok(GenerationResult::Success(success)) => {
                channel.emit(&StreamingEvent::complete(&ctx.plan_id, &success));
            }
            Ok(GenerationResult::Failure(failure)) => {
                channel.emit(&StreamingEvent::failure(&ctx.plan_id, &failure));
            }
            Err(e) => {
                channel.emit(&StreamingEvent::internal_error(&ctx.plan_id));
                return Err(e);
            }
        }
        Ok(())
    })
}

/// GET /api/v1/plans/{plan_id}/attempts — Attempt history, oldest first.
pub async fn list_attempts(
    State(state): State<ApiState>,
    Path(plan_id): Path<String>,
) -> Result<Json<AttemptsResponse>, ApiError> {
    let attempts = state
        .store
        .list_attempts(&plan_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(AttemptsResponse { plan_id, attempts }))
}

/// GET /api/v1/plans/{plan_id}/modules — Modules from the latest successful attempt.
pub async fn plan_modules(
    State(state): State<ApiState>,
    Path(plan_id): Path<String>,
) -> Result<Json<ModulesResponse>, ApiError> {
    let modules = state
        .store
        .plan_modules(&plan_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(ModulesResponse { plan_id, modules }))
}

/// GET /api/v1/health — Simple health check.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
