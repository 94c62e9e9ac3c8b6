// src/api/mod.rs — HTTP API: plan generation over SSE plus read endpoints

pub mod handlers;
pub mod stream;
pub mod types;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::core::orchestrator::GenerationOrchestrator;
use crate::infra::config::ApiConfig;
use crate::memory::StoreHandle;
pub use types::{GenerateRequest, StreamingEvent};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StoreHandle,
    pub orchestrator: Arc<GenerationOrchestrator>,
}

/// Build the axum router with all API routes.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://localhost:5173"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://127.0.0.1:5173"),
        ])
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route(
            "/api/v1/plans/{plan_id}/generate",
            post(handlers::generate_plan),
        )
        .route(
            "/api/v1/plans/{plan_id}/attempts",
            get(handlers::list_attempts),
        )
        .route("/api/v1/plans/{plan_id}/modules", get(handlers::plan_modules))
        .route("/api/v1/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the configured port (blocking until ctrl-c).
pub async fn start_server(config: &ApiConfig, state: ApiState) -> anyhow::Result<()> {
    let addr = format!("127.0.0.1:{}", config.port);

    let router = build_router(state);

    tracing::info!("API server listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down API server");
        })
        .await?;
    Ok(())
}
