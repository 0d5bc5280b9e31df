use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::alert::{compose_daily_summary, rollup, DailyRollup};
use crate::ingest::{Orchestrator, RunOptions, RunOutcome};
use crate::model::{RunRecord, SourceCheck};
use crate::recorder::RunRecorder;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub recorder: Arc<dyn RunRecorder>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let recorder = orchestrator.recorder();
        Self {
            orchestrator,
            recorder,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/runs", post(trigger_run).get(list_runs))
        .route("/runs/{run_id}/checks", get(run_checks))
        .route("/summary", get(summary))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Recorder failures surface as a JSON 500, never as a raw error chain.
struct ApiError(anyhow::Error);

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %format!("{:#}", self.0), "api request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

async fn trigger_run(
    State(state): State<AppState>,
    Json(opts): Json<RunOptions>,
) -> (StatusCode, Json<RunOutcome>) {
    let outcome = state.orchestrator.trigger(opts).await;
    let code = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, Json(outcome))
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

async fn list_runs(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<RunRecord>>, ApiError> {
    let limit = q.limit.unwrap_or(20).clamp(1, 200);
    Ok(Json(state.recorder.recent_runs(limit).await?))
}

async fn run_checks(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Vec<SourceCheck>>, ApiError> {
    Ok(Json(state.recorder.checks_for_run(&run_id).await?))
}

#[derive(Deserialize)]
struct SummaryQuery {
    hours: Option<u32>,
}

#[derive(Serialize)]
struct SummaryOut {
    window_hours: u32,
    rollup: DailyRollup,
    text: String,
}

async fn summary(
    State(state): State<AppState>,
    Query(q): Query<SummaryQuery>,
) -> Result<Json<SummaryOut>, ApiError> {
    let hours = q
        .hours
        .filter(|h| *h > 0)
        .unwrap_or(state.orchestrator.config().summary_window_hours);
    let now = Utc::now();
    let checks = state
        .recorder
        .checks_since(now - Duration::hours(i64::from(hours)))
        .await?;
    Ok(Json(SummaryOut {
        window_hours: hours,
        rollup: rollup(&checks, hours, now),
        text: compose_daily_summary(&checks, hours, now).text,
    }))
}
