//! # Batch Job Handlers
//!
//! Operator-triggered one-shot runs of the overdue sweeper and the monthly
//! rent generator. Parameters default from configuration and may be
//! overridden per call.

use axum::{extract::State, response::Json};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::jobs::{
    GenerationSummary, GeneratorParams, MonthlyRentGenerator, OverdueSweeper, SweepParams,
    SweepStats,
};
use crate::ledger::Period;
use crate::server::AppState;

/// Sweep overrides; omitted fields fall back to configuration.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepRequest {
    pub grace_period_days: Option<i64>,
    pub late_fee_percent: Option<f64>,
}

/// Generation overrides; period defaults to the current month.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub month: Option<i32>,
    pub year: Option<i32>,
    pub due_day: Option<u8>,
}

/// Run the overdue sweeper once.
#[utoipa::path(
    post,
    path = "/jobs/sweep",
    request_body = SweepRequest,
    responses(
        (status = 200, description = "Sweep statistics", body = SweepStats)
    ),
    tag = "jobs"
)]
pub async fn run_sweep(
    State(state): State<AppState>,
    Json(overrides): Json<SweepRequest>,
) -> Result<Json<SweepStats>, ApiError> {
    let mut params = SweepParams::from_config(&state.config);
    if let Some(grace) = overrides.grace_period_days {
        params.grace_period_days = grace;
    }
    if let Some(percent) = overrides.late_fee_percent {
        params.late_fee_percent = percent;
    }

    let sweeper = OverdueSweeper::new(state.config.clone(), state.db.clone());
    let stats = sweeper.run_once(params).await?;
    Ok(Json(stats))
}

/// Run the monthly rent generator once for a target period.
#[utoipa::path(
    post,
    path = "/jobs/generate-rent",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Generation summary", body = GenerationSummary),
        (status = 400, description = "Invalid period", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn run_generation(
    State(state): State<AppState>,
    Json(overrides): Json<GenerateRequest>,
) -> Result<Json<GenerationSummary>, ApiError> {
    let period = match (overrides.month, overrides.year) {
        (Some(month), Some(year)) => Period::from_parts(month, year)?,
        (None, None) => Period::from_date(Utc::now()),
        _ => {
            return Err(ApiError::new(
                axum::http::StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "month and year must be supplied together",
            ));
        }
    };

    let mut params = GeneratorParams::from_config(&state.config);
    if let Some(due_day) = overrides.due_day {
        params.due_day = due_day;
    }

    let generator = MonthlyRentGenerator::new(state.config.clone(), state.db.clone());
    let summary = generator.run_for_period(period, params).await?;
    Ok(Json(summary))
}
