//! # STK Push Handlers
//!
//! Initiation is synchronous (the caller needs the provider outcome), the
//! provider callback is always acknowledged, and status queries read through
//! the local record with a best-effort provider cross-check.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::channels::parse_amount_value;
use crate::error::ApiError;
use crate::models::payment;
use crate::stk::{StkCallback, StkStatus};
use crate::server::AppState;

/// Push initiation request.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StkPushRequest {
    pub phone_number: String,
    #[schema(value_type = String)]
    pub amount: serde_json::Value,
    pub account_reference: String,
}

/// Callback acknowledgment; the provider retries until it sees one.
#[derive(Debug, serde::Serialize, ToSchema)]
pub struct StkCallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

/// Initiate an STK push against a billing unit.
#[utoipa::path(
    post,
    path = "/stk/push",
    request_body = StkPushRequest,
    responses(
        (status = 200, description = "Push initiated, awaiting callback", body = Object),
        (status = 404, description = "Unknown unit or vacant unit", body = ApiError),
        (status = 409, description = "Period already settled", body = ApiError),
        (status = 502, description = "Provider credentials rejected", body = ApiError),
        (status = 503, description = "Provider unavailable", body = ApiError)
    ),
    tag = "stk"
)]
pub async fn initiate_push(
    State(state): State<AppState>,
    Json(request): Json<StkPushRequest>,
) -> Result<Json<payment::Model>, ApiError> {
    let amount = parse_amount_value(&request.amount)?;

    let record = state
        .stk
        .initiate(&request.account_reference, amount, &request.phone_number)
        .await?;

    Ok(Json(record))
}

/// Provider callback resolving an initiated push.
///
/// The external caller requires a response regardless of the outcome, so
/// unmatched correlation ids and storage failures are logged and still
/// acknowledged.
#[utoipa::path(
    post,
    path = "/stk/callback",
    request_body = StkCallback,
    responses(
        (status = 200, description = "Always acknowledged", body = StkCallbackAck)
    ),
    tag = "stk"
)]
pub async fn push_callback(
    State(state): State<AppState>,
    Json(callback): Json<StkCallback>,
) -> Json<StkCallbackAck> {
    let correlation_id = callback.correlation_id.clone();

    match state.stk.resolve_callback(callback).await {
        Ok(disposition) => {
            info!(
                correlation_id = %correlation_id,
                disposition = ?disposition,
                "STK callback processed"
            );
        }
        Err(err) => {
            error!(
                correlation_id = %correlation_id,
                error = %err,
                "STK callback processing failed; acknowledging anyway"
            );
        }
    }

    Json(StkCallbackAck {
        result_code: 0,
        result_desc: "Accepted".to_string(),
    })
}

/// Status of an initiated push by checkout session id.
#[utoipa::path(
    get,
    path = "/stk/status/{checkout_request_id}",
    params(
        ("checkout_request_id" = String, Path, description = "Provider checkout session id")
    ),
    responses(
        (status = 200, description = "Local record plus provider view", body = StkStatus),
        (status = 404, description = "No record matches the checkout id", body = ApiError)
    ),
    tag = "stk"
)]
pub async fn push_status(
    State(state): State<AppState>,
    Path(checkout_request_id): Path<String>,
) -> Result<Json<StkStatus>, ApiError> {
    let status = state
        .stk
        .query_status(&checkout_request_id)
        .await?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "no push matches that checkout id",
            )
        })?;

    Ok(Json(status))
}
