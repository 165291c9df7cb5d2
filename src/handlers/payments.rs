//! # Payment Handlers
//!
//! Synchronous direct-entry posting plus the query surface over payment
//! records: by id, by receipt number, and filtered listings.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::channels::paybill::DirectEntry;
use crate::error::ApiError;
use crate::ledger::{PaymentStatus, Period};
use crate::models::payment;
use crate::repositories::{PaymentRepository, payment::PaymentFilter};
use crate::server::AppState;

const DEFAULT_LIST_LIMIT: u64 = 100;
const MAX_LIST_LIMIT: u64 = 500;

/// Posting response carrying the receipt identifier.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub receipt_number: String,
    /// True when the request replayed an already-recorded transaction
    pub duplicate: bool,
    #[schema(value_type = Object)]
    pub payment: payment::Model,
}

/// Listing filters.
#[derive(Debug, Deserialize, IntoParams)]
pub struct PaymentListQuery {
    pub occupant_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    /// Billing month, 1-12; requires `year`
    pub month: Option<i32>,
    pub year: Option<i32>,
    /// pending, partial, paid, overdue
    pub status: Option<String>,
    pub limit: Option<u64>,
}

/// Record a payment captured manually or via a trusted API client.
///
/// Unlike the webhook channels the caller waits for the posting result; a
/// replayed transaction id returns the existing receipt with `duplicate:
/// true` instead of an error.
#[utoipa::path(
    post,
    path = "/payments",
    request_body = DirectEntry,
    responses(
        (status = 201, description = "Payment recorded", body = PaymentResponse),
        (status = 200, description = "Idempotent replay of an existing payment", body = PaymentResponse),
        (status = 400, description = "Malformed payload or invalid amount", body = ApiError),
        (status = 404, description = "Unknown unit or vacant unit", body = ApiError),
        (status = 409, description = "Period already settled", body = ApiError)
    ),
    tag = "payments"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    Json(entry): Json<DirectEntry>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let intent = entry.normalize()?;
    let outcome = state.posting.post(intent).await?;

    let status = if outcome.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(PaymentResponse {
            receipt_number: outcome.payment.receipt_number.clone(),
            duplicate: outcome.duplicate,
            payment: outcome.payment,
        }),
    ))
}

/// Fetch a payment record by id.
#[utoipa::path(
    get,
    path = "/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment record id")),
    responses(
        (status = 200, description = "Payment record", body = Object),
        (status = 404, description = "No such record", body = ApiError)
    ),
    tag = "payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<payment::Model>, ApiError> {
    let record = PaymentRepository::new(state.db.clone())
        .find_by_id(id)
        .await?
        .ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "no such payment record")
        })?;

    Ok(Json(record))
}

/// Fetch a payment record by receipt number.
#[utoipa::path(
    get,
    path = "/payments/receipt/{receipt_number}",
    params(("receipt_number" = String, Path, description = "Receipt identifier")),
    responses(
        (status = 200, description = "Payment record", body = Object),
        (status = 404, description = "No such receipt", body = ApiError)
    ),
    tag = "payments"
)]
pub async fn get_payment_by_receipt(
    State(state): State<AppState>,
    Path(receipt_number): Path<String>,
) -> Result<Json<payment::Model>, ApiError> {
    let record = PaymentRepository::new(state.db.clone())
        .find_by_receipt_number(&receipt_number)
        .await?
        .ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "no such receipt")
        })?;

    Ok(Json(record))
}

/// List payment records, newest first.
#[utoipa::path(
    get,
    path = "/payments",
    params(PaymentListQuery),
    responses(
        (status = 200, description = "Matching payment records", body = Object),
        (status = 400, description = "Invalid filter", body = ApiError)
    ),
    tag = "payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentListQuery>,
) -> Result<Json<Vec<payment::Model>>, ApiError> {
    let period = match (query.month, query.year) {
        (Some(month), Some(year)) => Some(Period::from_parts(month, year)?),
        (Some(_), None) | (None, Some(_)) => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "month and year filters must be supplied together",
            ));
        }
        (None, None) => None,
    };

    let status = match query.status.as_deref() {
        Some(raw) => Some(PaymentStatus::parse(raw).ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "status must be one of pending, partial, paid, overdue",
            )
        })?),
        None => None,
    };

    let filter = PaymentFilter {
        occupant_id: query.occupant_id,
        unit_id: query.unit_id,
        period,
        status,
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);

    let records = PaymentRepository::new(state.db.clone())
        .list(filter, limit)
        .await?;

    Ok(Json(records))
}
