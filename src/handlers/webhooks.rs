//! # Webhook Handlers
//!
//! Endpoints receiving payment notifications from external channels. Every
//! webhook-style channel is acknowledged before ledger posting completes:
//! the handler normalizes the payload, spawns the posting as a detached
//! task, and answers inside the caller's delivery timeout. Posting failures
//! are logged and counted, never surfaced to the external caller, and never
//! retried here; the external system's own redelivery is the retry
//! mechanism.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::channels::{
    PaymentIntent,
    bank::{self, BankNotification},
    generic::GenericNotification,
    mpesa::{C2bConfirmation, C2bResponse, C2bValidation},
};
use crate::error::{ApiError, PaymentError};
use crate::ledger::PostingService;
use crate::ledger::resolver::resolve_billing_unit;
use crate::server::AppState;

/// Webhook accept response for the bank and generic channels.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAcceptResponse {
    /// Acceptance status
    pub status: String,
}

impl WebhookAcceptResponse {
    fn accepted() -> Self {
        Self {
            status: "accepted".to_string(),
        }
    }
}

/// Post an intent to the ledger on a detached task. The acknowledgment path
/// never awaits this and its cancellation cannot cancel the posting.
fn spawn_posting(posting: PostingService, intent: PaymentIntent) {
    let channel = intent.channel;
    tokio::spawn(async move {
        match posting.post(intent).await {
            Ok(outcome) if outcome.duplicate => {
                info!(
                    channel = %channel,
                    receipt = %outcome.payment.receipt_number,
                    "Webhook replayed an already-recorded transaction"
                );
            }
            Ok(outcome) => {
                info!(
                    channel = %channel,
                    receipt = %outcome.payment.receipt_number,
                    status = %outcome.payment.status,
                    "Webhook payment posted"
                );
            }
            Err(err) if err.is_terminal_for_notification() => {
                counter!("webhook_notifications_dropped_total", "channel" => channel.as_str())
                    .increment(1);
                warn!(channel = %channel, error = %err, "Dropped unpostable webhook notification");
            }
            Err(err) => {
                counter!("webhook_postings_failed_total", "channel" => channel.as_str())
                    .increment(1);
                error!(channel = %channel, error = %err, "Webhook ledger posting failed");
            }
        }
    });
}

/// Mobile-money C2B confirmation: funds have moved, record them.
///
/// The provider requires `ResultCode: 0` within its delivery timeout no
/// matter what happens internally, so the response never depends on posting.
#[utoipa::path(
    post,
    path = "/webhooks/mpesa/confirmation",
    request_body = C2bConfirmation,
    responses(
        (status = 200, description = "Always acknowledged", body = C2bResponse)
    ),
    tag = "webhooks"
)]
pub async fn mpesa_confirmation(
    State(state): State<AppState>,
    body: Bytes,
) -> Json<C2bResponse> {
    let payload: C2bConfirmation = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            counter!("webhook_notifications_dropped_total", "channel" => "mpesa-c2b")
                .increment(1);
            warn!(error = %err, "Unparseable C2B confirmation; acknowledging anyway");
            return Json(C2bResponse::accepted());
        }
    };

    match payload.normalize() {
        Ok(intent) => spawn_posting(state.posting.clone(), intent),
        Err(err) => {
            counter!("webhook_notifications_dropped_total", "channel" => "mpesa-c2b")
                .increment(1);
            warn!(error = %err, "Invalid C2B confirmation; acknowledging anyway");
        }
    }

    Json(C2bResponse::accepted())
}

/// Mobile-money C2B validation: the provider asks whether to accept a
/// pay-bill transaction before funds move. Unknown or vacant units are
/// rejected pre-emptively; an internal failure defaults to accept so a
/// database blip never blocks legitimate payment capture.
#[utoipa::path(
    post,
    path = "/webhooks/mpesa/validation",
    request_body = C2bValidation,
    responses(
        (status = 200, description = "Accept or reject decision", body = C2bResponse)
    ),
    tag = "webhooks"
)]
pub async fn mpesa_validation(
    State(state): State<AppState>,
    Json(payload): Json<C2bValidation>,
) -> Json<C2bResponse> {
    match resolve_billing_unit(&state.db, &payload.bill_ref_number).await {
        Ok((unit, _occupant)) => {
            info!(unit = %unit.unit_number, "C2B validation accepted");
            Json(C2bResponse::accepted())
        }
        Err(
            err @ (PaymentError::UnitNotFound { .. }
            | PaymentError::NoOccupant { .. }
            | PaymentError::MalformedNotification(_)),
        ) => {
            info!(error = %err, "C2B validation rejected");
            Json(C2bResponse::rejected("Invalid account reference"))
        }
        Err(err) => {
            error!(error = %err, "C2B validation failed internally; defaulting to accept");
            Json(C2bResponse::accepted())
        }
    }
}

/// Bank transfer webhook. When a bank webhook secret is configured the
/// delivery must carry a valid body signature; everything else about the
/// payload is handled after the acknowledgment.
#[utoipa::path(
    post,
    path = "/webhooks/bank",
    request_body = BankNotification,
    responses(
        (status = 202, description = "Webhook accepted", body = WebhookAcceptResponse),
        (status = 401, description = "Signature verification failed", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn bank_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAcceptResponse>), ApiError> {
    if let Some(secret) = state.config.webhook_bank_secret.as_deref() {
        let provided = headers
            .get(bank::SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "INVALID_SIGNATURE",
                    "Missing bank webhook signature",
                )
            })?;

        if bank::verify_signature(secret, &body, provided).is_err() {
            warn!("Bank webhook signature verification failed");
            return Err(ApiError::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_SIGNATURE",
                "Invalid bank webhook signature",
            ));
        }
    }

    match serde_json::from_slice::<BankNotification>(&body) {
        Ok(payload) => match payload.normalize() {
            Ok(intent) => spawn_posting(state.posting.clone(), intent),
            Err(err) => {
                counter!("webhook_notifications_dropped_total", "channel" => "bank")
                    .increment(1);
                warn!(error = %err, "Invalid bank notification; acknowledging anyway");
            }
        },
        Err(err) => {
            counter!("webhook_notifications_dropped_total", "channel" => "bank").increment(1);
            warn!(error = %err, "Unparseable bank notification; acknowledging anyway");
        }
    }

    Ok((StatusCode::ACCEPTED, Json(WebhookAcceptResponse::accepted())))
}

/// Generic payment webhook for smaller integrations.
#[utoipa::path(
    post,
    path = "/webhooks/payments",
    request_body = GenericNotification,
    responses(
        (status = 202, description = "Webhook accepted", body = WebhookAcceptResponse)
    ),
    tag = "webhooks"
)]
pub async fn generic_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<WebhookAcceptResponse>) {
    match serde_json::from_slice::<GenericNotification>(&body) {
        Ok(payload) => match payload.normalize() {
            Ok(intent) => spawn_posting(state.posting.clone(), intent),
            Err(err) => {
                counter!("webhook_notifications_dropped_total", "channel" => "generic")
                    .increment(1);
                warn!(error = %err, "Invalid generic notification; acknowledging anyway");
            }
        },
        Err(err) => {
            counter!("webhook_notifications_dropped_total", "channel" => "generic").increment(1);
            warn!(error = %err, "Unparseable generic notification; acknowledging anyway");
        }
    }

    (StatusCode::ACCEPTED, Json(WebhookAcceptResponse::accepted()))
}
