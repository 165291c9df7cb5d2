//! # STK Push State Machine
//!
//! Bridges a provider-initiated mobile-money push to a locally tracked
//! payment record: `initiate` creates a pending record and fires the push,
//! the provider's asynchronous callback resolves it to settled or rejected,
//! and `query_status` reads the local record with a best-effort provider
//! cross-check. Callback handling is idempotent; replays for an
//! already-resolved record are accepted and ignored.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use metrics::counter;
use sea_orm::{ActiveValue::Set, DatabaseConnection, IntoActiveModel};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::channels::{PaymentChannel, parse_amount_value};
use crate::config::AppConfig;
use crate::error::{PaymentError, is_unique_violation};
use crate::ledger::{PaymentStatus, Period, compute_ledger, resolver::resolve_billing_unit};
use crate::models::payment;
use crate::repositories::{PaymentRepository, ReceiptRepository};

pub mod client;

pub use client::{StkClient, StkQueryResponse};

/// Provider callback payload resolving an initiated push.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StkCallback {
    /// Checkout session id issued at initiation
    pub correlation_id: String,
    /// 0 means the payer approved and funds moved
    pub result_code: i32,
    #[serde(default)]
    pub result_desc: Option<String>,
    #[serde(default)]
    #[schema(value_type = String)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub provider_receipt_id: Option<String>,
    #[serde(default)]
    pub payer_phone: Option<String>,
    #[serde(default)]
    pub transaction_time: Option<String>,
}

/// How a callback was applied; surfaced in logs and tests, never to the
/// provider (which always gets an acknowledgment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackDisposition {
    /// Funds confirmed and the record settled
    Settled,
    /// Push failed or was cancelled; record annotated and still payable
    Rejected,
    /// Record already resolved; replay ignored
    Replayed,
    /// No record matches the correlation id
    Unmatched,
}

/// Local record plus the provider's live view, when reachable.
#[derive(Debug, Serialize, ToSchema)]
pub struct StkStatus {
    #[schema(value_type = Object)]
    pub payment: payment::Model,
    /// Best-effort provider cross-check; absent when the provider is
    /// unreachable
    #[schema(value_type = Object)]
    pub provider: Option<StkQueryResponse>,
}

/// STK push lifecycle service.
pub struct StkService {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
    client: StkClient,
}

impl StkService {
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>) -> Result<Self, PaymentError> {
        let client = StkClient::new(config.stk.clone())?;
        Ok(Self { db, config, client })
    }

    /// Initiate a push for the current billing period.
    ///
    /// A pending payment record is created (or an existing open record for
    /// the period adopted) before the provider call; the push itself runs
    /// with no database transaction held. Push failure leaves the record
    /// pending and annotated so the unit stays payable through any channel.
    pub async fn initiate(
        &self,
        account_reference: &str,
        amount: i64,
        phone: &str,
    ) -> Result<payment::Model, PaymentError> {
        if amount <= 0 {
            return Err(PaymentError::InvalidAmount(format!(
                "push amount must be positive, got {amount}"
            )));
        }
        if phone.trim().is_empty() {
            return Err(PaymentError::MalformedNotification(
                "missing payer phone number".to_string(),
            ));
        }

        let (unit, occupant) = resolve_billing_unit(&self.db, account_reference).await?;
        let period = Period::current();
        let payments = PaymentRepository::new(self.db.clone());

        if let Some(settled) = payments
            .find_settled_for_period(occupant.id, unit.id, period)
            .await?
        {
            return Err(PaymentError::AlreadySettled {
                receipt: settled.receipt_number,
            });
        }

        // Adopt the period's open record when one exists (typically created
        // by the rent generator); otherwise create a fresh pending record.
        let record = match payments
            .find_open_for_period(occupant.id, unit.id, period)
            .await?
        {
            Some(open) => open,
            None => {
                let carried_forward = payments
                    .carried_forward_into(occupant.id, unit.id, period)
                    .await?;
                let outcome = compute_ledger(unit.rent_amount, carried_forward, 0)?;
                let receipt_number = ReceiptRepository::new(self.db.clone())
                    .next_number(period.year)
                    .await?;
                let now = Utc::now().fixed_offset();

                payments
                    .insert(payment::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        occupant_id: Set(occupant.id),
                        unit_id: Set(unit.id),
                        period_month: Set(period.month as i16),
                        period_year: Set(period.year),
                        expected_amount: Set(outcome.expected),
                        paid_amount: Set(0),
                        deficit: Set(outcome.deficit),
                        carried_forward: Set(carried_forward),
                        late_fee: Set(None),
                        status: Set(PaymentStatus::Pending.as_str().to_string()),
                        channel: Set(PaymentChannel::Stk.as_str().to_string()),
                        // Local correlation placeholder until the provider
                        // receipt arrives via callback.
                        external_txn_id: Set(Some(format!("STK-{}", Uuid::new_v4()))),
                        checkout_request_id: Set(None),
                        receipt_number: Set(receipt_number),
                        payer_name: Set(None),
                        payer_phone: Set(Some(phone.to_string())),
                        failure_reason: Set(None),
                        due_date: Set(Some(
                            period.due_date(self.config.generator.due_day).fixed_offset(),
                        )),
                        paid_at: Set(None),
                        created_at: Set(now),
                        updated_at: Set(now),
                    })
                    .await?
            }
        };

        // Provider call with no lock or transaction held.
        match self.client.stk_push(phone, amount, account_reference).await {
            Ok(push) => {
                counter!("stk_push_initiated_total").increment(1);
                let mut active = record.into_active_model();
                active.checkout_request_id = Set(Some(push.checkout_request_id.clone()));
                active.payer_phone = Set(Some(phone.to_string()));
                active.failure_reason = Set(None);
                active.updated_at = Set(Utc::now().fixed_offset());
                let updated = payments.update(active).await?;

                info!(
                    checkout_request_id = %push.checkout_request_id,
                    unit = %unit.unit_number,
                    "STK push initiated, awaiting callback"
                );
                Ok(updated)
            }
            Err(err) => {
                counter!("stk_push_failed_total").increment(1);
                // Keep the record; the unit remains payable and the
                // annotation tells operators what happened.
                let mut active = record.into_active_model();
                active.failure_reason = Set(Some(format!("push initiation failed: {err}")));
                active.updated_at = Set(Utc::now().fixed_offset());
                if let Err(update_err) = payments.update(active).await {
                    warn!(error = ?update_err, "Failed to annotate record after push failure");
                }
                Err(err)
            }
        }
    }

    /// Apply a provider callback. Always safe to call again with the same
    /// payload; replays are ignored.
    pub async fn resolve_callback(
        &self,
        callback: StkCallback,
    ) -> Result<CallbackDisposition, PaymentError> {
        let payments = PaymentRepository::new(self.db.clone());

        let Some(record) = payments
            .find_by_checkout_request_id(&callback.correlation_id)
            .await?
        else {
            counter!("stk_callback_unmatched_total").increment(1);
            warn!(
                correlation_id = %callback.correlation_id,
                "STK callback does not match any pending record"
            );
            return Ok(CallbackDisposition::Unmatched);
        };

        if record.status == PaymentStatus::Paid.as_str() {
            info!(
                correlation_id = %callback.correlation_id,
                "STK callback replay for settled record, ignoring"
            );
            return Ok(CallbackDisposition::Replayed);
        }

        if callback.result_code != 0 {
            if record.failure_reason.is_some() {
                return Ok(CallbackDisposition::Replayed);
            }

            counter!("stk_callback_rejected_total").increment(1);
            let reason = callback
                .result_desc
                .clone()
                .unwrap_or_else(|| format!("provider result code {}", callback.result_code));
            info!(
                correlation_id = %callback.correlation_id,
                reason = %reason,
                "STK push rejected or cancelled; record stays payable"
            );

            let mut active = record.into_active_model();
            active.failure_reason = Set(Some(reason));
            active.updated_at = Set(Utc::now().fixed_offset());
            payments.update(active).await?;
            return Ok(CallbackDisposition::Rejected);
        }

        // Success: funds confirmed. Reclassify against the stored expected
        // amount with the confirmed figure.
        let confirmed = match callback.amount.as_ref() {
            Some(value) => parse_amount_value(value)?,
            None => record.expected_amount - record.paid_amount,
        };
        let new_total = record.paid_amount.saturating_add(confirmed);
        let rent_portion = record.expected_amount - record.carried_forward;
        let outcome = compute_ledger(rent_portion, record.carried_forward, new_total)?;

        // An overdue record stays overdue until fully settled.
        let was_overdue = record.status == PaymentStatus::Overdue.as_str();
        let status = if was_overdue && outcome.status != PaymentStatus::Paid {
            PaymentStatus::Overdue
        } else {
            outcome.status
        };

        let paid_at = callback
            .transaction_time
            .as_deref()
            .and_then(parse_transaction_time)
            .unwrap_or_else(Utc::now);

        let mut active = record.into_active_model();
        active.paid_amount = Set(new_total);
        active.deficit = Set(outcome.deficit);
        active.status = Set(status.as_str().to_string());
        if let Some(receipt_id) = callback
            .provider_receipt_id
            .as_ref()
            .filter(|id| !id.trim().is_empty())
        {
            // The durable transaction identifier replaces the local
            // placeholder.
            active.external_txn_id = Set(Some(receipt_id.trim().to_string()));
        }
        if let Some(phone) = callback.payer_phone.as_ref().filter(|p| !p.is_empty()) {
            active.payer_phone = Set(Some(phone.clone()));
        }
        active.failure_reason = Set(None);
        active.paid_at = Set(Some(paid_at.fixed_offset()));
        active.updated_at = Set(Utc::now().fixed_offset());

        match payments.update(active).await {
            Ok(updated) => {
                counter!("stk_callback_settled_total").increment(1);
                info!(
                    correlation_id = %callback.correlation_id,
                    receipt = %updated.receipt_number,
                    status = %updated.status,
                    "STK push settled"
                );
                Ok(CallbackDisposition::Settled)
            }
            Err(err) if is_unique_violation(&err) => {
                // A racing duplicate callback won; this delivery becomes a
                // replay.
                Ok(CallbackDisposition::Replayed)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Read-through status: the local record, plus the provider's live view
    /// as a secondary signal. Provider unavailability never fails the call.
    pub async fn query_status(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<StkStatus>, PaymentError> {
        let payments = PaymentRepository::new(self.db.clone());
        let Some(record) = payments
            .find_by_checkout_request_id(checkout_request_id)
            .await?
        else {
            return Ok(None);
        };

        let provider = match self.client.query_status(checkout_request_id).await {
            Ok(response) => Some(response),
            Err(err) => {
                warn!(error = %err, "Provider status query failed; returning local record only");
                None
            }
        };

        Ok(Some(StkStatus {
            payment: record,
            provider,
        }))
    }
}

fn parse_transaction_time(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(trimmed, "%Y%m%d%H%M%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_time_formats() {
        assert!(parse_transaction_time("2026-03-05T14:30:00Z").is_some());
        assert!(parse_transaction_time("20260305143000").is_some());
        assert!(parse_transaction_time("yesterday").is_none());
    }

    #[test]
    fn test_callback_deserializes_flat_shape() {
        let callback: StkCallback = serde_json::from_value(serde_json::json!({
            "correlationId": "ws_CO_123",
            "resultCode": 0,
            "amount": "1200.00",
            "providerReceiptId": "SBX999",
            "payerPhone": "254700111222",
            "transactionTime": "20260305143000"
        }))
        .unwrap();

        assert_eq!(callback.correlation_id, "ws_CO_123");
        assert_eq!(callback.result_code, 0);
        assert_eq!(callback.provider_receipt_id.as_deref(), Some("SBX999"));
    }
}
