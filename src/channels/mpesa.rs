//! Mobile-money pay-bill (C2B) channel adapter.
//!
//! Handles the confirmation webhook (funds have moved) and the validation
//! pre-check (the provider asks whether to accept before moving funds). The
//! provider expects a `{ResultCode, ResultDesc}` acknowledgment on both
//! endpoints regardless of what happened internally.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::channels::{PaymentChannel, PaymentIntent, non_empty, parse_amount_value};
use crate::error::PaymentError;

/// C2B confirmation payload: the provider reports a completed pay-bill
/// transaction. `BillRefNumber` carries the account reference the payer
/// typed at the till.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct C2bConfirmation {
    #[serde(rename = "TransID")]
    pub trans_id: String,
    /// Provider-local timestamp in `YYYYMMDDHHMMSS` form
    #[serde(rename = "TransTime", default)]
    pub trans_time: Option<String>,
    #[serde(rename = "TransAmount")]
    #[schema(value_type = String)]
    pub trans_amount: serde_json::Value,
    #[serde(rename = "BillRefNumber", default)]
    pub bill_ref_number: String,
    #[serde(rename = "MSISDN", default)]
    pub msisdn: Option<String>,
    #[serde(rename = "FirstName", default)]
    pub first_name: Option<String>,
    #[serde(rename = "LastName", default)]
    pub last_name: Option<String>,
}

impl C2bConfirmation {
    /// Normalize into the canonical payment intent.
    pub fn normalize(self) -> Result<PaymentIntent, PaymentError> {
        let amount = parse_amount_value(&self.trans_amount)?;

        let trans_id = self.trans_id.trim().to_string();
        if trans_id.is_empty() {
            return Err(PaymentError::MalformedNotification(
                "confirmation is missing TransID".to_string(),
            ));
        }

        let payer_name = match (non_empty(self.first_name), non_empty(self.last_name)) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first),
            (None, Some(last)) => Some(last),
            (None, None) => None,
        };

        let intent = PaymentIntent {
            account_reference: self.bill_ref_number.trim().to_string(),
            amount,
            external_txn_id: Some(trans_id),
            payer_name,
            payer_phone: non_empty(self.msisdn),
            channel: PaymentChannel::MpesaC2b,
            occurred_at: self
                .trans_time
                .as_deref()
                .and_then(parse_trans_time)
                .unwrap_or_else(Utc::now),
        };
        intent.validate()?;
        Ok(intent)
    }
}

/// C2B validation payload: only the account reference matters for the
/// accept/reject decision.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct C2bValidation {
    #[serde(rename = "BillRefNumber", default)]
    pub bill_ref_number: String,
}

/// Acknowledgment shape for both C2B endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct C2bResponse {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl C2bResponse {
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Accepted".to_string(),
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self {
            result_code: 1,
            result_desc: reason.to_string(),
        }
    }
}

fn parse_trans_time(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}
