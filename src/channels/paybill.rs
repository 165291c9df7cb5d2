//! Direct-entry (manual/API) pay-bill channel adapter.
//!
//! Used by operators and trusted API clients recording a payment that was
//! confirmed out of band. Unlike the webhook channels the caller waits for
//! the posting result, so errors surface synchronously.

use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::channels::{PaymentChannel, PaymentIntent, non_empty, parse_amount_value};
use crate::error::PaymentError;

/// Direct-entry payment payload.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DirectEntry {
    pub account_number: String,
    #[schema(value_type = String)]
    pub amount: serde_json::Value,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub payer_name: Option<String>,
}

impl DirectEntry {
    /// Normalize into the canonical payment intent.
    pub fn normalize(self) -> Result<PaymentIntent, PaymentError> {
        let amount = parse_amount_value(&self.amount)?;

        let intent = PaymentIntent {
            account_reference: self.account_number.trim().to_string(),
            amount,
            external_txn_id: non_empty(self.transaction_id),
            payer_name: non_empty(self.payer_name),
            payer_phone: non_empty(self.phone_number),
            channel: PaymentChannel::Paybill,
            occurred_at: Utc::now(),
        };
        intent.validate()?;
        Ok(intent)
    }
}
