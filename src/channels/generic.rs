//! Generic payment webhook adapter.
//!
//! Catch-all shape for smaller integrations: the account reference travels as
//! `houseNumber` and the transaction identifier may arrive under either
//! `transactionId` or `referenceNumber`.

use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::channels::{PaymentChannel, PaymentIntent, non_empty, parse_amount_value};
use crate::error::PaymentError;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenericNotification {
    pub house_number: String,
    #[schema(value_type = String)]
    pub amount: serde_json::Value,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub received_from: Option<String>,
}

impl GenericNotification {
    /// Normalize into the canonical payment intent. `transactionId` wins over
    /// `referenceNumber` when both are present.
    pub fn normalize(self) -> Result<PaymentIntent, PaymentError> {
        let amount = parse_amount_value(&self.amount)?;

        let external_txn_id =
            non_empty(self.transaction_id).or_else(|| non_empty(self.reference_number));

        let intent = PaymentIntent {
            account_reference: self.house_number.trim().to_string(),
            amount,
            external_txn_id,
            payer_name: non_empty(self.received_from),
            payer_phone: None,
            channel: PaymentChannel::Generic,
            occurred_at: Utc::now(),
        };
        intent.validate()?;
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generic_normalizes() {
        let payload: GenericNotification = serde_json::from_value(json!({
            "houseNumber": "101",
            "amount": 1200,
            "referenceNumber": "WEB-9",
            "receivedFrom": "Jane"
        }))
        .unwrap();

        let intent = payload.normalize().unwrap();
        assert_eq!(intent.account_reference, "101");
        assert_eq!(intent.amount, 120_000);
        assert_eq!(intent.external_txn_id.as_deref(), Some("WEB-9"));
        assert_eq!(intent.payer_name.as_deref(), Some("Jane"));
        assert_eq!(intent.channel, PaymentChannel::Generic);
    }

    #[test]
    fn test_transaction_id_preferred_over_reference() {
        let payload: GenericNotification = serde_json::from_value(json!({
            "houseNumber": "101",
            "amount": 100,
            "transactionId": "TXN-1",
            "referenceNumber": "REF-2"
        }))
        .unwrap();

        let intent = payload.normalize().unwrap();
        assert_eq!(intent.external_txn_id.as_deref(), Some("TXN-1"));
    }

    #[test]
    fn test_missing_identifiers_yield_none() {
        let payload: GenericNotification = serde_json::from_value(json!({
            "houseNumber": "101",
            "amount": 100
        }))
        .unwrap();

        let intent = payload.normalize().unwrap();
        assert_eq!(intent.external_txn_id, None);
    }
}
