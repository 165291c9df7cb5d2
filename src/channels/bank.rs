//! Bank transfer webhook adapter.
//!
//! Bank integrations disagree on field names; every documented variant is
//! accepted via serde aliases so the divergence stays inside this adapter.
//! When a shared secret is configured, deliveries carry an HMAC-SHA256 hex
//! digest of the raw body that must verify before the payload is trusted.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use utoipa::ToSchema;

use crate::channels::{PaymentChannel, PaymentIntent, non_empty, parse_amount_value};
use crate::error::PaymentError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the bank webhook signature.
pub const SIGNATURE_HEADER: &str = "x-bank-signature";

/// Bank webhook payload, accepting the field-name variants the partner banks
/// actually send.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BankNotification {
    #[serde(rename = "accountNumber", alias = "account_number")]
    pub account_number: String,
    #[serde(rename = "amount", alias = "transactionAmount")]
    #[schema(value_type = String)]
    pub amount: serde_json::Value,
    #[serde(rename = "transactionId", alias = "reference", default)]
    pub transaction_id: Option<String>,
    #[serde(rename = "transactionDate", default)]
    pub transaction_date: Option<String>,
    #[serde(rename = "payerName", default)]
    pub payer_name: Option<String>,
}

impl BankNotification {
    /// Normalize into the canonical payment intent.
    pub fn normalize(self) -> Result<PaymentIntent, PaymentError> {
        let amount = parse_amount_value(&self.amount)?;

        let intent = PaymentIntent {
            account_reference: self.account_number.trim().to_string(),
            amount,
            external_txn_id: non_empty(self.transaction_id),
            payer_name: non_empty(self.payer_name),
            payer_phone: None,
            channel: PaymentChannel::Bank,
            occurred_at: self
                .transaction_date
                .as_deref()
                .and_then(parse_transaction_date)
                .unwrap_or_else(Utc::now),
        };
        intent.validate()?;
        Ok(intent)
    }
}

/// Verify the webhook body signature against the configured shared secret.
pub fn verify_signature(secret: &str, body: &[u8], provided: &str) -> Result<(), PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        PaymentError::MalformedNotification("invalid bank webhook secret".to_string())
    })?;
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    let normalized = provided
        .trim()
        .strip_prefix("sha256=")
        .unwrap_or_else(|| provided.trim());

    if normalized.eq_ignore_ascii_case(&expected) {
        Ok(())
    } else {
        Err(PaymentError::MalformedNotification(
            "bank webhook signature mismatch".to_string(),
        ))
    }
}

/// Compute the hex signature for a body; used by tests and by partners
/// validating their integration.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn parse_transaction_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_camel_case_variant() {
        let payload: BankNotification = serde_json::from_value(json!({
            "accountNumber": "101",
            "amount": "1200.00",
            "transactionId": "FT26001",
            "transactionDate": "2026-03-05",
            "payerName": "John Doe"
        }))
        .unwrap();

        let intent = payload.normalize().unwrap();
        assert_eq!(intent.account_reference, "101");
        assert_eq!(intent.amount, 120_000);
        assert_eq!(intent.external_txn_id.as_deref(), Some("FT26001"));
        assert_eq!(intent.channel, PaymentChannel::Bank);
    }

    #[test]
    fn test_snake_case_and_reference_variant() {
        let payload: BankNotification = serde_json::from_value(json!({
            "account_number": "B12",
            "transactionAmount": 950,
            "reference": "REF-77"
        }))
        .unwrap();

        let intent = payload.normalize().unwrap();
        assert_eq!(intent.account_reference, "B12");
        assert_eq!(intent.amount, 95_000);
        assert_eq!(intent.external_txn_id.as_deref(), Some("REF-77"));
    }

    #[test]
    fn test_missing_account_field_fails_deserialization() {
        let result: Result<BankNotification, _> = serde_json::from_value(json!({
            "amount": "100"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_amount_rejected() {
        let payload: BankNotification = serde_json::from_value(json!({
            "accountNumber": "101",
            "amount": 0
        }))
        .unwrap();

        assert!(matches!(
            payload.normalize(),
            Err(PaymentError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_signature_round_trip() {
        let secret = "bank-secret";
        let body = br#"{"accountNumber":"101","amount":"1200"}"#;

        let signature = compute_signature(secret, body);
        assert!(verify_signature(secret, body, &signature).is_ok());
        assert!(verify_signature(secret, body, &format!("sha256={signature}")).is_ok());
        assert!(verify_signature(secret, body, "deadbeef").is_err());
        assert!(verify_signature("other-secret", body, &signature).is_err());
    }

    #[test]
    fn test_rfc3339_transaction_date() {
        let payload: BankNotification = serde_json::from_value(json!({
            "accountNumber": "101",
            "amount": "10",
            "transactionDate": "2026-03-05T08:30:00Z"
        }))
        .unwrap();

        let intent = payload.normalize().unwrap();
        assert_eq!(intent.occurred_at.to_rfc3339(), "2026-03-05T08:30:00+00:00");
    }
}
