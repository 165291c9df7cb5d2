//! # Ingestion Channels
//!
//! One module per payment notification channel. Every adapter normalizes its
//! channel-specific payload into the canonical [`PaymentIntent`] before any
//! shared ledger logic runs; field-shape differences never leak past this
//! layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PaymentError;

pub mod bank;
pub mod generic;
pub mod mpesa;
pub mod paybill;

/// The ingestion channel a notification arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentChannel {
    /// Provider-initiated mobile-money push, resolved via callback
    Stk,
    /// Mobile-money pay-bill confirmation webhook
    MpesaC2b,
    /// Direct-entry API for pay-bill payments captured manually
    Paybill,
    /// Bank transfer webhook
    Bank,
    /// Generic payment webhook
    Generic,
}

impl PaymentChannel {
    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentChannel::Stk => "stk",
            PaymentChannel::MpesaC2b => "mpesa-c2b",
            PaymentChannel::Paybill => "paybill",
            PaymentChannel::Bank => "bank",
            PaymentChannel::Generic => "generic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stk" => Some(PaymentChannel::Stk),
            "mpesa-c2b" => Some(PaymentChannel::MpesaC2b),
            "paybill" => Some(PaymentChannel::Paybill),
            "bank" => Some(PaymentChannel::Bank),
            "generic" => Some(PaymentChannel::Generic),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical payment-intent record every channel adapter produces.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    /// Billing unit account reference (unit number)
    pub account_reference: String,
    /// Amount in minor currency units
    pub amount: i64,
    /// External transaction identifier; drives exactly-once ingestion
    pub external_txn_id: Option<String>,
    pub payer_name: Option<String>,
    pub payer_phone: Option<String>,
    pub channel: PaymentChannel,
    pub occurred_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Mandatory-field validation shared by every channel: a non-empty
    /// account reference and a positive amount.
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.account_reference.trim().is_empty() {
            return Err(PaymentError::MalformedNotification(
                "missing account reference".to_string(),
            ));
        }
        if self.amount <= 0 {
            return Err(PaymentError::InvalidAmount(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Parse a decimal amount string into minor currency units.
///
/// Accepts up to two fraction digits; anything beyond that, or any
/// non-numeric content, is rejected rather than silently rounded.
pub fn parse_amount(raw: &str) -> Result<i64, PaymentError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PaymentError::InvalidAmount("empty amount".to_string()));
    }
    if trimmed.starts_with('-') {
        return Err(PaymentError::InvalidAmount(format!(
            "negative amount '{trimmed}'"
        )));
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };

    if fraction.len() > 2 {
        return Err(PaymentError::InvalidAmount(format!(
            "amount '{trimmed}' has more than two fraction digits"
        )));
    }

    let whole_units: i64 = whole
        .parse()
        .map_err(|_| PaymentError::InvalidAmount(format!("unparseable amount '{trimmed}'")))?;

    let cents: i64 = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<2}");
        padded
            .parse()
            .map_err(|_| PaymentError::InvalidAmount(format!("unparseable amount '{trimmed}'")))?
    };

    whole_units
        .checked_mul(100)
        .and_then(|v| v.checked_add(cents))
        .ok_or_else(|| PaymentError::InvalidAmount(format!("amount '{trimmed}' overflows")))
}

/// Parse an amount that may arrive as a JSON number or a decimal string,
/// which real channel payloads mix freely.
pub fn parse_amount_value(value: &serde_json::Value) -> Result<i64, PaymentError> {
    match value {
        serde_json::Value::String(s) => parse_amount(s),
        serde_json::Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                if int < 0 {
                    return Err(PaymentError::InvalidAmount(format!(
                        "negative amount {int}"
                    )));
                }
                int.checked_mul(100)
                    .ok_or_else(|| PaymentError::InvalidAmount(format!("amount {int} overflows")))
            } else if let Some(float) = n.as_f64() {
                if float < 0.0 {
                    return Err(PaymentError::InvalidAmount(format!(
                        "negative amount {float}"
                    )));
                }
                Ok((float * 100.0).round() as i64)
            } else {
                Err(PaymentError::InvalidAmount(format!(
                    "unparseable amount {n}"
                )))
            }
        }
        other => Err(PaymentError::InvalidAmount(format!(
            "amount must be a number or string, got {other}"
        ))),
    }
}

/// Normalize an optional identifier field: trims and drops empties so blank
/// webhook fields behave like absent ones.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
