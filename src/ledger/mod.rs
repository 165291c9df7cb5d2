//! # Ledger Core
//!
//! The pure heart of the reconciliation engine: billing periods, payment
//! status classification, and the expected/deficit calculator. Everything in
//! this module is deterministic and side-effect-free so postings can be
//! retried safely; persistence lives in [`posting`] and the repositories.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PaymentError;

pub mod posting;
pub mod resolver;

pub use posting::{PostingOutcome, PostingService};
pub use resolver::resolve_billing_unit;

/// Payment record status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
}

impl PaymentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Overdue => "overdue",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "partial" => Some(PaymentStatus::Partial),
            "paid" => Some(PaymentStatus::Paid),
            "overdue" => Some(PaymentStatus::Overdue),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (month, year) billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    /// 1-12
    pub month: u8,
    pub year: i32,
}

impl Period {
    /// Build a period from raw parts. Month 0 follows the legacy convention
    /// and rolls to December of the prior year; anything past 12 is rejected.
    pub fn from_parts(month: i32, year: i32) -> Result<Self, PaymentError> {
        match month {
            0 => Ok(Self {
                month: 12,
                year: year - 1,
            }),
            1..=12 => Ok(Self {
                month: month as u8,
                year,
            }),
            other => Err(PaymentError::MalformedNotification(format!(
                "invalid billing month {other}"
            ))),
        }
    }

    /// Billing period a payment timestamp falls into.
    pub fn from_date(at: DateTime<Utc>) -> Self {
        Self {
            month: at.month() as u8,
            year: at.year(),
        }
    }

    /// Current billing period.
    pub fn current() -> Self {
        Self::from_date(Utc::now())
    }

    /// The immediately preceding period; January rolls back to December of
    /// the prior year.
    pub fn preceding(self) -> Self {
        if self.month <= 1 {
            Self {
                month: 12,
                year: self.year - 1,
            }
        } else {
            Self {
                month: self.month - 1,
                year: self.year,
            }
        }
    }

    /// Due date for this period, with the configured day clamped to the
    /// month's length (a due day of 31 falls on Feb 28/29).
    pub fn due_date(self, due_day: u8) -> DateTime<Utc> {
        let day = u32::from(due_day).clamp(1, days_in_month(self.year, u32::from(self.month)));
        // The clamp guarantees a representable date, so this is always Single.
        Utc.with_ymd_and_hms(self.year, u32::from(self.month), day, 0, 0, 0)
            .single()
            .unwrap_or_default()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Result of the expected/deficit calculation for one proposed posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerOutcome {
    /// Rent plus the deficit carried forward from the preceding period
    pub expected: i64,
    /// max(0, expected - paid)
    pub deficit: i64,
    /// Prior-period deficit included in `expected`
    pub carried_forward: i64,
    pub status: PaymentStatus,
}

/// Compute expected amount, deficit, and status for a proposed paid amount.
///
/// `overdue` is never assigned here; only the sweeper promotes records to
/// overdue. Identical inputs always produce identical output.
pub fn compute_ledger(
    rent: i64,
    carried_forward: i64,
    proposed_paid: i64,
) -> Result<LedgerOutcome, PaymentError> {
    if proposed_paid < 0 {
        return Err(PaymentError::InvalidAmount(format!(
            "proposed paid amount {proposed_paid} is negative"
        )));
    }
    if rent < 0 || carried_forward < 0 {
        return Err(PaymentError::InvalidAmount(
            "rent and carried-forward amounts must be non-negative".to_string(),
        ));
    }

    let expected = rent + carried_forward;
    let deficit = (expected - proposed_paid).max(0);
    let status = if proposed_paid == 0 {
        PaymentStatus::Pending
    } else if proposed_paid >= expected {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Partial
    };

    Ok(LedgerOutcome {
        expected,
        deficit,
        carried_forward,
        status,
    })
}

/// Late fee for an overdue record: `expected * percent / 100`, rounded to the
/// nearest minor unit.
pub fn late_fee_for(expected: i64, percent: f64) -> i64 {
    ((expected as f64) * percent / 100.0).round() as i64
}
