//! Ledger posting service.
//!
//! Takes a canonical [`PaymentIntent`] and records it exactly once: external
//! transaction ids are de-duplicated, settled periods are guarded, open
//! records accumulate further funds in place, and any unique violation raised
//! by the store is resolved back into the idempotent duplicate path. The
//! storage constraints, not application locks, are the concurrency-safety
//! mechanism, so concurrent duplicate deliveries converge on one record.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{ActiveValue::Set, DatabaseConnection, IntoActiveModel};
use tracing::{info, warn};
use uuid::Uuid;

use crate::channels::PaymentIntent;
use crate::config::AppConfig;
use crate::error::{PaymentError, is_unique_violation};
use crate::ledger::{PaymentStatus, Period, compute_ledger, resolver::resolve_billing_unit};
use crate::models::{billing_unit, occupant, payment};
use crate::repositories::{PaymentRepository, ReceiptRepository};

/// Result of posting one intent.
#[derive(Debug, Clone)]
pub struct PostingOutcome {
    pub payment: payment::Model,
    /// True when the intent replayed an already-recorded transaction and the
    /// existing record was returned untouched.
    pub duplicate: bool,
}

/// Posts canonical payment intents to the ledger.
#[derive(Clone)]
pub struct PostingService {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
}

impl PostingService {
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    /// Post a payment intent to the ledger exactly once.
    pub async fn post(&self, intent: PaymentIntent) -> Result<PostingOutcome, PaymentError> {
        intent.validate()?;

        let (unit, occupant) = resolve_billing_unit(&self.db, &intent.account_reference).await?;
        let period = Period::from_date(intent.occurred_at);
        let payments = PaymentRepository::new(self.db.clone());

        // Idempotent replay: a record already carries this transaction id.
        if let Some(txn_id) = intent.external_txn_id.as_deref() {
            if let Some(existing) = payments.find_by_external_txn_id(txn_id).await? {
                counter!("ledger_postings_duplicate_total", "channel" => intent.channel.as_str())
                    .increment(1);
                info!(
                    external_txn_id = txn_id,
                    receipt = %existing.receipt_number,
                    "Replayed transaction, returning existing record"
                );
                return Ok(PostingOutcome {
                    payment: existing,
                    duplicate: true,
                });
            }
        }

        // Settled-period guard.
        if let Some(settled) = payments
            .find_settled_for_period(occupant.id, unit.id, period)
            .await?
        {
            let repeat_allowed = self
                .config
                .posting
                .repeat_payment_channels
                .iter()
                .any(|channel| channel == intent.channel.as_str());

            if !repeat_allowed || settled.paid_amount == intent.amount {
                return Err(PaymentError::AlreadySettled {
                    receipt: settled.receipt_number,
                });
            }

            // Repeat-payment channel with a differing amount: layer an
            // additional record onto the period.
            info!(
                unit = %unit.unit_number,
                period = %period,
                channel = %intent.channel,
                "Layering additional payment onto settled period"
            );
            return self
                .insert_new(&payments, &unit, &occupant, period, &intent)
                .await;
        }

        // An open record (generator-created or a prior partial) absorbs
        // further funds in place.
        if let Some(open) = payments
            .find_open_for_period(occupant.id, unit.id, period)
            .await?
        {
            return self.accumulate(&payments, open, &intent).await;
        }

        self.insert_new(&payments, &unit, &occupant, period, &intent)
            .await
    }

    /// Accumulate an intent into an existing open record.
    async fn accumulate(
        &self,
        payments: &PaymentRepository,
        open: payment::Model,
        intent: &PaymentIntent,
    ) -> Result<PostingOutcome, PaymentError> {
        let was_overdue = open.status == PaymentStatus::Overdue.as_str();
        let new_total = open
            .paid_amount
            .checked_add(intent.amount)
            .ok_or_else(|| PaymentError::InvalidAmount("paid amount overflows".to_string()))?;

        // Reclassify against the expected amount captured when the record was
        // created; the carry-forward inside it stays fixed for the period.
        let rent_portion = open.expected_amount - open.carried_forward;
        let outcome = compute_ledger(rent_portion, open.carried_forward, new_total)?;

        // An overdue record stays overdue until fully settled.
        let status = if was_overdue && outcome.status != PaymentStatus::Paid {
            PaymentStatus::Overdue
        } else {
            outcome.status
        };

        if open.external_txn_id.is_some()
            && intent.external_txn_id.is_some()
            && open.external_txn_id != intent.external_txn_id
        {
            // The record can only carry one id; keeping the newest protects
            // against the delivery currently being retried.
            warn!(
                record_id = %open.id,
                old = ?open.external_txn_id,
                new = ?intent.external_txn_id,
                "Open record already carries a transaction id; replacing with the newest"
            );
        }

        let receipt_number = open.receipt_number.clone();
        let record_id = open.id;
        let mut active = open.into_active_model();
        active.paid_amount = Set(new_total);
        active.deficit = Set(outcome.deficit);
        active.status = Set(status.as_str().to_string());
        active.channel = Set(intent.channel.as_str().to_string());
        if let Some(txn_id) = &intent.external_txn_id {
            active.external_txn_id = Set(Some(txn_id.clone()));
        }
        if let Some(name) = &intent.payer_name {
            active.payer_name = Set(Some(name.clone()));
        }
        if let Some(phone) = &intent.payer_phone {
            active.payer_phone = Set(Some(phone.clone()));
        }
        active.paid_at = Set(Some(intent.occurred_at.fixed_offset()));
        active.updated_at = Set(Utc::now().fixed_offset());

        let updated = match payments.update(active).await {
            Ok(updated) => updated,
            Err(err) if is_unique_violation(&err) => {
                return self.recover_duplicate(payments, intent, record_id).await;
            }
            Err(err) => return Err(err.into()),
        };

        counter!("ledger_postings_total", "channel" => intent.channel.as_str()).increment(1);
        info!(
            record_id = %updated.id,
            receipt = %receipt_number,
            status = %updated.status,
            paid_amount = updated.paid_amount,
            "Accumulated payment into open record"
        );

        Ok(PostingOutcome {
            payment: updated,
            duplicate: false,
        })
    }

    /// Create a fresh record for the period.
    async fn insert_new(
        &self,
        payments: &PaymentRepository,
        unit: &billing_unit::Model,
        occupant: &occupant::Model,
        period: Period,
        intent: &PaymentIntent,
    ) -> Result<PostingOutcome, PaymentError> {
        let carried_forward = payments
            .carried_forward_into(occupant.id, unit.id, period)
            .await?;
        let outcome = compute_ledger(unit.rent_amount, carried_forward, intent.amount)?;

        let receipt_number = ReceiptRepository::new(self.db.clone())
            .next_number(period.year)
            .await?;
        let due_date = period.due_date(self.config.generator.due_day);
        let now = Utc::now().fixed_offset();

        let record = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            occupant_id: Set(occupant.id),
            unit_id: Set(unit.id),
            period_month: Set(period.month as i16),
            period_year: Set(period.year),
            expected_amount: Set(outcome.expected),
            paid_amount: Set(intent.amount),
            deficit: Set(outcome.deficit),
            carried_forward: Set(carried_forward),
            late_fee: Set(None),
            status: Set(outcome.status.as_str().to_string()),
            channel: Set(intent.channel.as_str().to_string()),
            external_txn_id: Set(intent.external_txn_id.clone()),
            checkout_request_id: Set(None),
            receipt_number: Set(receipt_number.clone()),
            payer_name: Set(intent.payer_name.clone()),
            payer_phone: Set(intent.payer_phone.clone()),
            failure_reason: Set(None),
            due_date: Set(Some(due_date.fixed_offset())),
            paid_at: Set(Some(intent.occurred_at.fixed_offset())),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = match payments.insert(record).await {
            Ok(inserted) => inserted,
            Err(err) if is_unique_violation(&err) => {
                // A concurrent posting won the race; resolve to whatever row
                // survived instead of failing.
                return self.recover_duplicate(payments, intent, Uuid::nil()).await;
            }
            Err(err) => return Err(err.into()),
        };

        counter!("ledger_postings_total", "channel" => intent.channel.as_str()).increment(1);
        info!(
            record_id = %inserted.id,
            receipt = %receipt_number,
            unit = %unit.unit_number,
            period = %period,
            status = %inserted.status,
            "Recorded payment"
        );

        Ok(PostingOutcome {
            payment: inserted,
            duplicate: false,
        })
    }

    /// Resolve a unique violation back to the surviving row.
    async fn recover_duplicate(
        &self,
        payments: &PaymentRepository,
        intent: &PaymentIntent,
        fallback_record: Uuid,
    ) -> Result<PostingOutcome, PaymentError> {
        if let Some(txn_id) = intent.external_txn_id.as_deref() {
            if let Some(existing) = payments.find_by_external_txn_id(txn_id).await? {
                counter!("ledger_postings_duplicate_total", "channel" => intent.channel.as_str())
                    .increment(1);
                return Ok(PostingOutcome {
                    payment: existing,
                    duplicate: true,
                });
            }
        }

        let (unit, occupant) = resolve_billing_unit(&self.db, &intent.account_reference).await?;
        let period = Period::from_date(intent.occurred_at);
        if let Some(settled) = payments
            .find_settled_for_period(occupant.id, unit.id, period)
            .await?
        {
            return Err(PaymentError::AlreadySettled {
                receipt: settled.receipt_number,
            });
        }

        if let Some(record) = payments.find_by_id(fallback_record).await? {
            return Ok(PostingOutcome {
                payment: record,
                duplicate: true,
            });
        }

        Err(PaymentError::Storage(sea_orm::DbErr::Custom(
            "constraint violation could not be resolved to an existing record".to_string(),
        )))
    }
}
