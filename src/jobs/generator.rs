//! Monthly rent generator.
//!
//! Materializes one expected-payment record per active occupant per billing
//! period, pulling forward any prior-period deficit. Skips are counted, never
//! raised; only store-level failures abort a run, so the generator can
//! interleave safely with ingestion and repeated runs are harmless.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use sea_orm::{ActiveValue::Set, DatabaseConnection};
use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::channels::PaymentChannel;
use crate::config::AppConfig;
use crate::error::{PaymentError, is_unique_violation};
use crate::ledger::{PaymentStatus, Period, compute_ledger, late_fee_for};
use crate::models::{occupant, payment};
use crate::repositories::{BillingUnitRepository, PaymentRepository, ReceiptRepository};

/// Caller-supplied generation parameters.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorParams {
    pub due_day: u8,
    pub grace_period_days: i64,
    pub late_fee_percent: f64,
    /// Injectable clock; records whose due date plus grace already elapsed
    /// are created overdue
    pub now: DateTime<Utc>,
}

impl GeneratorParams {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            due_day: config.generator.due_day,
            grace_period_days: config.sweeper.grace_period_days,
            late_fee_percent: config.sweeper.late_fee_percent,
            now: Utc::now(),
        }
    }
}

/// Outcome of one generation run: generated vs. skipped with reasons.
#[derive(Debug, Default, Clone, Copy, Serialize, ToSchema)]
pub struct GenerationSummary {
    pub generated: u64,
    pub skipped_existing: u64,
    pub skipped_inactive: u64,
}

/// Background generator service.
pub struct MonthlyRentGenerator {
    config: Arc<AppConfig>,
    db: DatabaseConnection,
}

impl MonthlyRentGenerator {
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection) -> Self {
        Self { config, db }
    }

    /// Run the generation loop until the provided shutdown token fires. Each
    /// tick targets the then-current period; the duplicate check makes the
    /// repetition idempotent.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), PaymentError> {
        info!("Starting monthly rent generator");

        loop {
            let tick_interval = super::jittered(
                self.config.generator.tick_interval_seconds,
                self.config.sweeper.jitter_pct,
            );

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Monthly rent generator shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    let params = GeneratorParams::from_config(&self.config);
                    match self.run_for_period(Period::current(), params).await {
                        Ok(summary) => {
                            debug!(
                                generated = summary.generated,
                                skipped_existing = summary.skipped_existing,
                                skipped_inactive = summary.skipped_inactive,
                                "Generation tick completed"
                            );
                        }
                        Err(err) => error!(error = ?err, "Generation tick failed"),
                    }
                    histogram!("rent_generation_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Monthly rent generator stopped");
        Ok(())
    }

    /// Generate expected-payment records for every active occupant with an
    /// assigned unit, for the target period.
    pub async fn run_for_period(
        &self,
        period: Period,
        params: GeneratorParams,
    ) -> Result<GenerationSummary, PaymentError> {
        let units = BillingUnitRepository::new(self.db.clone());
        let payments = PaymentRepository::new(self.db.clone());
        let receipts = ReceiptRepository::new(self.db.clone());

        let mut summary = GenerationSummary::default();

        for (unit, tenant) in units.find_occupied_with_occupants().await? {
            if tenant.status != occupant::STATUS_ACTIVE {
                summary.skipped_inactive += 1;
                continue;
            }

            if payments
                .exists_for_period(tenant.id, unit.id, period)
                .await?
            {
                summary.skipped_existing += 1;
                continue;
            }

            let carried_forward = payments
                .carried_forward_into(tenant.id, unit.id, period)
                .await?;
            let outcome = compute_ledger(unit.rent_amount, carried_forward, 0)?;

            let due_date = period.due_date(params.due_day);
            let already_overdue =
                params.now > due_date + Duration::days(params.grace_period_days);
            let (status, late_fee) = if already_overdue {
                (
                    PaymentStatus::Overdue,
                    Some(late_fee_for(outcome.expected, params.late_fee_percent)),
                )
            } else {
                (PaymentStatus::Pending, None)
            };

            let receipt_number = receipts.next_number(period.year).await?;
            let now = Utc::now().fixed_offset();

            let record = payment::ActiveModel {
                id: Set(Uuid::new_v4()),
                occupant_id: Set(tenant.id),
                unit_id: Set(unit.id),
                period_month: Set(period.month as i16),
                period_year: Set(period.year),
                expected_amount: Set(outcome.expected),
                paid_amount: Set(0),
                deficit: Set(outcome.deficit),
                carried_forward: Set(carried_forward),
                late_fee: Set(late_fee),
                status: Set(status.as_str().to_string()),
                channel: Set(PaymentChannel::Generic.as_str().to_string()),
                external_txn_id: Set(None),
                checkout_request_id: Set(None),
                receipt_number: Set(receipt_number),
                payer_name: Set(None),
                payer_phone: Set(None),
                failure_reason: Set(None),
                due_date: Set(Some(due_date.fixed_offset())),
                paid_at: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            };

            match payments.insert(record).await {
                Ok(inserted) => {
                    summary.generated += 1;
                    info!(
                        unit = %unit.unit_number,
                        period = %period,
                        expected = inserted.expected_amount,
                        carried_forward = inserted.carried_forward,
                        status = %inserted.status,
                        "Generated expected-payment record"
                    );
                }
                Err(err) if is_unique_violation(&err) => {
                    // A concurrent run or an ingestion posting got there
                    // first; that is a skip, not a failure.
                    summary.skipped_existing += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        counter!("rent_records_generated_total").increment(summary.generated);
        Ok(summary)
    }
}
