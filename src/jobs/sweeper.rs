//! Overdue sweeper.
//!
//! Promotes pending/partial records whose due date plus grace period has
//! elapsed to `overdue` and assesses the late fee exactly once. The
//! transition is idempotent per record: re-running the sweep never
//! double-charges because promoted records leave the candidate set and a fee
//! that is already present is never recomputed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use sea_orm::{ActiveValue::Set, DatabaseConnection, IntoActiveModel};
use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::error::PaymentError;
use crate::ledger::{PaymentStatus, late_fee_for};
use crate::repositories::PaymentRepository;

/// Caller-supplied sweep parameters.
#[derive(Debug, Clone, Copy)]
pub struct SweepParams {
    pub grace_period_days: i64,
    pub late_fee_percent: f64,
    /// Injectable clock so one-shot runs and tests are deterministic
    pub now: DateTime<Utc>,
}

impl SweepParams {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            grace_period_days: config.sweeper.grace_period_days,
            late_fee_percent: config.sweeper.late_fee_percent,
            now: Utc::now(),
        }
    }
}

/// Outcome of one sweep run.
#[derive(Debug, Default, Clone, Copy, Serialize, ToSchema)]
pub struct SweepStats {
    pub scanned: u64,
    pub marked_overdue: u64,
    pub fees_assessed: u64,
}

/// Background sweeper service.
pub struct OverdueSweeper {
    config: Arc<AppConfig>,
    db: DatabaseConnection,
}

impl OverdueSweeper {
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection) -> Self {
        Self { config, db }
    }

    /// Run the sweep loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), PaymentError> {
        info!("Starting overdue sweeper");

        loop {
            let tick_interval = super::jittered(
                self.config.sweeper.tick_interval_seconds,
                self.config.sweeper.jitter_pct,
            );

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Overdue sweeper shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    match self.run_once(SweepParams::from_config(&self.config)).await {
                        Ok(stats) => {
                            debug!(
                                scanned = stats.scanned,
                                marked_overdue = stats.marked_overdue,
                                fees_assessed = stats.fees_assessed,
                                "Sweep tick completed"
                            );
                        }
                        Err(err) => error!(error = ?err, "Sweep tick failed"),
                    }
                    histogram!("overdue_sweep_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Overdue sweeper stopped");
        Ok(())
    }

    /// One batch sweep with the given parameters.
    pub async fn run_once(&self, params: SweepParams) -> Result<SweepStats, PaymentError> {
        let payments = PaymentRepository::new(self.db.clone());
        let cutoff = params.now - Duration::days(params.grace_period_days);

        let candidates = payments.find_sweep_candidates(cutoff).await?;
        let mut stats = SweepStats {
            scanned: candidates.len() as u64,
            ..Default::default()
        };

        for record in candidates {
            let record_id = record.id;
            let fee_missing = record.late_fee.is_none();
            let fee = late_fee_for(record.expected_amount, params.late_fee_percent);

            let mut active = record.into_active_model();
            active.status = Set(PaymentStatus::Overdue.as_str().to_string());
            if fee_missing {
                active.late_fee = Set(Some(fee));
            }
            active.updated_at = Set(Utc::now().fixed_offset());

            match payments.update(active).await {
                Ok(updated) => {
                    stats.marked_overdue += 1;
                    if fee_missing {
                        stats.fees_assessed += 1;
                    }
                    info!(
                        record_id = %updated.id,
                        receipt = %updated.receipt_number,
                        late_fee = ?updated.late_fee,
                        "Promoted record to overdue"
                    );
                }
                Err(err) => {
                    // One bad row must not abort the batch.
                    error!(error = ?err, record_id = %record_id, "Failed to promote record");
                }
            }
        }

        counter!("overdue_records_total").increment(stats.marked_overdue);
        Ok(stats)
    }
}
