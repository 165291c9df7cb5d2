//! # Batch Jobs
//!
//! Periodic processes over the payment ledger: the overdue sweeper and the
//! monthly rent generator. Both run as jittered background loops under a
//! cancellation token and expose one-shot entry points for CLI and
//! operator-triggered runs. Their parameters are caller-supplied per run,
//! not global constants.

pub mod generator;
pub mod sweeper;

pub use generator::{GenerationSummary, GeneratorParams, MonthlyRentGenerator};
pub use sweeper::{OverdueSweeper, SweepParams, SweepStats};

/// Apply bounded random jitter to a tick interval so replicas do not
/// synchronize their batch scans.
pub(crate) fn jittered(interval_seconds: u64, jitter_pct: f64) -> std::time::Duration {
    use rand::Rng;

    let jitter = if jitter_pct > 0.0 {
        rand::thread_rng().gen_range(0.0..=jitter_pct)
    } else {
        0.0
    };
    std::time::Duration::from_secs_f64(interval_seconds as f64 * (1.0 + jitter))
}
