//! # Rentledger Main Entry Point
//!
//! Runs the API server by default; the batch jobs are also exposed as
//! one-shot subcommands for cron and operator use.

use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};

use rentledger::config::ConfigLoader;
use rentledger::db::init_pool;
use rentledger::jobs::{
    GeneratorParams, MonthlyRentGenerator, OverdueSweeper, SweepParams,
};
use rentledger::ledger::Period;
use rentledger::server::run_server;
use rentledger::telemetry;

#[derive(Parser)]
#[command(name = "rentledger", about = "Rent payment reconciliation service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server with the background batch services (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Run the overdue sweeper once
    Sweep {
        /// Days past the due date before a record goes overdue
        #[arg(long)]
        grace_days: Option<i64>,
        /// Late fee as a percentage of the expected amount
        #[arg(long)]
        late_fee_percent: Option<f64>,
    },
    /// Generate expected-payment records for a billing period
    GenerateRent {
        /// Billing month, 1-12 (defaults to the current month)
        #[arg(long)]
        month: Option<i32>,
        /// Billing year (defaults to the current year)
        #[arg(long)]
        year: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    if let Ok(redacted_json) = config.redacted_json() {
        tracing::info!(profile = %config.profile, "Loaded configuration: {}", redacted_json);
    }

    let db = init_pool(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            Migrator::up(&db, None).await?;
            run_server(config, db).await
        }
        Command::Migrate => {
            Migrator::up(&db, None).await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
        Command::Sweep {
            grace_days,
            late_fee_percent,
        } => {
            let mut params = SweepParams::from_config(&config);
            if let Some(grace) = grace_days {
                params.grace_period_days = grace;
            }
            if let Some(percent) = late_fee_percent {
                params.late_fee_percent = percent;
            }

            let config = std::sync::Arc::new(config);
            let stats = OverdueSweeper::new(config, db).run_once(params).await?;
            println!(
                "swept {} records: {} marked overdue, {} late fees assessed",
                stats.scanned, stats.marked_overdue, stats.fees_assessed
            );
            Ok(())
        }
        Command::GenerateRent { month, year } => {
            let period = match (month, year) {
                (Some(month), Some(year)) => Period::from_parts(month, year)?,
                (None, None) => Period::current(),
                _ => return Err("--month and --year must be supplied together".into()),
            };

            let params = GeneratorParams::from_config(&config);
            let config = std::sync::Arc::new(config);
            let summary = MonthlyRentGenerator::new(config, db)
                .run_for_period(period, params)
                .await?;
            println!(
                "period {}: generated {}, skipped {} existing, {} inactive",
                period, summary.generated, summary.skipped_existing, summary.skipped_inactive
            );
            Ok(())
        }
    }
}
