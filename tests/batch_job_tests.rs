//! Batch job tests: overdue sweeping with idempotent late fees and monthly
//! rent generation with duplicate-period skipping.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, Database, DatabaseConnection, EntityTrait};
use uuid::Uuid;

use rentledger::config::AppConfig;
use rentledger::jobs::{
    GeneratorParams, MonthlyRentGenerator, OverdueSweeper, SweepParams,
};
use rentledger::ledger::Period;
use rentledger::models::{billing_unit, occupant, payment};

async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    Migrator::up(&db, None).await.expect("Migrations failed");
    db
}

async fn create_unit_with_occupant(
    db: &DatabaseConnection,
    unit_number: &str,
    rent_amount: i64,
    occupant_status: &str,
) -> (billing_unit::Model, occupant::Model) {
    let now = Utc::now().fixed_offset();

    let tenant = occupant::ActiveModel {
        id: Set(Uuid::new_v4()),
        full_name: Set("Peter Otieno".to_string()),
        phone: Set(None),
        email: Set(None),
        payment_account_ref: Set(None),
        status: Set(occupant_status.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap();

    let unit = billing_unit::ActiveModel {
        id: Set(Uuid::new_v4()),
        unit_number: Set(unit_number.to_string()),
        property_name: Set(None),
        rent_amount: Set(rent_amount),
        occupant_id: Set(Some(tenant.id)),
        status: Set(billing_unit::STATUS_OCCUPIED.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap();

    (unit, tenant)
}

async fn create_pending_record(
    db: &DatabaseConnection,
    unit: &billing_unit::Model,
    tenant: &occupant::Model,
    expected: i64,
    due_days_ago: i64,
) -> payment::Model {
    let now = Utc::now();

    payment::ActiveModel {
        id: Set(Uuid::new_v4()),
        occupant_id: Set(tenant.id),
        unit_id: Set(unit.id),
        period_month: Set(3),
        period_year: Set(2026),
        expected_amount: Set(expected),
        paid_amount: Set(0),
        deficit: Set(expected),
        carried_forward: Set(0),
        late_fee: Set(None),
        status: Set("pending".to_string()),
        channel: Set("generic".to_string()),
        external_txn_id: Set(None),
        checkout_request_id: Set(None),
        receipt_number: Set(format!("RCP-2026-{:06}", rand_suffix())),
        payer_name: Set(None),
        payer_phone: Set(None),
        failure_reason: Set(None),
        due_date: Set(Some((now - Duration::days(due_days_ago)).fixed_offset())),
        paid_at: Set(None),
        created_at: Set(now.fixed_offset()),
        updated_at: Set(now.fixed_offset()),
    }
    .insert(db)
    .await
    .unwrap()
}

fn rand_suffix() -> u32 {
    // Unique-enough receipt suffixes for fixture rows.
    Uuid::new_v4().as_u128() as u32 % 900_000 + 100_000
}

#[tokio::test]
async fn test_sweeper_promotes_and_charges_once() {
    // Scenario: grace 5 days, due 10 days ago, pending record of 1200.00.
    let db = setup_db().await;
    let (unit, tenant) = create_unit_with_occupant(&db, "101", 120_000, "active").await;
    create_pending_record(&db, &unit, &tenant, 120_000, 10).await;

    let config = Arc::new(AppConfig::default());
    let sweeper = OverdueSweeper::new(config, db.clone());
    let params = SweepParams {
        grace_period_days: 5,
        late_fee_percent: 10.0,
        now: Utc::now(),
    };

    let stats = sweeper.run_once(params).await.unwrap();
    assert_eq!(stats.scanned, 1);
    assert_eq!(stats.marked_overdue, 1);
    assert_eq!(stats.fees_assessed, 1);

    let record = payment::Entity::find()
        .one(&db)
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(record.status, "overdue");
    assert_eq!(record.late_fee, Some(12_000));

    // Second run: the promoted record has left the candidate set, so the fee
    // cannot be charged twice.
    let stats = sweeper.run_once(params).await.unwrap();
    assert_eq!(stats.scanned, 0);
    assert_eq!(stats.marked_overdue, 0);

    let unchanged = payment::Entity::find()
        .one(&db)
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(unchanged.late_fee, Some(12_000));
}

#[tokio::test]
async fn test_sweeper_respects_grace_period() {
    let db = setup_db().await;
    let (unit, tenant) = create_unit_with_occupant(&db, "101", 120_000, "active").await;
    // Due 3 days ago with a 5-day grace period: still inside grace.
    create_pending_record(&db, &unit, &tenant, 120_000, 3).await;

    let config = Arc::new(AppConfig::default());
    let sweeper = OverdueSweeper::new(config, db.clone());
    let stats = sweeper
        .run_once(SweepParams {
            grace_period_days: 5,
            late_fee_percent: 10.0,
            now: Utc::now(),
        })
        .await
        .unwrap();

    assert_eq!(stats.scanned, 0);
    let record = payment::Entity::find()
        .one(&db)
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(record.status, "pending");
    assert_eq!(record.late_fee, None);
}

#[tokio::test]
async fn test_sweeper_preserves_existing_fee() {
    // A partial record that already carries a fee is promoted without
    // recomputation.
    let db = setup_db().await;
    let (unit, tenant) = create_unit_with_occupant(&db, "101", 120_000, "active").await;
    let record = create_pending_record(&db, &unit, &tenant, 120_000, 10).await;

    let mut active: payment::ActiveModel = sea_orm::IntoActiveModel::into_active_model(record);
    active.late_fee = Set(Some(7_500));
    active.status = Set("partial".to_string());
    active.paid_amount = Set(40_000);
    active.deficit = Set(80_000);
    active.update(&db).await.unwrap();

    let config = Arc::new(AppConfig::default());
    let sweeper = OverdueSweeper::new(config, db.clone());
    let stats = sweeper
        .run_once(SweepParams {
            grace_period_days: 5,
            late_fee_percent: 10.0,
            now: Utc::now(),
        })
        .await
        .unwrap();

    assert_eq!(stats.marked_overdue, 1);
    assert_eq!(stats.fees_assessed, 0);

    let swept = payment::Entity::find()
        .one(&db)
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(swept.status, "overdue");
    assert_eq!(swept.late_fee, Some(7_500));
}

#[tokio::test]
async fn test_generator_counts_generated_and_skipped() {
    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000, "active").await;
    create_unit_with_occupant(&db, "102", 90_000, "active").await;
    create_unit_with_occupant(&db, "103", 80_000, "past").await;

    let period = Period {
        month: 5,
        year: 2026,
    };
    let params = GeneratorParams {
        due_day: 5,
        grace_period_days: 5,
        late_fee_percent: 10.0,
        now: Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap(),
    };

    let config = Arc::new(AppConfig::default());
    let generator = MonthlyRentGenerator::new(config, db.clone());

    let first = generator.run_for_period(period, params).await.unwrap();
    assert_eq!(first.generated, 2);
    assert_eq!(first.skipped_existing, 0);
    assert_eq!(first.skipped_inactive, 1);

    // Re-running the same period generates nothing new.
    let second = generator.run_for_period(period, params).await.unwrap();
    assert_eq!(second.generated, 0);
    assert_eq!(second.skipped_existing, 2);

    let records = payment::Entity::find().all(&db).await.unwrap();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.status, "pending");
        assert_eq!(record.paid_amount, 0);
        assert_eq!(record.deficit, record.expected_amount);
        assert!(record.due_date.is_some());
    }
}

#[tokio::test]
async fn test_generator_backfills_as_overdue_with_fee() {
    // Generating a period whose due date + grace has already elapsed creates
    // the record overdue with the fee assessed up front.
    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000, "active").await;

    let period = Period {
        month: 1,
        year: 2026,
    };
    let params = GeneratorParams {
        due_day: 5,
        grace_period_days: 5,
        late_fee_percent: 10.0,
        now: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
    };

    let config = Arc::new(AppConfig::default());
    let generator = MonthlyRentGenerator::new(config, db.clone());
    let summary = generator.run_for_period(period, params).await.unwrap();
    assert_eq!(summary.generated, 1);

    let record = payment::Entity::find()
        .one(&db)
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(record.status, "overdue");
    assert_eq!(record.late_fee, Some(12_000));
}

#[tokio::test]
async fn test_generator_and_sweeper_interleave_safely() {
    // Generator creates a pending record for a past-due period only when the
    // due date is within grace at generation time; the sweeper later promotes
    // it. The pair never double-charges.
    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000, "active").await;

    let period = Period {
        month: 3,
        year: 2026,
    };
    // Generated one day after the due date, inside the 5-day grace.
    let generated_at = Utc.with_ymd_and_hms(2026, 3, 6, 0, 0, 0).unwrap();
    let config = Arc::new(AppConfig::default());

    MonthlyRentGenerator::new(config.clone(), db.clone())
        .run_for_period(
            period,
            GeneratorParams {
                due_day: 5,
                grace_period_days: 5,
                late_fee_percent: 10.0,
                now: generated_at,
            },
        )
        .await
        .unwrap();

    let sweeper = OverdueSweeper::new(config, db.clone());
    let swept_at = Utc.with_ymd_and_hms(2026, 3, 20, 0, 0, 0).unwrap();
    let params = SweepParams {
        grace_period_days: 5,
        late_fee_percent: 10.0,
        now: swept_at,
    };

    let first = sweeper.run_once(params).await.unwrap();
    assert_eq!(first.marked_overdue, 1);
    let second = sweeper.run_once(params).await.unwrap();
    assert_eq!(second.marked_overdue, 0);

    let record = payment::Entity::find()
        .one(&db)
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(record.status, "overdue");
    assert_eq!(record.late_fee, Some(12_000));
}
