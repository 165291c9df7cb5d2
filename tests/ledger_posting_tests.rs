//! Integration tests for the posting service: exactly-once ingestion,
//! settled-period guarding, in-place accumulation, and carry-forward.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, Database, DatabaseConnection, EntityTrait};
use uuid::Uuid;

use rentledger::channels::{PaymentChannel, PaymentIntent};
use rentledger::config::AppConfig;
use rentledger::error::PaymentError;
use rentledger::jobs::{GeneratorParams, MonthlyRentGenerator};
use rentledger::ledger::{PostingService, Period};
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
) -> (billing_unit::Model, occupant::Model) {
    let now = Utc::now().fixed_offset();

    let tenant = occupant::ActiveModel {
        id: Set(Uuid::new_v4()),
        full_name: Set("Jane Wanjiru".to_string()),
        phone: Set(Some("254700111222".to_string())),
        email: Set(None),
        payment_account_ref: Set(None),
        status: Set(occupant::STATUS_ACTIVE.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap();

    let unit = billing_unit::ActiveModel {
        id: Set(Uuid::new_v4()),
        unit_number: Set(unit_number.to_string()),
        property_name: Set(Some("Sunrise Court".to_string())),
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

fn intent(
    reference: &str,
    amount: i64,
    txn_id: Option<&str>,
    channel: PaymentChannel,
) -> PaymentIntent {
    PaymentIntent {
        account_reference: reference.to_string(),
        amount,
        external_txn_id: txn_id.map(|t| t.to_string()),
        payer_name: Some("Jane Wanjiru".to_string()),
        payer_phone: Some("254700111222".to_string()),
        channel,
        occurred_at: Utc.with_ymd_and_hms(2026, 3, 15, 10, 0, 0).unwrap(),
    }
}

fn service(db: &DatabaseConnection) -> PostingService {
    PostingService::new(db.clone(), Arc::new(AppConfig::default()))
}

#[tokio::test]
async fn test_full_payment_creates_settled_record() {
    // Scenario: unit 101, rent 1200.00, payment of 1200.00 via direct entry.
    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let posting = service(&db);

    let outcome = posting
        .post(intent("101", 120_000, Some("MANUAL-1"), PaymentChannel::Paybill))
        .await
        .unwrap();

    assert!(!outcome.duplicate);
    assert_eq!(outcome.payment.status, "paid");
    assert_eq!(outcome.payment.deficit, 0);
    assert_eq!(outcome.payment.expected_amount, 120_000);
    assert_eq!(outcome.payment.receipt_number, "RCP-2026-000001");
    assert_eq!(outcome.payment.period_month, 3);
    assert_eq!(outcome.payment.period_year, 2026);
}

#[tokio::test]
async fn test_partial_payment_then_generator_carries_deficit() {
    // Scenario: 800 of 1200 paid in March; April's generated record expects
    // 1600.
    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let posting = service(&db);

    let outcome = posting
        .post(intent("101", 80_000, Some("TXN-800"), PaymentChannel::MpesaC2b))
        .await
        .unwrap();
    assert_eq!(outcome.payment.status, "partial");
    assert_eq!(outcome.payment.deficit, 40_000);

    let april = Period {
        month: 4,
        year: 2026,
    };
    let config = Arc::new(AppConfig::default());
    let generator = MonthlyRentGenerator::new(config.clone(), db.clone());
    let params = GeneratorParams {
        due_day: 5,
        grace_period_days: 5,
        late_fee_percent: 10.0,
        now: Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
    };

    let summary = generator.run_for_period(april, params).await.unwrap();
    assert_eq!(summary.generated, 1);

    let records = payment::Entity::find().all(&db).await.unwrap();
    let april_record = records
        .iter()
        .find(|r| r.period_month == 4)
        .expect("April record generated");
    assert_eq!(april_record.expected_amount, 160_000);
    assert_eq!(april_record.carried_forward, 40_000);
    assert_eq!(april_record.status, "pending");
}

#[tokio::test]
async fn test_replayed_transaction_id_is_idempotent() {
    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let posting = service(&db);

    let first = posting
        .post(intent("101", 120_000, Some("TXN-X"), PaymentChannel::MpesaC2b))
        .await
        .unwrap();
    let second = posting
        .post(intent("101", 120_000, Some("TXN-X"), PaymentChannel::MpesaC2b))
        .await
        .unwrap();

    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(first.payment.id, second.payment.id);
    assert_eq!(
        first.payment.receipt_number,
        second.payment.receipt_number
    );

    let count = payment::Entity::find().all(&db).await.unwrap().len();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_settled_period_rejects_non_repeat_channels() {
    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let posting = service(&db);

    let first = posting
        .post(intent("101", 120_000, Some("TXN-1"), PaymentChannel::MpesaC2b))
        .await
        .unwrap();

    let result = posting
        .post(intent("101", 120_000, Some("TXN-2"), PaymentChannel::MpesaC2b))
        .await;

    match result {
        Err(PaymentError::AlreadySettled { receipt }) => {
            assert_eq!(receipt, first.payment.receipt_number);
        }
        other => panic!("expected AlreadySettled, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bank_channel_layers_differing_amount_onto_settled_period() {
    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let posting = service(&db);

    posting
        .post(intent("101", 120_000, Some("FT-1"), PaymentChannel::Bank))
        .await
        .unwrap();

    // Same amount replays as a duplicate even for the bank channel.
    let same_amount = posting
        .post(intent("101", 120_000, Some("FT-2"), PaymentChannel::Bank))
        .await;
    assert!(matches!(
        same_amount,
        Err(PaymentError::AlreadySettled { .. })
    ));

    // A differing amount layers an additional record.
    let layered = posting
        .post(intent("101", 30_000, Some("FT-3"), PaymentChannel::Bank))
        .await
        .unwrap();
    assert!(!layered.duplicate);
    assert_eq!(layered.payment.status, "partial");

    let count = payment::Entity::find().all(&db).await.unwrap().len();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_open_record_accumulates_to_settled() {
    // A generator-created pending record absorbs two partial payments and
    // settles when the total covers the expected amount.
    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let posting = service(&db);
    let config = Arc::new(AppConfig::default());

    let march = Period {
        month: 3,
        year: 2026,
    };
    let generator = MonthlyRentGenerator::new(config, db.clone());
    let params = GeneratorParams {
        due_day: 5,
        grace_period_days: 5,
        late_fee_percent: 10.0,
        now: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
    };
    generator.run_for_period(march, params).await.unwrap();

    let first = posting
        .post(intent("101", 70_000, Some("TXN-A"), PaymentChannel::MpesaC2b))
        .await
        .unwrap();
    assert_eq!(first.payment.status, "partial");
    assert_eq!(first.payment.paid_amount, 70_000);
    assert_eq!(first.payment.deficit, 50_000);

    let second = posting
        .post(intent("101", 50_000, Some("TXN-B"), PaymentChannel::Paybill))
        .await
        .unwrap();
    assert_eq!(second.payment.status, "paid");
    assert_eq!(second.payment.paid_amount, 120_000);
    assert_eq!(second.payment.deficit, 0);

    // Everything accumulated into the generator's record; one row, one
    // stable receipt.
    let records = payment::Entity::find().all(&db).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, first.payment.id);
}

#[tokio::test]
async fn test_unknown_unit_and_vacant_unit_are_terminal() {
    let db = setup_db().await;
    let posting = service(&db);

    let unknown = posting
        .post(intent("999", 120_000, None, PaymentChannel::Generic))
        .await;
    assert!(matches!(
        unknown,
        Err(PaymentError::UnitNotFound { .. })
    ));

    // A unit with no assigned occupant cannot take payments.
    let now = Utc::now().fixed_offset();
    billing_unit::ActiveModel {
        id: Set(Uuid::new_v4()),
        unit_number: Set("201".to_string()),
        property_name: Set(None),
        rent_amount: Set(120_000),
        occupant_id: Set(None),
        status: Set(billing_unit::STATUS_AVAILABLE.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&db)
    .await
    .unwrap();

    let vacant = posting
        .post(intent("201", 120_000, None, PaymentChannel::Generic))
        .await;
    assert!(matches!(vacant, Err(PaymentError::NoOccupant { .. })));

    assert!(payment::Entity::find().all(&db).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_negative_and_zero_amounts_rejected() {
    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let posting = service(&db);

    let zero = posting
        .post(intent("101", 0, None, PaymentChannel::Generic))
        .await;
    assert!(matches!(zero, Err(PaymentError::InvalidAmount(_))));

    let negative = posting
        .post(intent("101", -500, None, PaymentChannel::Generic))
        .await;
    assert!(matches!(negative, Err(PaymentError::InvalidAmount(_))));
}

#[tokio::test]
async fn test_receipt_sequence_increments_within_year() {
    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    create_unit_with_occupant(&db, "102", 90_000).await;
    let posting = service(&db);

    let first = posting
        .post(intent("101", 120_000, Some("T-1"), PaymentChannel::MpesaC2b))
        .await
        .unwrap();
    let second = posting
        .post(intent("102", 90_000, Some("T-2"), PaymentChannel::MpesaC2b))
        .await
        .unwrap();

    assert_eq!(first.payment.receipt_number, "RCP-2026-000001");
    assert_eq!(second.payment.receipt_number, "RCP-2026-000002");
}
