//! STK push lifecycle tests against a mocked provider: initiation, callback
//! settlement, idempotent replays, rejection handling, and provider error
//! classification.

use std::sync::Arc;

use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, Database, DatabaseConnection, EntityTrait};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rentledger::config::AppConfig;
use rentledger::error::PaymentError;
use rentledger::models::{billing_unit, occupant, payment};
use rentledger::stk::{CallbackDisposition, StkCallback, StkService};

async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    Migrator::up(&db, None).await.expect("Migrations failed");
    db
}

async fn create_unit_with_occupant(db: &DatabaseConnection, unit_number: &str, rent_amount: i64) {
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

    billing_unit::ActiveModel {
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
}

fn provider_config(base_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.stk.base_url = base_url.to_string();
    config.stk.consumer_key = Some("key".to_string());
    config.stk.consumer_secret = Some("secret".to_string());
    config.stk.passkey = Some("passkey".to_string());
    config.stk.timeout_ms = 2000;
    config
}

async fn mock_token_endpoint(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "expires_in": "3599"
        })))
        .mount(server)
        .await;
}

async fn mock_push_endpoint(server: &MockServer, checkout_id: &str) {
    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "MerchantRequestID": "mr-1",
            "CheckoutRequestID": checkout_id,
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_initiate_creates_pending_record_with_checkout_id() {
    let server = MockServer::start().await;
    mock_token_endpoint(&server).await;
    mock_push_endpoint(&server, "ws_CO_101").await;

    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let service = StkService::new(db.clone(), Arc::new(provider_config(&server.uri()))).unwrap();

    let record = service
        .initiate("101", 120_000, "254700111222")
        .await
        .unwrap();

    assert_eq!(record.status, "pending");
    assert_eq!(record.paid_amount, 0);
    assert_eq!(record.expected_amount, 120_000);
    assert_eq!(record.checkout_request_id.as_deref(), Some("ws_CO_101"));
    assert!(record.external_txn_id.is_some());
    assert!(record.receipt_number.starts_with("RCP-"));
}

#[tokio::test]
async fn test_callback_settles_record_and_replay_is_ignored() {
    // Scenario: push for 1200 settles via callback; a replayed callback
    // leaves the record unchanged.
    let server = MockServer::start().await;
    mock_token_endpoint(&server).await;
    mock_push_endpoint(&server, "ws_CO_101").await;

    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let service = StkService::new(db.clone(), Arc::new(provider_config(&server.uri()))).unwrap();

    service
        .initiate("101", 120_000, "254700111222")
        .await
        .unwrap();

    let callback: StkCallback = serde_json::from_value(json!({
        "correlationId": "ws_CO_101",
        "resultCode": 0,
        "amount": "1200.00",
        "providerReceiptId": "SBX777",
        "payerPhone": "254700111222",
        "transactionTime": "20260305143000"
    }))
    .unwrap();

    let disposition = service.resolve_callback(callback.clone()).await.unwrap();
    assert_eq!(disposition, CallbackDisposition::Settled);

    let record = payment::Entity::find()
        .one(&db)
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(record.status, "paid");
    assert_eq!(record.paid_amount, 120_000);
    assert_eq!(record.deficit, 0);
    assert_eq!(record.external_txn_id.as_deref(), Some("SBX777"));

    // Replay.
    let replay = service.resolve_callback(callback).await.unwrap();
    assert_eq!(replay, CallbackDisposition::Replayed);

    let unchanged = payment::Entity::find()
        .one(&db)
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(unchanged.paid_amount, 120_000);
    assert_eq!(unchanged.external_txn_id.as_deref(), Some("SBX777"));
    assert_eq!(unchanged.updated_at, record.updated_at);
}

#[tokio::test]
async fn test_failure_callback_keeps_record_payable() {
    let server = MockServer::start().await;
    mock_token_endpoint(&server).await;
    mock_push_endpoint(&server, "ws_CO_101").await;

    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let service = StkService::new(db.clone(), Arc::new(provider_config(&server.uri()))).unwrap();

    service
        .initiate("101", 120_000, "254700111222")
        .await
        .unwrap();

    let callback: StkCallback = serde_json::from_value(json!({
        "correlationId": "ws_CO_101",
        "resultCode": 1032,
        "resultDesc": "Request cancelled by user"
    }))
    .unwrap();

    let disposition = service.resolve_callback(callback.clone()).await.unwrap();
    assert_eq!(disposition, CallbackDisposition::Rejected);

    let record = payment::Entity::find()
        .one(&db)
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(record.status, "pending");
    assert_eq!(record.paid_amount, 0);
    assert_eq!(
        record.failure_reason.as_deref(),
        Some("Request cancelled by user")
    );

    // A replayed failure callback is accepted and ignored.
    let replay = service.resolve_callback(callback).await.unwrap();
    assert_eq!(replay, CallbackDisposition::Replayed);
}

#[tokio::test]
async fn test_unmatched_callback_is_acknowledged() {
    let server = MockServer::start().await;
    let db = setup_db().await;
    let service = StkService::new(db, Arc::new(provider_config(&server.uri()))).unwrap();

    let callback: StkCallback = serde_json::from_value(json!({
        "correlationId": "ws_CO_nothing",
        "resultCode": 0
    }))
    .unwrap();

    let disposition = service.resolve_callback(callback).await.unwrap();
    assert_eq!(disposition, CallbackDisposition::Unmatched);
}

#[tokio::test]
async fn test_rejected_credentials_surface_as_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let service = StkService::new(db.clone(), Arc::new(provider_config(&server.uri()))).unwrap();

    let result = service.initiate("101", 120_000, "254700111222").await;
    assert!(matches!(result, Err(PaymentError::ProviderAuth(_))));

    // The pending record survives, annotated, and stays payable elsewhere.
    let record = payment::Entity::find()
        .one(&db)
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(record.status, "pending");
    assert!(record.failure_reason.is_some());
    assert!(record.checkout_request_id.is_none());
}

#[tokio::test]
async fn test_missing_credentials_fail_without_network() {
    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;

    // No consumer key/secret configured at all.
    let mut config = AppConfig::default();
    config.stk.base_url = "http://127.0.0.1:9".to_string();
    let service = StkService::new(db, Arc::new(config)).unwrap();

    let result = service.initiate("101", 120_000, "254700111222").await;
    assert!(matches!(result, Err(PaymentError::ProviderAuth(_))));
}

#[tokio::test]
async fn test_provider_outage_is_retryable_error() {
    let server = MockServer::start().await;
    mock_token_endpoint(&server).await;
    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let service = StkService::new(db, Arc::new(provider_config(&server.uri()))).unwrap();

    let result = service.initiate("101", 120_000, "254700111222").await;
    assert!(matches!(
        result,
        Err(PaymentError::ProviderUnavailable(_))
    ));
}

#[tokio::test]
async fn test_status_query_survives_provider_outage() {
    let server = MockServer::start().await;
    mock_token_endpoint(&server).await;
    mock_push_endpoint(&server, "ws_CO_101").await;
    // No query endpoint mounted: the cross-check gets a 404 and is dropped.

    let db = setup_db().await;
    create_unit_with_occupant(&db, "101", 120_000).await;
    let service = StkService::new(db, Arc::new(provider_config(&server.uri()))).unwrap();

    service
        .initiate("101", 120_000, "254700111222")
        .await
        .unwrap();

    let status = service
        .query_status("ws_CO_101")
        .await
        .unwrap()
        .expect("local record found");
    assert_eq!(status.payment.status, "pending");
    assert!(status.provider.is_none());

    let missing = service.query_status("ws_CO_unknown").await.unwrap();
    assert!(missing.is_none());
}
