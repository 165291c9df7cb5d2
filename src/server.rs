//! # Server Configuration
//!
//! Axum application setup: shared state, routing, OpenAPI docs, and the
//! background batch services that run alongside the HTTP listener.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::error::PaymentError;
use crate::handlers;
use crate::jobs::{MonthlyRentGenerator, OverdueSweeper};
use crate::ledger::PostingService;
use crate::stk::StkService;
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub posting: PostingService,
    pub stk: Arc<StkService>,
}

impl AppState {
    pub fn new(config: AppConfig, db: DatabaseConnection) -> Result<Self, PaymentError> {
        let config = Arc::new(config);
        let posting = PostingService::new(db.clone(), config.clone());
        let stk = Arc::new(StkService::new(db.clone(), config.clone())?);

        Ok(Self {
            db,
            config,
            posting,
            stk,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/webhooks/mpesa/confirmation",
            post(handlers::webhooks::mpesa_confirmation),
        )
        .route(
            "/webhooks/mpesa/validation",
            post(handlers::webhooks::mpesa_validation),
        )
        .route("/webhooks/bank", post(handlers::webhooks::bank_webhook))
        .route(
            "/webhooks/payments",
            post(handlers::webhooks::generic_webhook),
        )
        .route(
            "/payments",
            get(handlers::payments::list_payments).post(handlers::payments::record_payment),
        )
        .route("/payments/{id}", get(handlers::payments::get_payment))
        .route(
            "/payments/receipt/{receipt_number}",
            get(handlers::payments::get_payment_by_receipt),
        )
        .route("/stk/push", post(handlers::stk::initiate_push))
        .route("/stk/callback", post(handlers::stk::push_callback))
        .route(
            "/stk/status/{checkout_request_id}",
            get(handlers::stk::push_status),
        )
        .route("/jobs/sweep", post(handlers::jobs::run_sweep))
        .route("/jobs/generate-rent", post(handlers::jobs::run_generation))
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration, running the batch
/// services beside the HTTP listener until shutdown.
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(config, db)?;
    let addr = state.config.bind_addr()?;
    let app = create_app(state.clone());

    let shutdown = CancellationToken::new();

    let sweeper = OverdueSweeper::new(state.config.clone(), state.db.clone());
    let sweeper_shutdown = shutdown.clone();
    let sweeper_handle = tokio::spawn(async move {
        if let Err(err) = sweeper.run(sweeper_shutdown).await {
            error!(error = ?err, "Overdue sweeper terminated with error");
        }
    });

    let generator = MonthlyRentGenerator::new(state.config.clone(), state.db.clone());
    let generator_shutdown = shutdown.clone();
    let generator_handle = tokio::spawn(async move {
        if let Err(err) = generator.run(generator_shutdown).await {
            error!(error = ?err, "Monthly rent generator terminated with error");
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %state.config.profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    shutdown.cancel();
    let _ = sweeper_handle.await;
    let _ = generator_handle.await;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::webhooks::mpesa_confirmation,
        crate::handlers::webhooks::mpesa_validation,
        crate::handlers::webhooks::bank_webhook,
        crate::handlers::webhooks::generic_webhook,
        crate::handlers::payments::record_payment,
        crate::handlers::payments::get_payment,
        crate::handlers::payments::get_payment_by_receipt,
        crate::handlers::payments::list_payments,
        crate::handlers::stk::initiate_push,
        crate::handlers::stk::push_callback,
        crate::handlers::stk::push_status,
        crate::handlers::jobs::run_sweep,
        crate::handlers::jobs::run_generation,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::channels::mpesa::C2bConfirmation,
            crate::channels::mpesa::C2bValidation,
            crate::channels::mpesa::C2bResponse,
            crate::channels::bank::BankNotification,
            crate::channels::generic::GenericNotification,
            crate::channels::paybill::DirectEntry,
            crate::handlers::webhooks::WebhookAcceptResponse,
            crate::handlers::payments::PaymentResponse,
            crate::handlers::stk::StkPushRequest,
            crate::handlers::stk::StkCallbackAck,
            crate::handlers::jobs::SweepRequest,
            crate::handlers::jobs::GenerateRequest,
            crate::stk::StkCallback,
            crate::stk::StkStatus,
            crate::jobs::SweepStats,
            crate::jobs::GenerationSummary,
        )
    ),
    info(
        title = "Rentledger API",
        description = "Rent payment reconciliation service",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
