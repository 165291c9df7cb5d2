//! # Error Handling
//!
//! Unified error handling for the rentledger API: a problem+json response
//! type with trace ID propagation, plus the domain error taxonomy for the
//! payment reconciliation engine.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the active tracing span (falls back to a
    /// generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Classify a SeaORM error as a unique-constraint violation.
///
/// The storage layer is the sole concurrency-safety mechanism for ingestion;
/// callers remap violations to the idempotent-duplicate path instead of
/// failing.
pub fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        if code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str) {
            return true;
        }
    }

    false
}

/// Domain error taxonomy for the payment reconciliation engine.
///
/// Validation and resolution failures are recovered locally and translated
/// into caller-visible results; only storage and provider connectivity
/// failures propagate as infrastructure alarms.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Bad input; rejected, never retried
    #[error("malformed payment notification: {0}")]
    MalformedNotification(String),

    /// Negative or unparseable amount
    #[error("invalid payment amount: {0}")]
    InvalidAmount(String),

    /// No billing unit matches the account reference
    #[error("no billing unit matches account reference '{reference}'")]
    UnitNotFound { reference: String },

    /// The unit exists but has no assigned occupant; payments cannot be
    /// posted to vacant units
    #[error("billing unit '{reference}' has no assigned occupant")]
    NoOccupant { reference: String },

    /// A settled record already exists for the period; carries the existing
    /// receipt so callers can respond idempotently
    #[error("period already settled under receipt {receipt}")]
    AlreadySettled { receipt: String },

    /// Provider credentials invalid or missing; surfaced to the operator,
    /// the payment is not attempted
    #[error("push provider authentication failed: {0}")]
    ProviderAuth(String),

    /// Transient provider/network failure; the caller may retry
    #[error("push provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] sea_orm::DbErr),
}

impl PaymentError {
    /// True for the error classes a webhook pipeline drops (logged, no ledger
    /// mutation) rather than alarms on.
    pub fn is_terminal_for_notification(&self) -> bool {
        matches!(
            self,
            PaymentError::MalformedNotification(_)
                | PaymentError::InvalidAmount(_)
                | PaymentError::UnitNotFound { .. }
                | PaymentError::NoOccupant { .. }
                | PaymentError::AlreadySettled { .. }
        )
    }
}

impl From<PaymentError> for ApiError {
    fn from(error: PaymentError) -> Self {
        match error {
            PaymentError::MalformedNotification(ref msg) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "MALFORMED_NOTIFICATION",
                msg.as_str(),
            ),
            PaymentError::InvalidAmount(ref msg) => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_AMOUNT", msg.as_str())
            }
            PaymentError::UnitNotFound { .. } => ApiError::new(
                StatusCode::NOT_FOUND,
                "UNIT_NOT_FOUND",
                &error.to_string(),
            ),
            PaymentError::NoOccupant { .. } => {
                ApiError::new(StatusCode::NOT_FOUND, "NO_OCCUPANT", &error.to_string())
            }
            PaymentError::AlreadySettled { ref receipt } => ApiError::new(
                StatusCode::CONFLICT,
                "ALREADY_SETTLED",
                "a settled payment already exists for this period",
            )
            .with_details(json!({ "receipt_number": receipt })),
            PaymentError::ProviderAuth(ref msg) => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "PROVIDER_AUTH_ERROR",
                msg.as_str(),
            ),
            PaymentError::ProviderUnavailable(ref msg) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "PROVIDER_UNAVAILABLE",
                msg.as_str(),
            )
            .with_retry_after(30),
            PaymentError::Storage(db_err) => db_err.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after {
            if let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string()) {
                headers.insert("retry-after", header_value);
            }
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}
