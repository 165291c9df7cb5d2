//! # Data Models
//!
//! SeaORM entity models for the rent ledger.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod billing_unit;
pub mod occupant;
pub mod payment;
pub mod receipt_counter;

pub use billing_unit::Entity as BillingUnit;
pub use occupant::Entity as Occupant;
pub use payment::Entity as Payment;
pub use receipt_counter::Entity as ReceiptCounter;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "rentledger".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
