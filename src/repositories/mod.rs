//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the
//! ledger entities. Repositories return raw `DbErr` so callers can classify
//! unique violations themselves; the posting service depends on that.

pub mod billing_unit;
pub mod occupant;
pub mod payment;
pub mod receipt;

pub use billing_unit::BillingUnitRepository;
pub use occupant::OccupantRepository;
pub use payment::PaymentRepository;
pub use receipt::ReceiptRepository;
