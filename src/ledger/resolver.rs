//! Billing unit resolution.
//!
//! Maps an account reference (the unit number payers quote) to the unit and
//! its assigned occupant. Side-effect-free; every ingestion path and the STK
//! initiator go through here before touching the ledger.

use sea_orm::DatabaseConnection;

use crate::error::PaymentError;
use crate::models::{billing_unit, occupant};
use crate::repositories::{BillingUnitRepository, OccupantRepository};

/// Resolve an account reference to its billing unit and assigned occupant.
///
/// Fails with [`PaymentError::UnitNotFound`] when no unit matches and
/// [`PaymentError::NoOccupant`] when the unit is vacant; payments can never
/// be posted to vacant units.
pub async fn resolve_billing_unit(
    db: &DatabaseConnection,
    account_reference: &str,
) -> Result<(billing_unit::Model, occupant::Model), PaymentError> {
    let reference = account_reference.trim();
    if reference.is_empty() {
        return Err(PaymentError::MalformedNotification(
            "missing account reference".to_string(),
        ));
    }

    let unit = BillingUnitRepository::new(db.clone())
        .find_by_reference(reference)
        .await?
        .ok_or_else(|| PaymentError::UnitNotFound {
            reference: reference.to_string(),
        })?;

    let occupant_id = unit.occupant_id.ok_or_else(|| PaymentError::NoOccupant {
        reference: reference.to_string(),
    })?;

    let occupant = OccupantRepository::new(db.clone())
        .find_by_id(occupant_id)
        .await?
        .ok_or_else(|| PaymentError::NoOccupant {
            reference: reference.to_string(),
        })?;

    Ok((unit, occupant))
}
