//! Billing unit repository.

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::models::billing_unit::{self, Entity as BillingUnit};
use crate::models::occupant::{self, Entity as Occupant};

/// Repository for billing unit lookups.
#[derive(Debug, Clone)]
pub struct BillingUnitRepository {
    db: DatabaseConnection,
}

impl BillingUnitRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Find a unit by its account reference (unit number).
    pub async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<billing_unit::Model>, sea_orm::DbErr> {
        BillingUnit::find()
            .filter(billing_unit::Column::UnitNumber.eq(reference))
            .one(&self.db)
            .await
    }

    pub async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<billing_unit::Model>, sea_orm::DbErr> {
        BillingUnit::find_by_id(id).one(&self.db).await
    }

    /// Every occupied unit joined with its assigned occupant, the working set
    /// for the monthly rent generator. Units whose occupant row has gone
    /// missing are skipped by the join.
    pub async fn find_occupied_with_occupants(
        &self,
    ) -> Result<Vec<(billing_unit::Model, occupant::Model)>, sea_orm::DbErr> {
        let rows = BillingUnit::find()
            .filter(billing_unit::Column::OccupantId.is_not_null())
            .find_also_related(Occupant)
            .order_by_asc(billing_unit::Column::UnitNumber)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(unit, occupant)| occupant.map(|o| (unit, o)))
            .collect())
    }
}
