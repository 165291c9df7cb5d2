//! Occupant repository.

use sea_orm::{DatabaseConnection, EntityTrait};
use uuid::Uuid;

use crate::models::occupant::{self, Entity as Occupant};

/// Repository for occupant lookups.
#[derive(Debug, Clone)]
pub struct OccupantRepository {
    db: DatabaseConnection,
}

impl OccupantRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<occupant::Model>, sea_orm::DbErr> {
        Occupant::find_by_id(id).one(&self.db).await
    }
}
