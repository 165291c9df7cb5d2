//! Billing unit entity model
//!
//! A rentable property unit with a contracted rent amount. The unit number is
//! the account reference payers quote on every ingestion channel.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Unit lifecycle status values.
pub const STATUS_AVAILABLE: &str = "available";
pub const STATUS_OCCUPIED: &str = "occupied";
pub const STATUS_MAINTENANCE: &str = "maintenance";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "billing_units")]
pub struct Model {
    /// Unique identifier for the unit (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Account reference quoted by payers; unique per property
    pub unit_number: String,

    pub property_name: Option<String>,

    /// Contracted monthly rent in minor currency units
    pub rent_amount: i64,

    /// Currently assigned occupant; at most one per unit
    pub occupant_id: Option<Uuid>,

    /// Lifecycle status: available, occupied, maintenance
    pub status: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::occupant::Entity",
        from = "Column::OccupantId",
        to = "super::occupant::Column::Id"
    )]
    Occupant,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payment,
}

impl Related<super::occupant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Occupant.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
