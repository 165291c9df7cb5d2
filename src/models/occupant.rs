//! Occupant entity model
//!
//! Occupants are the tenants payments are posted against. Assignment to a
//! billing unit is recorded on the unit side so a unit can never hold two
//! occupants at once.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Occupant lifecycle status values.
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_INACTIVE: &str = "inactive";
pub const STATUS_PAST: &str = "past";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "occupants")]
pub struct Model {
    /// Unique identifier for the occupant (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub full_name: String,

    pub phone: Option<String>,

    pub email: Option<String>,

    /// External payment-account reference (e.g. the MSISDN the occupant
    /// usually pays from), used for display only.
    pub payment_account_ref: Option<String>,

    /// Lifecycle status: active, inactive, past
    pub status: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payment::Entity")]
    Payment,
    #[sea_orm(has_one = "super::billing_unit::Entity")]
    BillingUnit,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl Related<super::billing_unit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BillingUnit.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
