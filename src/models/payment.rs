//! Payment record entity model
//!
//! The ledger entry. Created either by the monthly rent generator
//! (expected-only, paid = 0) or directly by an ingestion channel (paid > 0),
//! then mutated in place as further funds or state updates arrive. Records
//! are never deleted by the reconciliation engine.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Unique identifier for the payment record (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub occupant_id: Uuid,

    pub unit_id: Uuid,

    /// Billing period month, 1-12
    pub period_month: i16,

    /// Billing period year, 4 digits
    pub period_year: i32,

    /// Rent plus any deficit carried forward from the preceding period
    pub expected_amount: i64,

    pub paid_amount: i64,

    /// max(0, expected - paid)
    pub deficit: i64,

    /// Deficit pulled forward from the preceding period
    pub carried_forward: i64,

    /// Late fee assessed by the overdue sweeper; null until assessed
    pub late_fee: Option<i64>,

    /// pending, partial, paid, overdue
    pub status: String,

    /// Ingestion channel that produced or last touched this record
    pub channel: String,

    /// External transaction identifier; unique when present
    pub external_txn_id: Option<String>,

    /// Push-provider checkout session id correlating an initiated STK push
    /// with its eventual callback
    pub checkout_request_id: Option<String>,

    /// Human-readable receipt identifier, RCP-<year>-<sequence>
    pub receipt_number: String,

    pub payer_name: Option<String>,

    pub payer_phone: Option<String>,

    /// Failure annotation from a rejected/cancelled STK push
    pub failure_reason: Option<String>,

    pub due_date: Option<DateTimeWithTimeZone>,

    pub paid_at: Option<DateTimeWithTimeZone>,

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
    #[sea_orm(
        belongs_to = "super::billing_unit::Entity",
        from = "Column::UnitId",
        to = "super::billing_unit::Column::Id"
    )]
    BillingUnit,
}

impl Related<super::occupant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Occupant.def()
    }
}

impl Related<super::billing_unit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BillingUnit.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
