//! Database migrations for the rentledger service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_10_000100_create_occupants;
mod m2026_01_10_000200_create_billing_units;
mod m2026_01_10_000300_create_payments;
mod m2026_01_10_000400_create_receipt_counters;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_10_000100_create_occupants::Migration),
            Box::new(m2026_01_10_000200_create_billing_units::Migration),
            Box::new(m2026_01_10_000300_create_payments::Migration),
            Box::new(m2026_01_10_000400_create_receipt_counters::Migration),
        ]
    }
}
