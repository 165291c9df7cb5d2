//! Migration to create the billing_units table.
//!
//! A billing unit is a rentable property unit identified by its unit number
//! (the account reference payers quote on every channel). The unique index on
//! occupant_id enforces exclusive assignment: one active occupant per unit.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BillingUnits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BillingUnits::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BillingUnits::UnitNumber)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(BillingUnits::PropertyName).text().null())
                    .col(
                        ColumnDef::new(BillingUnits::RentAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BillingUnits::OccupantId).uuid().null())
                    .col(ColumnDef::new(BillingUnits::Status).text().not_null())
                    .col(
                        ColumnDef::new(BillingUnits::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BillingUnits::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_billing_units_occupant_id")
                            .from(BillingUnits::Table, BillingUnits::OccupantId)
                            .to(Occupants::Table, Occupants::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_billing_units_occupant")
                    .table(BillingUnits::Table)
                    .col(BillingUnits::OccupantId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uq_billing_units_occupant").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BillingUnits::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BillingUnits {
    Table,
    Id,
    UnitNumber,
    PropertyName,
    RentAmount,
    OccupantId,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Occupants {
    Table,
    Id,
}
