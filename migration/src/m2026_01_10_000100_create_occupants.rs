//! Migration to create the occupants table.
//!
//! Occupants are the tenants payments are posted against. Unit assignment
//! lives on the billing_units side so a unit can hold at most one occupant.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Occupants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Occupants::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Occupants::FullName).text().not_null())
                    .col(ColumnDef::new(Occupants::Phone).text().null())
                    .col(ColumnDef::new(Occupants::Email).text().null())
                    .col(ColumnDef::new(Occupants::PaymentAccountRef).text().null())
                    .col(ColumnDef::new(Occupants::Status).text().not_null())
                    .col(
                        ColumnDef::new(Occupants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Occupants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Occupants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Occupants {
    Table,
    Id,
    FullName,
    Phone,
    Email,
    PaymentAccountRef,
    Status,
    CreatedAt,
    UpdatedAt,
}
