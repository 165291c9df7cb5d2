//! Migration to create the payments table.
//!
//! One row per ledger entry. The storage layer is the sole concurrency-safety
//! mechanism for ingestion: duplicate webhook deliveries racing each other are
//! settled by the unique indexes created here, and the application treats a
//! unique violation on write as the idempotent-duplicate case.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Payments::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Payments::OccupantId).uuid().not_null())
                    .col(ColumnDef::new(Payments::UnitId).uuid().not_null())
                    .col(
                        ColumnDef::new(Payments::PeriodMonth)
                            .small_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Payments::PeriodYear).integer().not_null())
                    .col(
                        ColumnDef::new(Payments::ExpectedAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payments::PaidAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Payments::Deficit).big_integer().not_null())
                    .col(
                        ColumnDef::new(Payments::CarriedForward)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Payments::LateFee).big_integer().null())
                    .col(ColumnDef::new(Payments::Status).text().not_null())
                    .col(ColumnDef::new(Payments::Channel).text().not_null())
                    .col(ColumnDef::new(Payments::ExternalTxnId).text().null())
                    .col(ColumnDef::new(Payments::CheckoutRequestId).text().null())
                    .col(
                        ColumnDef::new(Payments::ReceiptNumber)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Payments::PayerName).text().null())
                    .col(ColumnDef::new(Payments::PayerPhone).text().null())
                    .col(ColumnDef::new(Payments::FailureReason).text().null())
                    .col(
                        ColumnDef::new(Payments::DueDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Payments::PaidAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Payments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Payments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payments_occupant_id")
                            .from(Payments::Table, Payments::OccupantId)
                            .to(Occupants::Table, Occupants::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payments_unit_id")
                            .from(Payments::Table, Payments::UnitId)
                            .to(BillingUnits::Table, BillingUnits::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique on the external transaction identifier; NULLs are exempt on
        // both backends, so records without one coexist freely.
        manager
            .create_index(
                Index::create()
                    .name("uq_payments_external_txn")
                    .table(Payments::Table)
                    .col(Payments::ExternalTxnId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // STK correlation key handed out by the push provider.
        manager
            .create_index(
                Index::create()
                    .name("uq_payments_checkout_request")
                    .table(Payments::Table)
                    .col(Payments::CheckoutRequestId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // At most one settled record per (occupant, unit, period). Partial
        // unique indexes need raw SQL; the statement is valid on Postgres and
        // SQLite alike.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_payments_settled_period ON payments (occupant_id, unit_id, period_year, period_month) WHERE status = 'paid'".to_string(),
            ))
            .await?;

        // Sweeper scan: open records by due date.
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_payments_status_due ON payments (status, due_date)".to_string(),
            ))
            .await?;

        // Period listing per occupant/unit.
        manager
            .create_index(
                Index::create()
                    .name("idx_payments_occupant_unit_period")
                    .table(Payments::Table)
                    .col(Payments::OccupantId)
                    .col(Payments::UnitId)
                    .col(Payments::PeriodYear)
                    .col(Payments::PeriodMonth)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "DROP INDEX IF EXISTS uq_payments_settled_period".to_string(),
            ))
            .await?;

        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "DROP INDEX IF EXISTS idx_payments_status_due".to_string(),
            ))
            .await?;

        manager
            .drop_index(Index::drop().name("uq_payments_external_txn").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("uq_payments_checkout_request")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_payments_occupant_unit_period")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Payments {
    Table,
    Id,
    OccupantId,
    UnitId,
    PeriodMonth,
    PeriodYear,
    ExpectedAmount,
    PaidAmount,
    Deficit,
    CarriedForward,
    LateFee,
    Status,
    Channel,
    ExternalTxnId,
    CheckoutRequestId,
    ReceiptNumber,
    PayerName,
    PayerPhone,
    FailureReason,
    DueDate,
    PaidAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Occupants {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum BillingUnits {
    Table,
    Id,
}
