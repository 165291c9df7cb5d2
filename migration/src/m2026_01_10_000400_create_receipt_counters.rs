//! Migration to create the receipt_counters table.
//!
//! Backs the year-scoped receipt sequence. Numbers are allocated with an
//! atomic upsert-increment so concurrent postings can never observe the same
//! value; the counter is never read-then-written by application code.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReceiptCounters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReceiptCounters::Year)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReceiptCounters::LastSeq)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReceiptCounters::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ReceiptCounters {
    Table,
    Year,
    LastSeq,
}
