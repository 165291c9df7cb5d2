//! Receipt number allocation.
//!
//! Receipt identifiers are `RCP-<year>-<zero-padded sequence>`, with one
//! sequence per calendar year. Allocation is a single atomic
//! upsert-increment executed by the store, so concurrent postings can never
//! be handed the same number; gaps from abandoned postings are acceptable.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Statement, Value};

/// Repository for receipt sequence allocation.
#[derive(Debug, Clone)]
pub struct ReceiptRepository {
    db: DatabaseConnection,
}

impl ReceiptRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Allocate the next receipt number for the given year.
    pub async fn next_number(&self, year: i32) -> Result<String, DbErr> {
        // Valid on both Postgres and SQLite: the conflict target bumps the
        // existing row and RETURNING hands back the allocated value.
        let stmt = Statement::from_sql_and_values(
            self.db.get_database_backend(),
            "INSERT INTO receipt_counters (year, last_seq) VALUES ($1, 1) \
             ON CONFLICT(year) DO UPDATE SET last_seq = last_seq + 1 \
             RETURNING last_seq",
            [Value::Int(Some(year))],
        );

        let row = self
            .db
            .query_one(stmt)
            .await?
            .ok_or_else(|| DbErr::Custom("receipt counter returned no row".to_string()))?;

        let seq: i64 = row.try_get("", "last_seq")?;
        Ok(format_receipt(year, seq))
    }
}

fn format_receipt(year: i32, seq: i64) -> String {
    format!("RCP-{year}-{seq:06}")
}
