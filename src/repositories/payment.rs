//! Payment record repository.
//!
//! Query surface for the reconciliation engine: duplicate lookups, period
//! scans, sweeper candidates, and the caller-facing listing filters.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use uuid::Uuid;

use crate::ledger::{PaymentStatus, Period};
use crate::models::payment::{self, Entity as Payment};

/// Caller-facing listing filters; all optional, combined with AND.
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub occupant_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
    pub period: Option<Period>,
    pub status: Option<PaymentStatus>,
}

/// Repository for payment record operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    db: DatabaseConnection,
}

impl PaymentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<payment::Model>, sea_orm::DbErr> {
        Payment::find_by_id(id).one(&self.db).await
    }

    pub async fn find_by_external_txn_id(
        &self,
        external_txn_id: &str,
    ) -> Result<Option<payment::Model>, sea_orm::DbErr> {
        Payment::find()
            .filter(payment::Column::ExternalTxnId.eq(external_txn_id))
            .one(&self.db)
            .await
    }

    pub async fn find_by_checkout_request_id(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<payment::Model>, sea_orm::DbErr> {
        Payment::find()
            .filter(payment::Column::CheckoutRequestId.eq(checkout_request_id))
            .one(&self.db)
            .await
    }

    pub async fn find_by_receipt_number(
        &self,
        receipt_number: &str,
    ) -> Result<Option<payment::Model>, sea_orm::DbErr> {
        Payment::find()
            .filter(payment::Column::ReceiptNumber.eq(receipt_number))
            .one(&self.db)
            .await
    }

    /// All records for one (occupant, unit, period), newest first.
    pub async fn find_for_period(
        &self,
        occupant_id: Uuid,
        unit_id: Uuid,
        period: Period,
    ) -> Result<Vec<payment::Model>, sea_orm::DbErr> {
        Payment::find()
            .filter(payment::Column::OccupantId.eq(occupant_id))
            .filter(payment::Column::UnitId.eq(unit_id))
            .filter(payment::Column::PeriodYear.eq(period.year))
            .filter(payment::Column::PeriodMonth.eq(period.month as i16))
            .order_by_desc(payment::Column::CreatedAt)
            .all(&self.db)
            .await
    }

    /// The settled record for a period, if any. The partial unique index
    /// guarantees at most one exists.
    pub async fn find_settled_for_period(
        &self,
        occupant_id: Uuid,
        unit_id: Uuid,
        period: Period,
    ) -> Result<Option<payment::Model>, sea_orm::DbErr> {
        Payment::find()
            .filter(payment::Column::OccupantId.eq(occupant_id))
            .filter(payment::Column::UnitId.eq(unit_id))
            .filter(payment::Column::PeriodYear.eq(period.year))
            .filter(payment::Column::PeriodMonth.eq(period.month as i16))
            .filter(payment::Column::Status.eq(PaymentStatus::Paid.as_str()))
            .one(&self.db)
            .await
    }

    /// The oldest open (pending/partial/overdue) record for a period; further
    /// funds accumulate into it. Oldest-first keeps generator-created records
    /// as the accumulation target.
    pub async fn find_open_for_period(
        &self,
        occupant_id: Uuid,
        unit_id: Uuid,
        period: Period,
    ) -> Result<Option<payment::Model>, sea_orm::DbErr> {
        Payment::find()
            .filter(payment::Column::OccupantId.eq(occupant_id))
            .filter(payment::Column::UnitId.eq(unit_id))
            .filter(payment::Column::PeriodYear.eq(period.year))
            .filter(payment::Column::PeriodMonth.eq(period.month as i16))
            .filter(
                payment::Column::Status.is_in([
                    PaymentStatus::Pending.as_str(),
                    PaymentStatus::Partial.as_str(),
                    PaymentStatus::Overdue.as_str(),
                ]),
            )
            .order_by_asc(payment::Column::CreatedAt)
            .one(&self.db)
            .await
    }

    /// Deficit carried into `period` from its immediately preceding period.
    ///
    /// A settled prior record carries nothing; otherwise the most recent
    /// record's deficit is carried. No prior record means no carry.
    pub async fn carried_forward_into(
        &self,
        occupant_id: Uuid,
        unit_id: Uuid,
        period: Period,
    ) -> Result<i64, sea_orm::DbErr> {
        let prior = self
            .find_for_period(occupant_id, unit_id, period.preceding())
            .await?;

        if prior.is_empty()
            || prior
                .iter()
                .any(|record| record.status == PaymentStatus::Paid.as_str())
        {
            return Ok(0);
        }

        Ok(prior[0].deficit)
    }

    /// Open records whose due date elapsed before `cutoff`; the overdue
    /// sweeper's working set.
    pub async fn find_sweep_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<payment::Model>, sea_orm::DbErr> {
        Payment::find()
            .filter(
                payment::Column::Status.is_in([
                    PaymentStatus::Pending.as_str(),
                    PaymentStatus::Partial.as_str(),
                ]),
            )
            .filter(payment::Column::DueDate.is_not_null())
            .filter(payment::Column::DueDate.lt(cutoff))
            .order_by_asc(payment::Column::DueDate)
            .all(&self.db)
            .await
    }

    /// Whether any record exists for the key; the generator's skip check.
    pub async fn exists_for_period(
        &self,
        occupant_id: Uuid,
        unit_id: Uuid,
        period: Period,
    ) -> Result<bool, sea_orm::DbErr> {
        let found = Payment::find()
            .filter(payment::Column::OccupantId.eq(occupant_id))
            .filter(payment::Column::UnitId.eq(unit_id))
            .filter(payment::Column::PeriodYear.eq(period.year))
            .filter(payment::Column::PeriodMonth.eq(period.month as i16))
            .limit(1)
            .one(&self.db)
            .await?;
        Ok(found.is_some())
    }

    pub async fn insert(
        &self,
        record: payment::ActiveModel,
    ) -> Result<payment::Model, sea_orm::DbErr> {
        record.insert(&self.db).await
    }

    pub async fn update(
        &self,
        record: payment::ActiveModel,
    ) -> Result<payment::Model, sea_orm::DbErr> {
        record.update(&self.db).await
    }

    /// Filtered listing for the query endpoints, newest first.
    pub async fn list(
        &self,
        filter: PaymentFilter,
        limit: u64,
    ) -> Result<Vec<payment::Model>, sea_orm::DbErr> {
        let mut condition = Condition::all();

        if let Some(occupant_id) = filter.occupant_id {
            condition = condition.add(payment::Column::OccupantId.eq(occupant_id));
        }
        if let Some(unit_id) = filter.unit_id {
            condition = condition.add(payment::Column::UnitId.eq(unit_id));
        }
        if let Some(period) = filter.period {
            condition = condition
                .add(payment::Column::PeriodYear.eq(period.year))
                .add(payment::Column::PeriodMonth.eq(period.month as i16));
        }
        if let Some(status) = filter.status {
            condition = condition.add(payment::Column::Status.eq(status.as_str()));
        }

        Payment::find()
            .filter(condition)
            .order_by_desc(payment::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }
}
