//! Transaction entity - One month of rent for one booking.
//!
//! There is at most one row per (`booking_id`, `month`, `year`); the ledger looks the
//! row up before inserting. Amounts are in the same unit as `property.price`.

use crate::models::TransactionStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Booking this month of rent belongs to
    pub booking_id: i64,
    /// Calendar month, 1 through 12
    pub month: i32,
    /// Calendar year
    pub year: i32,
    /// Amount owed for the month
    pub total_expected: f64,
    /// Amount received so far
    pub total_paid: f64,
    /// Ledger state, see [`TransactionStatus`]
    pub status: String,
    /// How the tenant says they paid
    pub payment_method: Option<String>,
    /// When the month was marked paid or advanced
    pub payment_date: Option<DateTimeUtc>,
    /// When the ledger entry was created
    pub created_at: DateTimeUtc,
    /// When the ledger entry was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one booking
    #[sea_orm(
        belongs_to = "super::booking::Entity",
        from = "Column::BookingId",
        to = "super::booking::Column::Id"
    )]
    Booking,
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Booking.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parsed ledger state.
    pub fn status(&self) -> crate::errors::Result<TransactionStatus> {
        self.status.parse()
    }

    /// Amount still owed for the month, never negative.
    #[must_use]
    pub fn outstanding(&self) -> f64 {
        (self.total_expected - self.total_paid).max(0.0)
    }

    /// Whether everything expected for the month has been received.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.total_paid >= self.total_expected
    }
}
