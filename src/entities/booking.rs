//! Booking entity - A tenant's claim on a property for a date range.
//!
//! `version` is bumped on every guarded update so that two writers racing on the
//! same booking cannot both commit.

use crate::models::BookingStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Booking database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
pub struct Model {
    /// Unique identifier for the booking
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User ID of the tenant who requested the booking
    pub tenant_id: i64,
    /// Property being booked
    pub property_id: i64,
    /// First instant of the occupancy
    pub start_date: DateTimeUtc,
    /// End of the occupancy, always after `start_date`
    pub end_date: DateTimeUtc,
    /// Amount charged for the whole range
    pub total_amount: f64,
    /// Lifecycle state, see [`BookingStatus`]
    pub status: String,
    /// Reason given by the owner when rejecting
    pub rejection_reason: Option<String>,
    /// Optimistic concurrency counter
    pub version: i32,
    /// When the booking was requested
    pub created_at: DateTimeUtc,
    /// When the booking was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Booking and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each booking targets one property
    #[sea_orm(
        belongs_to = "super::property::Entity",
        from = "Column::PropertyId",
        to = "super::property::Column::Id"
    )]
    Property,
    /// Each booking is owned by one tenant
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::TenantId",
        to = "super::user::Column::Id"
    )]
    Tenant,
    /// One booking has one ledger entry per month
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
    /// One booking has many leave requests over time
    #[sea_orm(has_many = "super::leave_request::Entity")]
    LeaveRequests,
}

impl Related<super::property::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Property.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl Related<super::leave_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LeaveRequests.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parsed lifecycle state.
    pub fn status(&self) -> crate::errors::Result<BookingStatus> {
        self.status.parse()
    }
}
