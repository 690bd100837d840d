//! Leave request entity - A tenant's request to end an approved booking early.
//!
//! `condition`, `decision_note`, `effective_end_date` and `decided_at` are only
//! filled in once the owner has decided.

use crate::models::{LeaveCondition, LeaveStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Leave request database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "leave_requests")]
pub struct Model {
    /// Unique identifier for the request
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Booking the tenant wants to leave
    pub booking_id: i64,
    /// Tenant who asked
    pub tenant_id: i64,
    /// Owner of the booked property at request time
    pub owner_id: i64,
    /// Booked property
    pub property_id: i64,
    /// Free-text message from the tenant
    pub message: String,
    /// `"pending"`, `"approved"` or `"rejected"`
    pub status: String,
    /// Resolution policy chosen on approval
    pub condition: Option<String>,
    /// Note left by the deciding owner or admin
    pub decision_note: Option<String>,
    /// Resolved termination instant
    pub effective_end_date: Option<DateTimeUtc>,
    /// When the request was made
    pub created_at: DateTimeUtc,
    /// When the request was decided
    pub decided_at: Option<DateTimeUtc>,
}

/// Defines relationships between LeaveRequest and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each request belongs to one booking
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
    /// Parsed request state.
    pub fn status(&self) -> crate::errors::Result<LeaveStatus> {
        self.status.parse()
    }

    /// Parsed resolution policy, if the request has been approved.
    pub fn condition(&self) -> crate::errors::Result<Option<LeaveCondition>> {
        self.condition.as_deref().map(str::parse).transpose()
    }
}
