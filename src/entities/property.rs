//! Property entity - A rentable unit listed by an owner.
//!
//! `availability_status` is maintained by the booking lifecycle through
//! `core::booking::reconcile_availability`; it is never computed on read.

use crate::models::AvailabilityStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Property database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "properties")]
pub struct Model {
    /// Unique identifier for the property
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User ID of the listing owner
    pub owner_id: i64,
    /// Listing title
    pub title: String,
    /// Rent per month, also used as the per-day booking rate
    pub price: f64,
    /// `"Available"`, `"Booked"` or `"Not Available"`
    pub availability_status: String,
    /// When the listing was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Property and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each property belongs to one owner
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OwnerId",
        to = "super::user::Column::Id"
    )]
    Owner,
    /// One property has many bookings over time
    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,
    /// One property has many reviews
    #[sea_orm(has_many = "super::review::Entity")]
    Reviews,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reviews.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parsed availability flag.
    pub fn availability(&self) -> crate::errors::Result<AvailabilityStatus> {
        self.availability_status.parse()
    }
}
