//! Notification entity - Persisted copy of a delivered notification event.
//!
//! Rows are written by `notify::DatabaseSink` after the originating operation has
//! committed. `booking_id` and `property_id` let cascading deletes find them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Notification database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    /// Unique identifier for the notification
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Recipient
    pub user_id: i64,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Where the client should navigate
    pub link: String,
    /// Whether the recipient has seen it
    pub is_read: bool,
    /// Arbitrary structured context
    pub metadata: Json,
    /// Booking the notification is about, if any
    pub booking_id: Option<i64>,
    /// Property the notification is about, if any
    pub property_id: Option<i64>,
    /// When the notification was stored
    pub created_at: DateTimeUtc,
}

/// `Notification` only references other rows by id
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
