//! User rating entity - One user's score of another (tenant of owner, or vice versa).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User rating database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_ratings")]
pub struct Model {
    /// Unique identifier for the rating
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User giving the score
    pub rater_id: i64,
    /// User being scored
    pub ratee_id: i64,
    /// Score from 1 to 5
    pub score: i32,
    /// Optional remark
    pub comment: Option<String>,
    /// When the rating was given
    pub created_at: DateTimeUtc,
}

/// `UserRating` only references users by id
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
