//! Database configuration module for rentflow.
//!
//! This module handles the record store connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust models.

use crate::entities::{
    Booking, LeaveRequest, Notification, Property, Review, SystemState, Transaction, User,
    UserRating, transaction,
};
use crate::errors::Result;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema, sea_query::Index,
};
use tracing::debug;

/// Default location of the `SQLite` database when nothing else is configured.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/rentflow.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable, if set.
#[must_use]
pub fn database_url_from_env() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Establishes a connection to the record store at `database_url`.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to record store at {database_url}");
    Database::connect(database_url).await.map_err(Into::into)
}

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates every table the occupancy core needs. Existing tables are left untouched.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, User).await?;
    create_table(db, &schema, Property).await?;
    create_table(db, &schema, Booking).await?;
    create_table(db, &schema, LeaveRequest).await?;
    create_table(db, &schema, Transaction).await?;
    create_table(db, &schema, Review).await?;
    create_table(db, &schema, UserRating).await?;
    create_table(db, &schema, Notification).await?;
    create_table(db, &schema, SystemState).await?;

    // One ledger entry per booking and calendar month
    let builder = db.get_database_backend();
    let ledger_month = Index::create()
        .if_not_exists()
        .unique()
        .name("idx_unique_transaction_booking_month")
        .table(Transaction)
        .col(transaction::Column::BookingId)
        .col(transaction::Column::Month)
        .col(transaction::Column::Year)
        .to_owned();
    db.execute(builder.build(&ledger_month)).await?;

    Ok(())
}
