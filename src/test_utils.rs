//! Shared test utilities for `rentflow`.
//!
//! Helpers for setting up an in-memory store and seeding users, properties and
//! bookings with sensible defaults. Lifecycle helpers go through the real operations
//! so seeded state obeys the same rules as production state.

use crate::{
    core::{
        AppContext, Actor,
        booking::{BookingDecision, BookingRequest, create_booking, decide_booking},
    },
    entities::{Property, notification, property, review, transaction, user, user_rating},
    errors::{Error, Result},
    models::{AvailabilityStatus, Role, TransactionStatus},
    notify::{NotificationEvent, Notifier},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde_json::json;
use tokio::sync::mpsc;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a context over a fresh database with a live notification queue.
/// Nothing drains the receiver; tests read published events from it directly.
pub async fn setup_test_context() -> Result<(AppContext, mpsc::Receiver<NotificationEvent>)> {
    let db = setup_test_db().await?;
    let (notifier, rx) = Notifier::channel(64);
    Ok((AppContext::new(db, notifier), rx))
}

/// Discards every event queued so far.
pub fn drain(rx: &mut mpsc::Receiver<NotificationEvent>) -> Vec<NotificationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Creates a user. The email is derived from the name.
pub async fn create_test_user(db: &DatabaseConnection, name: &str, role: Role) -> Result<user::Model> {
    user::ActiveModel {
        name: Set(name.to_string()),
        email: Set(format!("{}@example.com", name.to_lowercase())),
        role: Set(role.as_str().to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates an available property listed by `owner_id`.
pub async fn create_test_property(
    db: &DatabaseConnection,
    owner_id: i64,
    price: f64,
) -> Result<property::Model> {
    property::ActiveModel {
        owner_id: Set(owner_id),
        title: Set(format!("Flat {price:.0}")),
        price: Set(price),
        availability_status: Set(AvailabilityStatus::Available.as_str().to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// An owner, a tenant and one property listed by the owner.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub owner: user::Model,
    pub tenant: user::Model,
    pub property: property::Model,
}

/// Seeds the usual cast: owner "Olga", tenant "Tom" and a property at 100.0 a month.
pub async fn setup_scenario(ctx: &AppContext) -> Result<Scenario> {
    let owner = create_test_user(&ctx.database, "Olga", Role::Owner).await?;
    let tenant = create_test_user(&ctx.database, "Tom", Role::Tenant).await?;
    let property = create_test_property(&ctx.database, owner.id, 100.0).await?;
    Ok(Scenario {
        owner,
        tenant,
        property,
    })
}

/// Books the scenario property for the tenant with default dates.
pub async fn create_pending_booking(
    ctx: &AppContext,
    scenario: &Scenario,
) -> Result<crate::entities::booking::Model> {
    let request = BookingRequest {
        property_id: scenario.property.id,
        ..Default::default()
    };
    create_booking(ctx, &Actor::tenant(scenario.tenant.id), &request).await
}

/// Books the scenario property between two dates (any format `parse_instant` accepts).
pub async fn create_booking_between(
    ctx: &AppContext,
    scenario: &Scenario,
    start: &str,
    end: &str,
) -> Result<crate::entities::booking::Model> {
    let request = BookingRequest {
        property_id: scenario.property.id,
        start_date: Some(start.to_string()),
        end_date: Some(end.to_string()),
    };
    create_booking(ctx, &Actor::tenant(scenario.tenant.id), &request).await
}

/// Approves a booking as the scenario owner.
pub async fn approve(
    ctx: &AppContext,
    scenario: &Scenario,
    booking_id: i64,
) -> Result<crate::entities::booking::Model> {
    decide_booking(
        ctx,
        &Actor::owner(scenario.owner.id),
        booking_id,
        BookingDecision::Approved,
        None,
    )
    .await
}

/// Creates a booking with default dates and approves it.
pub async fn create_approved_booking(
    ctx: &AppContext,
    scenario: &Scenario,
) -> Result<crate::entities::booking::Model> {
    let booking = create_pending_booking(ctx, scenario).await?;
    approve(ctx, scenario, booking.id).await
}

/// Inserts a pending ledger entry expecting 100.0 with `paid` already received.
pub async fn create_test_transaction(
    db: &DatabaseConnection,
    booking_id: i64,
    month: i32,
    year: i32,
    paid: f64,
) -> Result<transaction::Model> {
    let now = Utc::now();
    transaction::ActiveModel {
        booking_id: Set(booking_id),
        month: Set(month),
        year: Set(year),
        total_expected: Set(100.0),
        total_paid: Set(paid),
        status: Set(TransactionStatus::Pending.as_str().to_string()),
        payment_method: Set(None),
        payment_date: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Overwrites a property's availability without going through the lifecycle.
pub async fn set_availability(
    db: &DatabaseConnection,
    property_id: i64,
    status: AvailabilityStatus,
) -> Result<()> {
    let property = Property::find_by_id(property_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("property", property_id))?;
    let mut active: property::ActiveModel = property.into();
    active.availability_status = Set(status.as_str().to_string());
    active.update(db).await?;
    Ok(())
}

pub async fn availability_of(db: &DatabaseConnection, property_id: i64) -> Result<AvailabilityStatus> {
    Property::find_by_id(property_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("property", property_id))?
        .availability()
}

pub async fn create_test_review(
    db: &DatabaseConnection,
    reviewer_id: i64,
    property_id: i64,
) -> Result<review::Model> {
    review::ActiveModel {
        reviewer_id: Set(reviewer_id),
        property_id: Set(property_id),
        rating: Set(4),
        comment: Set("Quiet street, good light".to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

pub async fn create_test_rating(
    db: &DatabaseConnection,
    rater_id: i64,
    ratee_id: i64,
) -> Result<user_rating::Model> {
    user_rating::ActiveModel {
        rater_id: Set(rater_id),
        ratee_id: Set(ratee_id),
        score: Set(5),
        comment: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Stores an unread notification, optionally tied to a property.
pub async fn create_test_notification(
    db: &DatabaseConnection,
    user_id: i64,
    property_id: Option<i64>,
) -> Result<notification::Model> {
    notification::ActiveModel {
        user_id: Set(user_id),
        title: Set("Heads up".to_string()),
        message: Set("Something happened".to_string()),
        link: Set("/".to_string()),
        is_read: Set(false),
        metadata: Set(json!({})),
        booking_id: Set(None),
        property_id: Set(property_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}
