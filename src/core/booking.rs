//! Booking lifecycle - request, decide, cancel and delete bookings.
//!
//! Every operation runs inside one database transaction and returns the
//! notifications it wants sent; they are published only after commit. Property
//! availability is never set directly: each mutation ends with
//! [`reconcile_availability`] for the affected property, inside the same transaction.
//!
//! Status changes go through [`apply_booking_update`], which bumps `version` and only
//! succeeds if nobody else changed the booking since it was read.

use super::{AppContext, Actor, calendar, log_failure};
use crate::{
    entities::{Booking, LeaveRequest, Property, Transaction, booking, leave_request, property, transaction},
    errors::{Error, Result},
    models::{AvailabilityStatus, BookingStatus},
    notify::{NotificationEvent, Outbox},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{Set, TransactionTrait, prelude::*};
use serde_json::json;
use tracing::{debug, info, instrument};

/// Raw booking request as received from the caller.
#[derive(Debug, Clone, Default)]
pub struct BookingRequest {
    /// Property to book
    pub property_id: i64,
    /// Requested start; unparseable or missing values fall back to now
    pub start_date: Option<String>,
    /// Requested end; unparseable, missing or non-positive ranges fall back to start + 1 day
    pub end_date: Option<String>,
}

/// Outcome an owner may give a pending booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingDecision {
    /// Accept the booking; the property becomes Booked
    Approved,
    /// Decline it, optionally with a reason for the tenant
    Rejected,
}

impl BookingDecision {
    const fn status(self) -> BookingStatus {
        match self {
            Self::Approved => BookingStatus::Approved,
            Self::Rejected => BookingStatus::Rejected,
        }
    }
}

/// Fields a guarded booking update may change.
#[derive(Debug, Clone, Default)]
pub(crate) struct BookingUpdate {
    pub status: Option<BookingStatus>,
    pub end_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

/// Normalizes caller-supplied dates into a valid `[start, end)` range.
///
/// A start before the current UTC day is rejected; everything else that cannot be
/// used is replaced by a safe default.
pub fn resolve_booking_dates(
    now: DateTime<Utc>,
    start_raw: Option<&str>,
    end_raw: Option<&str>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = start_raw.and_then(calendar::parse_instant).unwrap_or(now);
    if start < calendar::start_of_day(now) {
        return Err(Error::invalid_input(format!(
            "start date {} is in the past",
            start.to_rfc3339()
        )));
    }

    let end = end_raw
        .and_then(calendar::parse_instant)
        .filter(|end| *end > start)
        .unwrap_or_else(|| start + Duration::days(1));

    Ok((start, end))
}

/// Loads a booking or fails with `NotFound`.
pub(crate) async fn find_booking<C: ConnectionTrait>(db: &C, booking_id: i64) -> Result<booking::Model> {
    Booking::find_by_id(booking_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("booking", booking_id))
}

/// Loads a property or fails with `NotFound`.
pub(crate) async fn find_property<C: ConnectionTrait>(
    db: &C,
    property_id: i64,
) -> Result<property::Model> {
    Property::find_by_id(property_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("property", property_id))
}

/// Writes `update` to `current` if its version is still the one that was read.
pub(crate) async fn apply_booking_update<C: ConnectionTrait>(
    db: &C,
    current: &booking::Model,
    update: BookingUpdate,
    now: DateTime<Utc>,
) -> Result<booking::Model> {
    let mut active: booking::ActiveModel = current.clone().into();
    if let Some(status) = update.status {
        active.status = Set(status.as_str().to_string());
    }
    if let Some(end_date) = update.end_date {
        active.end_date = Set(end_date);
    }
    if let Some(reason) = update.rejection_reason {
        active.rejection_reason = Set(Some(reason));
    }
    active.version = Set(current.version + 1);
    active.updated_at = Set(now);

    let result = Booking::update_many()
        .set(active)
        .filter(booking::Column::Id.eq(current.id))
        .filter(booking::Column::Version.eq(current.version))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::ConcurrentModification {
            booking_id: current.id,
        });
    }

    find_booking(db, current.id).await
}

/// Recomputes a property's availability from its bookings.
///
/// The property is Booked while an approved booking that has not yet ended exists.
/// Without one, a Booked property returns to Available; an owner-set
/// "Not Available" is left alone. Returns the new status when it changed.
pub async fn reconcile_availability<C: ConnectionTrait>(
    db: &C,
    property_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<AvailabilityStatus>> {
    let Some(property) = Property::find_by_id(property_id).one(db).await? else {
        return Ok(None);
    };
    let current = property.availability()?;

    let holds_property = Booking::find()
        .filter(booking::Column::PropertyId.eq(property_id))
        .filter(booking::Column::Status.eq(BookingStatus::Approved.as_str()))
        .all(db)
        .await?
        .iter()
        .any(|b| b.end_date > now);

    let target = match (holds_property, current) {
        (true, _) => AvailabilityStatus::Booked,
        (false, AvailabilityStatus::Booked) => AvailabilityStatus::Available,
        (false, other) => other,
    };

    if target == current {
        return Ok(None);
    }

    let mut active: property::ActiveModel = property.into();
    active.availability_status = Set(target.as_str().to_string());
    active.update(db).await?;
    debug!("Property {property_id} availability {current} -> {target}");
    Ok(Some(target))
}

fn booking_link(booking_id: i64) -> String {
    format!("/bookings/{booking_id}")
}

/// Requests a booking. The new booking is pending and the property owner is notified.
#[instrument(skip(ctx, request), fields(property_id = request.property_id))]
pub async fn create_booking(
    ctx: &AppContext,
    actor: &Actor,
    request: &BookingRequest,
) -> Result<booking::Model> {
    let (booking, outbox) = create_booking_txn(ctx, actor, request)
        .await
        .inspect_err(|e| log_failure("create_booking", e))?;
    ctx.notifier.publish(outbox);
    Ok(booking)
}

async fn create_booking_txn(
    ctx: &AppContext,
    actor: &Actor,
    request: &BookingRequest,
) -> Result<(booking::Model, Outbox)> {
    let now = ctx.now();
    let (start, end) = resolve_booking_dates(
        now,
        request.start_date.as_deref(),
        request.end_date.as_deref(),
    )?;

    let txn = ctx.database.begin().await?;

    let property = find_property(&txn, request.property_id).await?;
    if property.owner_id == actor.user_id {
        return Err(Error::forbidden("owners cannot book their own property"));
    }
    if property.availability()? != AvailabilityStatus::Available {
        return Err(Error::invalid_state(format!(
            "property {} is {}",
            property.id, property.availability_status
        )));
    }

    let days = calendar::billable_days(start, end);
    #[allow(clippy::cast_precision_loss)]
    let total_amount = days as f64 * property.price;

    let booking = booking::ActiveModel {
        tenant_id: Set(actor.user_id),
        property_id: Set(property.id),
        start_date: Set(start),
        end_date: Set(end),
        total_amount: Set(total_amount),
        status: Set(BookingStatus::Pending.as_str().to_string()),
        rejection_reason: Set(None),
        version: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(
        booking_id = booking.id,
        tenant_id = actor.user_id,
        "Booking requested for {days} day(s), total {total_amount:.2}"
    );

    let mut outbox = Outbox::new();
    outbox.push(
        NotificationEvent::new(
            property.owner_id,
            "New booking request",
            format!("A tenant requested \"{}\" for {days} day(s).", property.title),
            booking_link(booking.id),
        )
        .about(booking.id, property.id)
        .with_metadata(json!({ "status": booking.status, "total_amount": total_amount })),
    );
    Ok((booking, outbox))
}

/// Approves or rejects a pending booking. Only the property owner or an admin may decide.
#[instrument(skip(ctx, reason))]
pub async fn decide_booking(
    ctx: &AppContext,
    actor: &Actor,
    booking_id: i64,
    decision: BookingDecision,
    reason: Option<String>,
) -> Result<booking::Model> {
    let (booking, outbox) = decide_booking_txn(ctx, actor, booking_id, decision, reason)
        .await
        .inspect_err(|e| log_failure("decide_booking", e))?;
    ctx.notifier.publish(outbox);
    Ok(booking)
}

async fn decide_booking_txn(
    ctx: &AppContext,
    actor: &Actor,
    booking_id: i64,
    decision: BookingDecision,
    reason: Option<String>,
) -> Result<(booking::Model, Outbox)> {
    let now = ctx.now();
    let txn = ctx.database.begin().await?;

    let current = find_booking(&txn, booking_id).await?;
    let property = find_property(&txn, current.property_id).await?;
    if !actor.manages(&property) {
        return Err(Error::forbidden("only the property owner or an admin can decide bookings"));
    }
    if current.status()? != BookingStatus::Pending {
        return Err(Error::invalid_state(format!(
            "booking {booking_id} is already {}",
            current.status
        )));
    }

    let update = BookingUpdate {
        status: Some(decision.status()),
        rejection_reason: match decision {
            BookingDecision::Rejected => reason.clone(),
            BookingDecision::Approved => None,
        },
        ..Default::default()
    };
    let booking = apply_booking_update(&txn, &current, update, now).await?;
    reconcile_availability(&txn, property.id, now).await?;

    txn.commit().await?;
    info!(booking_id, "Booking {}", booking.status);

    let message = match (decision, reason.as_deref()) {
        (BookingDecision::Approved, _) => format!("Your booking for \"{}\" was approved.", property.title),
        (BookingDecision::Rejected, Some(reason)) => {
            format!("Your booking for \"{}\" was rejected: {reason}", property.title)
        }
        (BookingDecision::Rejected, None) => format!("Your booking for \"{}\" was rejected.", property.title),
    };
    let mut outbox = Outbox::new();
    outbox.push(
        NotificationEvent::new(
            booking.tenant_id,
            format!("Booking {}", booking.status),
            message,
            booking_link(booking.id),
        )
        .about(booking.id, property.id)
        .with_metadata(json!({ "status": booking.status })),
    );
    Ok((booking, outbox))
}

/// Cancels a pending or approved booking on behalf of its tenant.
#[instrument(skip(ctx))]
pub async fn cancel_booking(ctx: &AppContext, actor: &Actor, booking_id: i64) -> Result<booking::Model> {
    let (booking, outbox) = cancel_booking_txn(ctx, actor, booking_id)
        .await
        .inspect_err(|e| log_failure("cancel_booking", e))?;
    ctx.notifier.publish(outbox);
    Ok(booking)
}

async fn cancel_booking_txn(
    ctx: &AppContext,
    actor: &Actor,
    booking_id: i64,
) -> Result<(booking::Model, Outbox)> {
    let now = ctx.now();
    let txn = ctx.database.begin().await?;

    let current = find_booking(&txn, booking_id).await?;
    if !actor.rents(&current) {
        return Err(Error::forbidden("only the tenant can cancel a booking"));
    }
    if current.status()?.is_terminal() {
        return Err(Error::invalid_state(format!(
            "booking {booking_id} is {} and cannot be cancelled",
            current.status
        )));
    }

    let update = BookingUpdate {
        status: Some(BookingStatus::Cancelled),
        ..Default::default()
    };
    let booking = apply_booking_update(&txn, &current, update, now).await?;
    reconcile_availability(&txn, booking.property_id, now).await?;
    let property = find_property(&txn, booking.property_id).await?;

    txn.commit().await?;
    info!(booking_id, "Booking cancelled by tenant");

    let mut outbox = Outbox::new();
    outbox.push(
        NotificationEvent::new(
            property.owner_id,
            "Booking cancelled",
            format!("A booking for \"{}\" was cancelled by the tenant.", property.title),
            booking_link(booking.id),
        )
        .about(booking.id, property.id),
    );
    Ok((booking, outbox))
}

/// Deletes a booking and its ledger entries and leave requests, at any status.
///
/// Allowed for the tenant, the property owner and admins.
#[instrument(skip(ctx))]
pub async fn delete_booking(ctx: &AppContext, actor: &Actor, booking_id: i64) -> Result<()> {
    let outbox = delete_booking_txn(ctx, actor, booking_id)
        .await
        .inspect_err(|e| log_failure("delete_booking", e))?;
    ctx.notifier.publish(outbox);
    Ok(())
}

async fn delete_booking_txn(ctx: &AppContext, actor: &Actor, booking_id: i64) -> Result<Outbox> {
    let now = ctx.now();
    let txn = ctx.database.begin().await?;

    let booking = find_booking(&txn, booking_id).await?;
    let property = Property::find_by_id(booking.property_id).one(&txn).await?;
    let allowed = actor.rents(&booking) || property.as_ref().is_some_and(|p| actor.manages(p)) || actor.is_admin();
    if !allowed {
        return Err(Error::forbidden("not a party to this booking"));
    }

    let removed_entries = Transaction::delete_many()
        .filter(transaction::Column::BookingId.eq(booking_id))
        .exec(&txn)
        .await?
        .rows_affected;
    LeaveRequest::delete_many()
        .filter(leave_request::Column::BookingId.eq(booking_id))
        .exec(&txn)
        .await?;
    let deleted = Booking::delete_many()
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::Version.eq(booking.version))
        .exec(&txn)
        .await?;
    if deleted.rows_affected == 0 {
        return Err(Error::ConcurrentModification { booking_id });
    }
    reconcile_availability(&txn, booking.property_id, now).await?;

    txn.commit().await?;
    info!(booking_id, removed_entries, "Booking deleted");

    let mut outbox = Outbox::new();
    if let Some(property) = property {
        let counterpart = if actor.rents(&booking) {
            property.owner_id
        } else {
            booking.tenant_id
        };
        if counterpart != actor.user_id {
            outbox.push(NotificationEvent::new(
                counterpart,
                "Booking removed",
                format!("A booking for \"{}\" was deleted.", property.title),
                format!("/properties/{}", property.id),
            ));
        }
    }
    Ok(outbox)
}

/// Reads a booking the caller is a party to.
pub async fn get_booking(ctx: &AppContext, actor: &Actor, booking_id: i64) -> Result<booking::Model> {
    let booking = find_booking(&ctx.database, booking_id).await?;
    if actor.rents(&booking) || actor.is_admin() {
        return Ok(booking);
    }
    let property = find_property(&ctx.database, booking.property_id).await?;
    if actor.manages(&property) {
        Ok(booking)
    } else {
        Err(Error::forbidden("not a party to this booking"))
    }
}
