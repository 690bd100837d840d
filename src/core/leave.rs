//! Leave requests - early termination of an approved booking.
//!
//! A tenant asks to leave; the owner (or an admin) approves with a resolution policy
//! or rejects. Approval resolves an effective end date, shortens the booking if that
//! date comes first, and completes the booking once the date is reached.

use super::{
    AppContext, Actor, calendar,
    booking::{BookingUpdate, apply_booking_update, find_booking, find_property, reconcile_availability},
    log_failure,
};
use crate::{
    entities::{LeaveRequest, booking, leave_request},
    errors::{Error, Result},
    models::{BookingStatus, LeaveCondition, LeaveStatus, Role},
    notify::{NotificationEvent, Outbox},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde_json::json;
use tracing::{info, instrument};

/// Owner's answer to a pending leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveDecision {
    /// Let the tenant go; `None` means [`LeaveCondition::EndOfCurrentBooking`]
    Approve(Option<LeaveCondition>),
    /// Keep the booking as it is
    Reject,
}

/// Optional narrowing for [`list_leave_requests`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LeaveFilter {
    /// Only requests in this state
    pub status: Option<LeaveStatus>,
    /// Only requests for this booking
    pub booking_id: Option<i64>,
}

/// The decided request together with the booking as it stands afterwards.
#[derive(Debug, Clone)]
pub struct LeaveResolution {
    pub request: leave_request::Model,
    pub booking: booking::Model,
}

/// When occupancy ends under `condition`, evaluated at `now`.
#[must_use]
pub fn effective_end_date(
    condition: LeaveCondition,
    now: DateTime<Utc>,
    booking_end: DateTime<Utc>,
) -> DateTime<Utc> {
    match condition {
        LeaveCondition::Immediate => now,
        LeaveCondition::EndOfMonth => calendar::end_of_month(now),
        LeaveCondition::EndOfNextMonth => calendar::end_of_next_month(now),
        LeaveCondition::EndOfCurrentBooking => booking_end,
    }
}

/// Files a leave request for an approved booking. Only its tenant may ask, and only
/// one request per booking may be pending at a time.
#[instrument(skip(ctx, message))]
pub async fn create_leave_request(
    ctx: &AppContext,
    actor: &Actor,
    booking_id: i64,
    message: String,
) -> Result<leave_request::Model> {
    let (request, outbox) = create_leave_request_txn(ctx, actor, booking_id, message)
        .await
        .inspect_err(|e| log_failure("create_leave_request", e))?;
    ctx.notifier.publish(outbox);
    Ok(request)
}

async fn create_leave_request_txn(
    ctx: &AppContext,
    actor: &Actor,
    booking_id: i64,
    message: String,
) -> Result<(leave_request::Model, Outbox)> {
    let now = ctx.now();
    let txn = ctx.database.begin().await?;

    let booking = find_booking(&txn, booking_id).await?;
    if !actor.rents(&booking) {
        return Err(Error::forbidden("only the tenant can ask to leave a booking"));
    }
    if booking.status()? != BookingStatus::Approved {
        return Err(Error::invalid_state(format!(
            "booking {booking_id} is {}, only approved bookings can be left early",
            booking.status
        )));
    }

    let pending = LeaveRequest::find()
        .filter(leave_request::Column::BookingId.eq(booking_id))
        .filter(leave_request::Column::Status.eq(LeaveStatus::Pending.as_str()))
        .count(&txn)
        .await?;
    if pending > 0 {
        return Err(Error::ConflictExists {
            message: format!("booking {booking_id} already has a pending leave request"),
        });
    }

    // Bumping the version makes a concurrent request for the same booking fail.
    apply_booking_update(&txn, &booking, BookingUpdate::default(), now).await?;
    let property = find_property(&txn, booking.property_id).await?;

    let request = leave_request::ActiveModel {
        booking_id: Set(booking.id),
        tenant_id: Set(booking.tenant_id),
        owner_id: Set(property.owner_id),
        property_id: Set(property.id),
        message: Set(message),
        status: Set(LeaveStatus::Pending.as_str().to_string()),
        condition: Set(None),
        decision_note: Set(None),
        effective_end_date: Set(None),
        created_at: Set(now),
        decided_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(leave_request_id = request.id, booking_id, "Leave request filed");

    let mut outbox = Outbox::new();
    outbox.push(
        NotificationEvent::new(
            property.owner_id,
            "Leave request",
            format!("Your tenant at \"{}\" asked to end their booking early.", property.title),
            format!("/leave-requests/{}", request.id),
        )
        .about(booking.id, property.id),
    );
    Ok((request, outbox))
}

/// Approves or rejects a pending leave request. Owner of the property or admin only.
#[instrument(skip(ctx, note))]
pub async fn decide_leave_request(
    ctx: &AppContext,
    actor: &Actor,
    request_id: i64,
    decision: LeaveDecision,
    note: Option<String>,
) -> Result<LeaveResolution> {
    let (resolution, outbox) = decide_leave_request_txn(ctx, actor, request_id, decision, note)
        .await
        .inspect_err(|e| log_failure("decide_leave_request", e))?;
    ctx.notifier.publish(outbox);
    Ok(resolution)
}

async fn decide_leave_request_txn(
    ctx: &AppContext,
    actor: &Actor,
    request_id: i64,
    decision: LeaveDecision,
    note: Option<String>,
) -> Result<(LeaveResolution, Outbox)> {
    let now = ctx.now();
    let txn = ctx.database.begin().await?;

    let request = LeaveRequest::find_by_id(request_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("leave request", request_id))?;
    let mut booking = find_booking(&txn, request.booking_id).await?;
    let property = find_property(&txn, booking.property_id).await?;
    if !actor.manages(&property) {
        return Err(Error::forbidden("only the property owner or an admin can decide leave requests"));
    }
    if request.status()? != LeaveStatus::Pending {
        return Err(Error::invalid_state(format!(
            "leave request {request_id} is already {}",
            request.status
        )));
    }

    let mut active: leave_request::ActiveModel = request.clone().into();
    active.decision_note = Set(note.clone());
    active.decided_at = Set(Some(now));

    let effective = match decision {
        LeaveDecision::Reject => {
            active.status = Set(LeaveStatus::Rejected.as_str().to_string());
            None
        }
        LeaveDecision::Approve(condition) => {
            if booking.status()? != BookingStatus::Approved {
                return Err(Error::invalid_state(format!(
                    "booking {} is {} and can no longer be left",
                    booking.id, booking.status
                )));
            }
            let condition = condition.unwrap_or_default();
            let effective = effective_end_date(condition, now, booking.end_date);

            let mut update = BookingUpdate::default();
            // Never shorten below one day so the end stays after the start.
            let shortened = effective.max(booking.start_date + Duration::days(1));
            if shortened < booking.end_date {
                update.end_date = Some(shortened);
            }
            if effective <= now {
                update.status = Some(BookingStatus::Completed);
            }
            booking = apply_booking_update(&txn, &booking, update, now).await?;
            reconcile_availability(&txn, property.id, now).await?;

            active.status = Set(LeaveStatus::Approved.as_str().to_string());
            active.condition = Set(Some(condition.as_str().to_string()));
            active.effective_end_date = Set(Some(effective));
            Some(effective)
        }
    };

    // Guard on the stored status so two deciders cannot both win.
    let decided = LeaveRequest::update_many()
        .set(active)
        .filter(leave_request::Column::Id.eq(request_id))
        .filter(leave_request::Column::Status.eq(LeaveStatus::Pending.as_str()))
        .exec(&txn)
        .await?;
    if decided.rows_affected == 0 {
        return Err(Error::invalid_state(format!(
            "leave request {request_id} was decided concurrently"
        )));
    }
    let request = LeaveRequest::find_by_id(request_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("leave request", request_id))?;

    txn.commit().await?;
    info!(leave_request_id = request_id, booking_id = booking.id, "Leave request {}", request.status);

    let message = match effective {
        Some(date) => format!(
            "Your leave request for \"{}\" was approved. Your booking ends on {}.",
            property.title,
            date.format("%Y-%m-%d")
        ),
        None => match note.as_deref() {
            Some(note) => format!("Your leave request for \"{}\" was rejected: {note}", property.title),
            None => format!("Your leave request for \"{}\" was rejected.", property.title),
        },
    };
    let mut outbox = Outbox::new();
    outbox.push(
        NotificationEvent::new(
            request.tenant_id,
            format!("Leave request {}", request.status),
            message,
            format!("/leave-requests/{request_id}"),
        )
        .about(booking.id, property.id)
        .with_metadata(json!({
            "status": request.status,
            "condition": request.condition,
            "effective_end_date": effective.map(|d| d.to_rfc3339()),
        })),
    );
    Ok((LeaveResolution { request, booking }, outbox))
}

/// Leave requests visible to the caller, newest first.
///
/// Admins see everything, owners the requests on their properties, tenants their own.
pub async fn list_leave_requests(
    ctx: &AppContext,
    actor: &Actor,
    filter: LeaveFilter,
) -> Result<Vec<leave_request::Model>> {
    let mut query = LeaveRequest::find();
    query = match actor.role {
        Role::Admin => query,
        Role::Owner => query.filter(leave_request::Column::OwnerId.eq(actor.user_id)),
        Role::Tenant => query.filter(leave_request::Column::TenantId.eq(actor.user_id)),
    };
    if let Some(status) = filter.status {
        query = query.filter(leave_request::Column::Status.eq(status.as_str()));
    }
    if let Some(booking_id) = filter.booking_id {
        query = query.filter(leave_request::Column::BookingId.eq(booking_id));
    }

    query
        .order_by_desc(leave_request::Column::CreatedAt)
        .order_by_desc(leave_request::Column::Id)
        .all(&ctx.database)
        .await
        .inspect_err(|e| tracing::error!("list_leave_requests failed: {e}"))
        .map_err(Into::into)
}
