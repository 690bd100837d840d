//! Due-reminder sweep.
//!
//! Once the previous month is over (plus a grace period), every approved booking that
//! overlapped it is checked against its ledger entry for that month. Tenants and
//! owners are reminded of any outstanding rent. When reminders for a month last went
//! out is persisted in the `system_state` table under `due_reminders:YYYY-MM`, so a
//! restart neither skips nor repeats a run.
//!
//! The sweep only reads committed lifecycle state; its run marker is the one row it
//! writes.

use super::{AppContext, calendar::MonthPeriod, ledger::find_entry};
use crate::{
    config::ReminderConfig,
    entities::{Booking, Property, SystemState, booking, property, system_state},
    errors::{Error, Result},
    models::BookingStatus,
    notify::{NotificationEvent, Outbox},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{Set, prelude::*};
use serde_json::json;
use std::collections::HashMap;
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, error, info, warn};

const REMINDER_KEY_PREFIX: &str = "due_reminders";

/// When reminders may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderPolicy {
    /// Wait this long after the month ends before the first run
    pub grace: Duration,
    /// Minimum spacing between runs for the same month
    pub repeat_every: Duration,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self::from(&ReminderConfig::default())
    }
}

impl From<&ReminderConfig> for ReminderPolicy {
    fn from(config: &ReminderConfig) -> Self {
        Self {
            grace: Duration::days(config.grace_days),
            repeat_every: Duration::days(config.repeat_every_days),
        }
    }
}

/// Why a tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The grace period after the month has not elapsed yet
    GracePeriod { opens_at: DateTime<Utc> },
    /// Reminders for the month went out too recently
    RecentlyRan { last_run: DateTime<Utc> },
}

/// Rent still owed on one booking for the swept month.
#[derive(Debug, Clone, PartialEq)]
pub struct DueReminder {
    pub booking_id: i64,
    pub tenant_id: i64,
    pub owner_id: i64,
    pub amount_due: f64,
    /// No ledger entry existed; the property price was assumed
    pub inferred: bool,
}

/// What a run found.
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub period: MonthPeriod,
    pub bookings_checked: usize,
    pub reminders: Vec<DueReminder>,
}

#[derive(Debug, Clone)]
pub enum SweepOutcome {
    Ran(SweepReport),
    Skipped(SkipReason),
}

fn marker_key(period: MonthPeriod) -> String {
    format!("{REMINDER_KEY_PREFIX}:{}", period.key())
}

/// When reminders for `period` last ran, if ever.
pub async fn get_last_reminder_run<C: ConnectionTrait>(
    db: &C,
    period: MonthPeriod,
) -> Result<Option<DateTime<Utc>>> {
    let state = SystemState::find()
        .filter(system_state::Column::Key.eq(marker_key(period)))
        .one(db)
        .await?;

    match state {
        Some(s) => DateTime::parse_from_rfc3339(&s.value)
            .map(|instant| Some(instant.with_timezone(&Utc)))
            .map_err(|e| Error::Config {
                message: format!("Failed to parse reminder run marker '{}': {e}", s.key),
            }),
        None => Ok(None),
    }
}

async fn set_last_reminder_run<C: ConnectionTrait>(
    db: &C,
    period: MonthPeriod,
    at: DateTime<Utc>,
) -> Result<()> {
    let key = marker_key(period);
    let existing = SystemState::find()
        .filter(system_state::Column::Key.eq(key.as_str()))
        .one(db)
        .await?;

    if let Some(state) = existing {
        let mut active_model: system_state::ActiveModel = state.into();
        active_model.value = Set(at.to_rfc3339());
        active_model.updated_at = Set(at);
        active_model.update(db).await?;
    } else {
        let new_state = system_state::ActiveModel {
            key: Set(key),
            value: Set(at.to_rfc3339()),
            updated_at: Set(at),
            ..Default::default()
        };
        new_state.insert(db).await?;
    }

    Ok(())
}

/// Runs one sweep for the month before `ctx.now()` if the policy allows it.
pub async fn run_due_reminder_sweep(ctx: &AppContext, policy: &ReminderPolicy) -> Result<SweepOutcome> {
    let now = ctx.now();
    let period = MonthPeriod::containing(now).previous();

    let opens_at = period.end() + policy.grace;
    if now < opens_at {
        return Ok(SweepOutcome::Skipped(SkipReason::GracePeriod { opens_at }));
    }
    if let Some(last_run) = get_last_reminder_run(&ctx.database, period).await? {
        if now - last_run < policy.repeat_every {
            return Ok(SweepOutcome::Skipped(SkipReason::RecentlyRan { last_run }));
        }
    }

    let bookings: Vec<booking::Model> = Booking::find()
        .filter(booking::Column::Status.eq(BookingStatus::Approved.as_str()))
        .all(&ctx.database)
        .await?
        .into_iter()
        .filter(|b| period.overlaps(b.start_date, b.end_date))
        .collect();

    let mut properties: HashMap<i64, Option<property::Model>> = HashMap::new();
    let mut reminders = Vec::new();
    let mut outbox = Outbox::new();

    for booking in &bookings {
        if !properties.contains_key(&booking.property_id) {
            let found = Property::find_by_id(booking.property_id)
                .one(&ctx.database)
                .await?;
            properties.insert(booking.property_id, found);
        }
        let Some(Some(property)) = properties.get(&booking.property_id) else {
            debug!(booking_id = booking.id, "Skipping booking without a property");
            continue;
        };

        let entry = find_entry(&ctx.database, booking.id, period).await?;
        let (amount_due, inferred) = match &entry {
            Some(entry) => (entry.outstanding(), false),
            None => (property.price.max(0.0), true),
        };
        if amount_due <= 0.0 {
            continue;
        }

        let label = period.key();
        let link = format!("/bookings/{}/ledger", booking.id);
        let metadata = json!({
            "period": label,
            "amount_due": amount_due,
            "transaction_id": entry.as_ref().map(|e| e.id),
        });
        outbox.push(
            NotificationEvent::new(
                booking.tenant_id,
                "Rent due",
                format!("You owe {amount_due:.2} for {label} at \"{}\".", property.title),
                link.clone(),
            )
            .about(booking.id, property.id)
            .with_metadata(metadata.clone()),
        );
        outbox.push(
            NotificationEvent::new(
                property.owner_id,
                "Rent outstanding",
                format!(
                    "Your tenant at \"{}\" still owes {amount_due:.2} for {label}.",
                    property.title
                ),
                link,
            )
            .about(booking.id, property.id)
            .with_metadata(metadata),
        );
        reminders.push(DueReminder {
            booking_id: booking.id,
            tenant_id: booking.tenant_id,
            owner_id: property.owner_id,
            amount_due,
            inferred,
        });
    }

    set_last_reminder_run(&ctx.database, period, now).await?;
    ctx.notifier.publish(outbox);

    Ok(SweepOutcome::Ran(SweepReport {
        period,
        bookings_checked: bookings.len(),
        reminders,
    }))
}

/// Ticks forever, sweeping on each tick. Errors are logged and the loop carries on.
pub async fn run_reminder_loop(ctx: AppContext, config: ReminderConfig) {
    let policy = ReminderPolicy::from(&config);
    let mut ticker = interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Due-reminder scheduler started, ticking every {:?}", config.tick_interval());

    loop {
        ticker.tick().await;
        match run_due_reminder_sweep(&ctx, &policy).await {
            Ok(SweepOutcome::Ran(report)) => info!(
                period = %report.period.key(),
                checked = report.bookings_checked,
                "Sent {} due reminder(s)",
                report.reminders.len()
            ),
            Ok(SweepOutcome::Skipped(reason)) => debug!("Due-reminder sweep skipped: {reason:?}"),
            Err(e) => error!("Due-reminder sweep failed: {e}"),
        }
    }
}

/// Aborts a spawned [`run_reminder_loop`] and waits for it to wind down.
///
/// Returns `true` when the task had panicked rather than being cancelled.
pub async fn stop_reminder_loop(handle: JoinHandle<()>) -> bool {
    handle.abort();
    match handle.await {
        Err(e) if e.is_panic() => {
            error!("Due-reminder scheduler panicked: {e}");
            true
        }
        Err(_) => false,
        Ok(()) => {
            warn!("Due-reminder scheduler exited on its own");
            false
        }
    }
}
