//! Post-commit notification outbox.
//!
//! Lifecycle operations never talk to a sink directly. They push
//! [`NotificationEvent`]s into an [`Outbox`] while their database transaction is open
//! and hand the outbox to the [`Notifier`] only after `commit()` returned. The notifier
//! enqueues without blocking; a dispatcher task delivers each event to a
//! [`NotificationSink`] under a timeout. A sink failure is logged and dropped.

use crate::{
    entities::{notification, Property},
    errors::Result,
};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// A single message for a single user.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    /// Recipient
    pub user_id: i64,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Where the client should navigate
    pub link: String,
    /// Structured context for the client
    pub metadata: Value,
    /// Booking the event is about
    pub booking_id: Option<i64>,
    /// Property the event is about
    pub property_id: Option<i64>,
}

impl NotificationEvent {
    /// Creates an event with empty metadata and no references.
    pub fn new(
        user_id: i64,
        title: impl Into<String>,
        message: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            title: title.into(),
            message: message.into(),
            link: link.into(),
            metadata: Value::Null,
            booking_id: None,
            property_id: None,
        }
    }

    /// Attaches the booking and property this event concerns.
    #[must_use]
    pub const fn about(mut self, booking_id: i64, property_id: i64) -> Self {
        self.booking_id = Some(booking_id);
        self.property_id = Some(property_id);
        self
    }

    /// Replaces the metadata payload.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Events collected while a transaction is open.
#[derive(Debug, Default)]
pub struct Outbox {
    events: Vec<NotificationEvent>,
}

impl Outbox {
    /// Creates an empty outbox.
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Queues an event for publication after commit.
    pub fn push(&mut self, event: NotificationEvent) {
        self.events.push(event);
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Destination for notification events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one event.
    async fn notify(&self, event: &NotificationEvent) -> Result<()>;
}

/// Persists events as rows of the `notifications` table.
#[derive(Debug, Clone)]
pub struct DatabaseSink {
    database: DatabaseConnection,
}

impl DatabaseSink {
    /// Creates a sink writing through `database`.
    #[must_use]
    pub const fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }
}

#[async_trait]
impl NotificationSink for DatabaseSink {
    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        // Delivery runs after commit, so a cascade may have removed the property since
        if let Some(property_id) = event.property_id {
            if Property::find_by_id(property_id).one(&self.database).await?.is_none() {
                debug!(
                    "Skipping notification for user {}: property {} no longer exists",
                    event.user_id, property_id
                );
                return Ok(());
            }
        }
        let row = notification::ActiveModel {
            user_id: Set(event.user_id),
            title: Set(event.title.clone()),
            message: Set(event.message.clone()),
            link: Set(event.link.clone()),
            is_read: Set(false),
            metadata: Set(event.metadata.clone()),
            booking_id: Set(event.booking_id),
            property_id: Set(event.property_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        row.insert(&self.database).await?;
        Ok(())
    }
}

/// Writes events to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        info!(
            user_id = event.user_id,
            booking_id = ?event.booking_id,
            title = %event.title,
            "{}",
            event.message
        );
        Ok(())
    }
}

/// Non-blocking handle used by lifecycle operations to publish committed outboxes.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: Option<mpsc::Sender<NotificationEvent>>,
}

impl Notifier {
    /// Creates a notifier and the receiving end a dispatcher should drain.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A notifier that discards everything.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { sender: None }
    }

    /// Enqueues every event of a committed outbox. Never blocks and never fails.
    pub fn publish(&self, outbox: Outbox) {
        let Some(sender) = &self.sender else {
            return;
        };
        if outbox.is_empty() {
            return;
        }
        debug!("Publishing {} notification(s)", outbox.len());
        for event in outbox.events {
            match sender.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    warn!(
                        user_id = event.user_id,
                        title = %event.title,
                        "Notification queue full, dropping event"
                    );
                }
                Err(TrySendError::Closed(event)) => {
                    warn!(
                        user_id = event.user_id,
                        title = %event.title,
                        "Notification dispatcher stopped, dropping event"
                    );
                }
            }
        }
    }
}

/// Spawns the task that drains `receiver` into `sink`.
///
/// The task ends once every [`Notifier`] clone has been dropped.
pub fn spawn_dispatcher(
    mut receiver: mpsc::Receiver<NotificationEvent>,
    sink: Arc<dyn NotificationSink>,
    send_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match tokio::time::timeout(send_timeout, sink.notify(&event)).await {
                Ok(Ok(())) => debug!(user_id = event.user_id, "Delivered notification"),
                Ok(Err(e)) => warn!(user_id = event.user_id, "Notification delivery failed: {e}"),
                Err(_) => warn!(
                    user_id = event.user_id,
                    "Notification delivery timed out after {send_timeout:?}"
                ),
            }
        }
        debug!("Notification dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        entities::Notification,
        errors::Error,
        models::Role,
        test_utils::{create_test_property, create_test_user, setup_test_db},
    };
    use std::sync::Mutex;

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn notify(&self, _event: &NotificationEvent) -> Result<()> {
            Err(Error::invalid_state("sink offline"))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, event: &NotificationEvent) -> Result<()> {
            self.seen.lock().unwrap().push(event.user_id);
            Ok(())
        }
    }

    #[test]
    fn test_outbox_counts_events() {
        let mut outbox = Outbox::new();
        assert!(outbox.is_empty());
        outbox.push(NotificationEvent::new(1, "a", "first", "/"));
        outbox.push(NotificationEvent::new(2, "b", "second", "/"));
        assert_eq!(outbox.len(), 2);
        assert!(!outbox.is_empty());
    }

    #[tokio::test]
    async fn test_publish_drops_when_queue_full() {
        let (notifier, mut rx) = Notifier::channel(1);
        let mut outbox = Outbox::new();
        outbox.push(NotificationEvent::new(1, "a", "first", "/"));
        outbox.push(NotificationEvent::new(2, "b", "second", "/"));

        notifier.publish(outbox);

        assert_eq!(rx.recv().await.unwrap().user_id, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_after_dispatcher_stopped_is_silent() {
        let (notifier, rx) = Notifier::channel(4);
        drop(rx);
        let mut outbox = Outbox::new();
        outbox.push(NotificationEvent::new(1, "a", "lost", "/"));
        notifier.publish(outbox);
        Notifier::disabled().publish(Outbox::new());
    }

    #[tokio::test]
    async fn test_dispatcher_survives_sink_failures() {
        let (notifier, rx) = Notifier::channel(4);
        let handle = spawn_dispatcher(rx, Arc::new(FailingSink), Duration::from_millis(50));

        let mut outbox = Outbox::new();
        outbox.push(NotificationEvent::new(1, "a", "one", "/"));
        outbox.push(NotificationEvent::new(2, "b", "two", "/"));
        notifier.publish(outbox);
        drop(notifier);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_in_order() {
        let (notifier, rx) = Notifier::channel(8);
        let sink = Arc::new(RecordingSink::default());
        let handle = spawn_dispatcher(rx, sink.clone(), Duration::from_secs(1));

        let mut outbox = Outbox::new();
        for user_id in [3, 1, 2] {
            outbox.push(NotificationEvent::new(user_id, "t", "m", "/"));
        }
        notifier.publish(outbox);
        drop(notifier);
        handle.await.unwrap();

        assert_eq!(*sink.seen.lock().unwrap(), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_database_sink_persists_event() -> Result<()> {
        let db = setup_test_db().await?;
        let sink = DatabaseSink::new(db.clone());
        let owner = create_test_user(&db, "Olga", Role::Owner).await?;
        let tenant = create_test_user(&db, "Tom", Role::Tenant).await?;
        let property = create_test_property(&db, owner.id, 100.0).await?;

        let event = NotificationEvent::new(tenant.id, "Booking approved", "See you soon", "/bookings/3")
            .about(3, property.id)
            .with_metadata(serde_json::json!({ "status": "approved" }));
        sink.notify(&event).await?;

        let rows = Notification::find().all(&db).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, tenant.id);
        assert_eq!(rows[0].booking_id, Some(3));
        assert_eq!(rows[0].property_id, Some(property.id));
        assert!(!rows[0].is_read);
        assert_eq!(rows[0].metadata["status"], "approved");
        Ok(())
    }

    #[tokio::test]
    async fn test_database_sink_skips_removed_property() -> Result<()> {
        let db = setup_test_db().await?;
        let sink = DatabaseSink::new(db.clone());
        let owner = create_test_user(&db, "Olga", Role::Owner).await?;
        let property = create_test_property(&db, owner.id, 100.0).await?;
        Property::delete_by_id(property.id).exec(&db).await?;

        let gone = NotificationEvent::new(owner.id, "Payment received", "Paid", "/ledger")
            .about(1, property.id);
        sink.notify(&gone).await?;
        assert_eq!(Notification::find().all(&db).await?.len(), 0);

        let unrelated = NotificationEvent::new(owner.id, "Account", "Updated", "/account");
        sink.notify(&unrelated).await?;
        assert_eq!(Notification::find().all(&db).await?.len(), 1);
        Ok(())
    }
}
