//! Shared handles every lifecycle operation needs.

use crate::notify::Notifier;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

/// Source of "now" for lifecycle rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Wall-clock UTC time
    #[default]
    System,
    /// A pinned instant, for replays and tests
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Current instant according to this clock.
    #[must_use]
    pub fn now(self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(instant) => instant,
        }
    }
}

/// Record store, notification handle and clock.
///
/// Cloning is cheap: the connection is a pool handle and the notifier a channel
/// sender.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Record store connection
    pub database: DatabaseConnection,
    /// Post-commit notification publisher
    pub notifier: Notifier,
    clock: Clock,
}

impl AppContext {
    /// Creates a context running on the system clock.
    #[must_use]
    pub const fn new(database: DatabaseConnection, notifier: Notifier) -> Self {
        Self {
            database,
            notifier,
            clock: Clock::System,
        }
    }

    /// A copy of this context that reads time from `clock`.
    #[must_use]
    pub fn with_clock(&self, clock: Clock) -> Self {
        Self {
            clock,
            ..self.clone()
        }
    }

    /// A copy of this context pinned to `instant`.
    #[must_use]
    pub fn at(&self, instant: DateTime<Utc>) -> Self {
        self.with_clock(Clock::Fixed(instant))
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
