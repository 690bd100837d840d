//! Occupancy lifecycle business logic.
//!
//! Framework-agnostic: every operation takes an [`AppContext`] and an [`Actor`] and
//! returns a [`crate::errors::Result`]. Notifications leave through the outbox only
//! after the operation's transaction has committed.

pub mod booking;
pub mod calendar;
pub mod cascade;
pub mod context;
pub mod identity;
pub mod leave;
pub mod ledger;
pub mod reminder;

pub use context::{AppContext, Clock};
pub use identity::Actor;

use crate::errors::Error;
use tracing::{debug, error};

/// Logs a failed operation. Store failures are errors; rule violations are expected
/// traffic and are logged at debug level.
pub(crate) fn log_failure(operation: &str, err: &Error) {
    if err.is_storage() {
        error!("{operation} failed: {err}");
    } else {
        debug!("{operation} refused: {err}");
    }
}
