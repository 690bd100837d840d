//! `rentflow` - rental occupancy lifecycle
//!
//! Tenants book properties, owners approve or reject, tenants pay monthly rent and may
//! ask to leave early. Deleting an account cascades through everything it owns, and a
//! background scheduler reminds both parties of unpaid months. Every mutation commits
//! atomically before any notification goes out.

#![deny(unsafe_code, unused_must_use, rustdoc::broken_intra_doc_links)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::dbg_macro,
    clippy::clone_on_ref_ptr,
    clippy::semicolon_if_nothing_returned,
    rust_2018_idioms,
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
)]

/// Configuration management for database and application settings
pub mod config;
/// Lifecycle operations - bookings, leave requests, payments, deletion and reminders
pub mod core;
/// SeaORM entity definitions for database tables
pub mod entities;
/// Unified error types and result handling
pub mod errors;
/// Status vocabularies shared by entities and operations
pub mod models;
/// Notification events, sinks and the post-commit dispatcher
pub mod notify;

#[cfg(test)]
pub mod test_utils;
