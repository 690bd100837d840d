//! Domain value types shared by the entities and the business logic.
//!
//! Entities store these values as plain strings so the schema stays portable across
//! SeaORM backends. Each enum round-trips through `as_str` / [`FromStr`].

use crate::errors::Error;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            /// Stored representation of this value.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $( $text => Ok(Self::$variant), )+
                    other => Err(Error::InvalidInput {
                        message: format!("unknown {} '{other}'", $label),
                    }),
                }
            }
        }
    };
}

string_enum! {
    /// Role carried by the identity context.
    Role, "role" {
        /// Rents properties and owns bookings
        Tenant => "tenant",
        /// Lists properties and decides on bookings
        Owner => "owner",
        /// Passes every owner/admin check
        Admin => "admin",
    }
}

string_enum! {
    /// Booking lifecycle state.
    BookingStatus, "booking status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Cancelled => "cancelled",
        Completed => "completed",
    }
}

impl BookingStatus {
    /// Rejected, cancelled and completed bookings never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled | Self::Completed)
    }
}

string_enum! {
    /// Availability flag kept on each property.
    AvailabilityStatus, "availability status" {
        Available => "Available",
        Booked => "Booked",
        NotAvailable => "Not Available",
    }
}

string_enum! {
    /// Early-termination request state.
    LeaveStatus, "leave request status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

string_enum! {
    /// Policy used to resolve the effective end date of an approved leave request.
    LeaveCondition, "leave condition" {
        Immediate => "immediate",
        EndOfMonth => "end_of_month",
        EndOfCurrentBooking => "end_of_current_booking",
        EndOfNextMonth => "end_of_next_month",
    }
}

impl Default for LeaveCondition {
    fn default() -> Self {
        Self::EndOfCurrentBooking
    }
}

string_enum! {
    /// Monthly rent ledger entry state.
    TransactionStatus, "transaction status" {
        Pending => "pending",
        Paid => "paid",
        Unpaid => "unpaid",
        Advanced => "advanced",
        Completed => "completed",
        Failed => "failed",
        Refunded => "refunded",
    }
}

impl TransactionStatus {
    /// Statuses from which a tenant may still record a payment.
    #[must_use]
    pub const fn accepts_payment(self) -> bool {
        matches!(self, Self::Pending | Self::Unpaid | Self::Advanced)
    }

    /// Statuses a tenant may request when paying.
    #[must_use]
    pub const fn is_payment_outcome(self) -> bool {
        matches!(self, Self::Paid | Self::Unpaid | Self::Advanced)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_availability_uses_display_labels() {
        assert_eq!(AvailabilityStatus::NotAvailable.as_str(), "Not Available");
        assert_eq!(
            "Not Available".parse::<AvailabilityStatus>().unwrap(),
            AvailabilityStatus::NotAvailable
        );
    }

    #[test]
    fn test_unknown_value_is_invalid_input() {
        let err = "archived".parse::<BookingStatus>().unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        assert!(err.to_string().contains("booking status"));
    }

    #[test]
    fn test_payment_status_sets() {
        assert!(TransactionStatus::Advanced.accepts_payment());
        assert!(!TransactionStatus::Paid.accepts_payment());
        assert!(!TransactionStatus::Refunded.accepts_payment());
        assert!(TransactionStatus::Unpaid.is_payment_outcome());
        assert!(!TransactionStatus::Failed.is_payment_outcome());
    }

    #[test]
    fn test_terminal_booking_states() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(!BookingStatus::Approved.is_terminal());
        assert!(BookingStatus::Rejected.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::Completed.is_terminal());
    }

    #[test]
    fn test_leave_condition_defaults_to_booking_end() {
        assert_eq!(LeaveCondition::default(), LeaveCondition::EndOfCurrentBooking);
        assert_eq!(
            serde_json::to_string(&LeaveCondition::EndOfNextMonth).unwrap(),
            "\"end_of_next_month\""
        );
    }
}
