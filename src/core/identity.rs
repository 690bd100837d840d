//! Identity context supplied by the authentication layer.
//!
//! The core trusts an [`Actor`] completely; these helpers only answer ownership
//! questions against records already loaded from the store.

use crate::{
    entities::{booking, property},
    models::Role,
};
use serde::{Deserialize, Serialize};

/// The caller of a lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Authenticated user id
    pub user_id: i64,
    /// Role claimed by the session
    pub role: Role,
}

impl Actor {
    /// Creates an actor with an explicit role.
    #[must_use]
    pub const fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Shorthand for a tenant session.
    #[must_use]
    pub const fn tenant(user_id: i64) -> Self {
        Self::new(user_id, Role::Tenant)
    }

    /// Shorthand for an owner session.
    #[must_use]
    pub const fn owner(user_id: i64) -> Self {
        Self::new(user_id, Role::Owner)
    }

    /// Shorthand for an admin session.
    #[must_use]
    pub const fn admin(user_id: i64) -> Self {
        Self::new(user_id, Role::Admin)
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Owner of `property`, or an admin.
    #[must_use]
    pub const fn manages(&self, property: &property::Model) -> bool {
        self.is_admin() || property.owner_id == self.user_id
    }

    /// Tenant who made `booking`.
    #[must_use]
    pub const fn rents(&self, booking: &booking::Model) -> bool {
        booking.tenant_id == self.user_id
    }
}
