//! Entity module - Contains all SeaORM entity definitions for the record store.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod booking;
pub mod leave_request;
pub mod notification;
pub mod property;
pub mod review;
pub mod system_state;
pub mod transaction;
pub mod user;
pub mod user_rating;

// Re-export specific types to avoid conflicts
pub use booking::{Column as BookingColumn, Entity as Booking, Model as BookingModel};
pub use leave_request::{
    Column as LeaveRequestColumn, Entity as LeaveRequest, Model as LeaveRequestModel,
};
pub use notification::{
    Column as NotificationColumn, Entity as Notification, Model as NotificationModel,
};
pub use property::{Column as PropertyColumn, Entity as Property, Model as PropertyModel};
pub use review::{Column as ReviewColumn, Entity as Review, Model as ReviewModel};
pub use system_state::{
    Column as SystemStateColumn, Entity as SystemState, Model as SystemStateModel,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
pub use user_rating::{Column as UserRatingColumn, Entity as UserRating, Model as UserRatingModel};
