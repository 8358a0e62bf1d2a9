//! Best-effort notifications for consultation lifecycle events.
//!
//! Transitions are committed first and then announced through
//! [`NotificationDispatcher::notify`], which only pushes onto an in-process
//! outbox. A [`NotificationWorker`] drains the outbox and delivers to a
//! [`NotificationSink`], retrying a bounded number of times before logging and
//! dropping the notification.

pub mod models;
pub mod services;

pub use models::{DeliveryPolicy, Notification, NotificationError, NotificationKind};
pub use services::{
    LogNotificationSink, NotificationDispatcher, NotificationSink, NotificationWorker,
    SupabaseNotificationSink,
};
