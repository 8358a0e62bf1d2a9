pub mod dispatcher;
pub mod sink;
pub mod worker;

pub use dispatcher::NotificationDispatcher;
pub use sink::{LogNotificationSink, NotificationSink, SupabaseNotificationSink};
pub use worker::NotificationWorker;
