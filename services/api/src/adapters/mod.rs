pub mod db;
pub mod notifier;
pub mod outbox;

pub use db::PgStore;
pub use notifier::{LogNotifier, WebhookNotifier};
pub use outbox::{notification_queue, spawn_notification_worker, QueuedNotifier};
