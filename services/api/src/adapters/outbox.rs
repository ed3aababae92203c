//! services/api/src/adapters/outbox.rs
//!
//! Moves notification delivery off the request path. The booking manager calls
//! [`QueuedNotifier`] after commit; a background worker drains the queue and
//! hands each booking id to the real delivery channel.

use std::sync::Arc;

use async_trait::async_trait;
use booking_core::ports::{NotificationService, PortError, PortResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Enqueues booking ids without waiting for delivery.
#[derive(Clone)]
pub struct QueuedNotifier {
    sender: mpsc::Sender<Uuid>,
}

/// Creates a bounded queue and the notifier that feeds it.
pub fn notification_queue(capacity: usize) -> (QueuedNotifier, mpsc::Receiver<Uuid>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (QueuedNotifier { sender }, receiver)
}

#[async_trait]
impl NotificationService for QueuedNotifier {
    async fn notify(&self, booking_id: Uuid) -> PortResult<()> {
        self.sender.try_send(booking_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                PortError::Notification("notification queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                PortError::Notification("notification worker has stopped".to_string())
            }
        })
    }
}

/// Delivers queued notifications until `shutdown` fires, then flushes whatever
/// is already queued and exits.
pub fn spawn_notification_worker(
    mut queue: mpsc::Receiver<Uuid>,
    delivery: Arc<dyn NotificationService>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Notification worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = queue.recv() => match next {
                    Some(booking_id) => deliver(delivery.as_ref(), booking_id).await,
                    None => break,
                },
            }
        }
        queue.close();
        while let Ok(booking_id) = queue.try_recv() {
            deliver(delivery.as_ref(), booking_id).await;
        }
        info!("Notification worker stopped");
    })
}

async fn deliver(delivery: &dyn NotificationService, booking_id: Uuid) {
    match delivery.notify(booking_id).await {
        Ok(()) => debug!(booking_id = %booking_id, "Notification sent"),
        Err(e) => warn!(booking_id = %booking_id, error = %e, "Notification delivery failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Uuid>>);

    #[async_trait]
    impl NotificationService for Collect {
        async fn notify(&self, booking_id: Uuid) -> PortResult<()> {
            self.0.lock().unwrap().push(booking_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn worker_delivers_in_order_and_flushes_on_shutdown() {
        let (notifier, queue) = notification_queue(8);
        let sink = Arc::new(Collect::default());
        let shutdown = CancellationToken::new();

        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            notifier.notify(*id).await.unwrap();
        }
        shutdown.cancel();
        spawn_notification_worker(queue, sink.clone(), shutdown)
            .await
            .unwrap();

        assert_eq!(*sink.0.lock().unwrap(), ids);
    }

    #[tokio::test]
    async fn full_or_closed_queue_is_a_notification_error() {
        let (notifier, queue) = notification_queue(1);
        notifier.notify(Uuid::new_v4()).await.unwrap();
        assert!(matches!(
            notifier.notify(Uuid::new_v4()).await,
            Err(PortError::Notification(_))
        ));
        drop(queue);
        assert!(matches!(
            notifier.notify(Uuid::new_v4()).await,
            Err(PortError::Notification(_))
        ));
    }
}
