//! services/api/src/adapters/notifier.rs
//!
//! Concrete delivery channels for booking confirmations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use booking_core::ports::{BookingStore, NotificationService, PortError, PortResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Writes confirmations to the log. Used when no webhook is configured.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationService for LogNotifier {
    async fn notify(&self, booking_id: Uuid) -> PortResult<()> {
        info!(booking_id = %booking_id, "Booking confirmed");
        Ok(())
    }
}

/// The JSON document POSTed for each confirmed booking.
#[derive(Debug, Serialize)]
pub struct BookingNotification {
    pub booking_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
}

/// POSTs a [`BookingNotification`] to a fixed URL. The booking is re-read from
/// the store so the payload reflects committed state.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    store: Arc<dyn BookingStore>,
}

impl WebhookNotifier {
    pub fn new(url: String, store: Arc<dyn BookingStore>) -> PortResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PortError::Unexpected(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, url, store })
    }

    async fn payload(&self, booking_id: Uuid) -> PortResult<BookingNotification> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("Booking {} not found", booking_id)))?;
        let student = match booking.student_id {
            Some(id) => self.store.get_student(id).await?,
            None => None,
        };
        Ok(BookingNotification {
            booking_id: booking.id,
            start_time: booking.start_time,
            end_time: booking.end_time,
            student_name: student.as_ref().map(|s| s.name.clone()),
            student_email: student.map(|s| s.email),
        })
    }
}

#[async_trait]
impl NotificationService for WebhookNotifier {
    async fn notify(&self, booking_id: Uuid) -> PortResult<()> {
        let payload = self.payload(booking_id).await?;
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| PortError::Notification(format!("Webhook delivery failed: {}", e)))?;
        info!(booking_id = %booking_id, "Booking notification delivered");
        Ok(())
    }
}
