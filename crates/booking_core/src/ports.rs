//! crates/booking_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the booking engine.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific storage and notification implementations.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    AvailabilityWindow, Booking, CreditTransaction, NewBooking, NewCreditTransaction, NewStudent,
    Student,
};
use crate::interval::Interval;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint rejected the write.
    #[error("Already exists: {0}")]
    Conflict(String),
    /// The store's own no-overlap constraint rejected a booking at commit time.
    #[error("Overlapping booking: {0}")]
    Overlap(String),
    #[error("Notification failed: {0}")]
    Notification(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports (Traits)
//=========================================================================================

/// Pool-level access: opens transactions and serves read-only queries.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Starts a unit of work. Every write goes through one.
    async fn begin(&self) -> PortResult<Box<dyn StoreTransaction>>;

    // --- Students ---
    async fn get_student(&self, student_id: Uuid) -> PortResult<Option<Student>>;

    async fn list_students(&self) -> PortResult<Vec<Student>>;

    // --- Calendar ---
    async fn get_booking(&self, booking_id: Uuid) -> PortResult<Option<Booking>>;

    async fn list_bookings_for_student(&self, student_id: Uuid) -> PortResult<Vec<Booking>>;

    /// Windows with `start < range.end && end > range.start`, ordered by start.
    async fn list_availability_overlapping(
        &self,
        range: Interval,
    ) -> PortResult<Vec<AvailabilityWindow>>;

    /// Non-canceled bookings with `start < range.end && end > range.start`, ordered by start.
    async fn list_active_bookings_overlapping(&self, range: Interval) -> PortResult<Vec<Booking>>;

    // --- Ledger ---
    /// The student's ledger, newest first.
    async fn list_credit_transactions(&self, student_id: Uuid)
        -> PortResult<Vec<CreditTransaction>>;
}

/// One atomic unit of work. Dropping it without `commit` discards every write.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Serializes all calendar/credit writers for the rest of the transaction.
    async fn lock_calendar(&mut self) -> PortResult<()>;

    // --- Students ---
    /// Reads the student row, locking it until commit where the store supports it.
    async fn get_student(&mut self, student_id: Uuid) -> PortResult<Option<Student>>;

    /// Inserts a student with a zero balance; credits are granted through the ledger.
    async fn insert_student(&mut self, student: &NewStudent) -> PortResult<Student>;

    async fn update_student_duration(&mut self, student_id: Uuid, minutes: i32)
        -> PortResult<()>;

    // --- Availability ---
    async fn list_availability_overlapping(
        &mut self,
        range: Interval,
    ) -> PortResult<Vec<AvailabilityWindow>>;

    async fn insert_availability(&mut self, range: Interval) -> PortResult<AvailabilityWindow>;

    /// Returns `false` when no such window exists.
    async fn delete_availability(&mut self, window_id: Uuid) -> PortResult<bool>;

    // --- Bookings ---
    async fn get_booking(&mut self, booking_id: Uuid) -> PortResult<Option<Booking>>;

    async fn list_active_bookings_overlapping(
        &mut self,
        range: Interval,
    ) -> PortResult<Vec<Booking>>;

    /// Scheduled bookings of this student, charged or not.
    async fn count_active_scheduled(&mut self, student_id: Uuid) -> PortResult<i64>;

    async fn insert_booking(&mut self, booking: &NewBooking) -> PortResult<Booking>;

    /// Persists times, status, notes and the charge flag of an existing booking.
    async fn update_booking(&mut self, booking: &Booking) -> PortResult<()>;

    async fn delete_booking(&mut self, booking_id: Uuid) -> PortResult<()>;

    // --- Ledger ---
    /// The only primitive that changes `Student.credits`: applies `entry.amount`
    /// to the balance and appends the ledger row in the same unit of work.
    /// Returns the appended row and the new balance.
    async fn post_ledger_entry(
        &mut self,
        entry: &NewCreditTransaction,
    ) -> PortResult<(CreditTransaction, i32)>;

    async fn commit(self: Box<Self>) -> PortResult<()>;
}

//=========================================================================================
// Notification Port
//=========================================================================================

#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Announces a committed booking. Best-effort: callers log failures and move on.
    async fn notify(&self, booking_id: Uuid) -> PortResult<()>;
}

/// A notifier that drops every message. Useful for tools and tests.
pub struct NoopNotifier;

#[async_trait]
impl NotificationService for NoopNotifier {
    async fn notify(&self, _booking_id: Uuid) -> PortResult<()> {
        Ok(())
    }
}

