//! crates/booking_core/src/error.rs
//!
//! Error type returned by every booking operation.

use crate::ports::PortError;

/// A rejected booking operation. Validation variants abort the transaction
/// before any write and are reported to the caller as-is; none are retried.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient credits: {credits} credits and {active} active bookings")]
    InsufficientCredits { credits: i32, active: i64 },

    #[error("The requested time is outside the tutor's availability")]
    OutsideAvailability,

    #[error("The requested time overlaps an existing session")]
    SlotCollision,

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not permitted for this caller")]
    Forbidden,

    #[error("Storage error: {0}")]
    Storage(PortError),
}

impl From<PortError> for BookingError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => BookingError::NotFound(what),
            PortError::Conflict(what) => BookingError::AlreadyExists(what),
            // Raised by stores that enforce the no-overlap rule at commit time.
            PortError::Overlap(_) => BookingError::SlotCollision,
            other => BookingError::Storage(other),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
