//! crates/booking_core/src/lib.rs
//!
//! Slot computation and booking engine for a single-tutor calendar paid with
//! prepaid credits.

pub mod admin;
pub mod booking;
pub mod domain;
pub mod error;
pub mod interval;
pub mod ledger;
pub mod memory;
pub mod ports;
pub mod slots;

pub use admin::{RecurringWindows, StudentDetails};
pub use booking::BookingManager;
pub use domain::{
    Actor, AuthContext, AvailabilityWindow, Booking, BookingOrigin, BookingStatus,
    CreditTransaction, CreditTransactionKind, NewStudent, Student,
};
pub use error::{BookingError, BookingResult};
pub use interval::Interval;
pub use memory::InMemoryStore;
pub use ports::{
    BookingStore, NoopNotifier, NotificationService, PortError, PortResult, StoreTransaction,
};
pub use slots::{get_viable_start_times, CandidateSlot};
