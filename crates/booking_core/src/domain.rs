//! crates/booking_core/src/domain.rs
//!
//! Defines the pure, core data structures for the booking engine.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interval::Interval;

//=========================================================================================
// Students
//=========================================================================================

/// A student holding prepaid session credits.
///
/// `credits` is a denormalized counter; the credit ledger is the source of truth
/// and every change to this field is paired with a `CreditTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub credits: i32,
    pub default_duration_minutes: i32,
    pub password_set: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a student. Credits are granted through the ledger after insert.
#[derive(Debug, Clone, Deserialize)]
pub struct NewStudent {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub initial_credits: i32,
    #[serde(default = "default_session_minutes")]
    pub default_duration_minutes: i32,
}

fn default_session_minutes() -> i32 {
    60
}

//=========================================================================================
// Availability
//=========================================================================================

/// A tutor-declared open interval. Immutable once created, except by deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl AvailabilityWindow {
    pub fn interval(&self) -> Interval {
        Interval::unchecked(self.start_time, self.end_time)
    }
}

//=========================================================================================
// Bookings
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Scheduled,
    Completed,
    Canceled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "SCHEDULED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Canceled => "CANCELED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SCHEDULED" => Some(BookingStatus::Scheduled),
            "COMPLETED" => Some(BookingStatus::Completed),
            "CANCELED" => Some(BookingStatus::Canceled),
            _ => None,
        }
    }
}

/// Which path created a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingOrigin {
    SelfService,
    Admin,
    /// Historical record; exempt from live collision rules.
    Backfill,
}

impl BookingOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingOrigin::SelfService => "SELF_SERVICE",
            BookingOrigin::Admin => "ADMIN",
            BookingOrigin::Backfill => "BACKFILL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SELF_SERVICE" => Some(BookingOrigin::SelfService),
            "ADMIN" => Some(BookingOrigin::Admin),
            "BACKFILL" => Some(BookingOrigin::Backfill),
            _ => None,
        }
    }
}

/// A concrete reserved interval on the tutor's calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// `None` only for legacy open slots.
    pub student_id: Option<Uuid>,
    pub status: BookingStatus,
    pub origin: BookingOrigin,
    /// Whether a credit has been debited for this booking and not yet refunded.
    pub credit_charged: bool,
    pub class_notes: String,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn interval(&self) -> Interval {
        Interval::unchecked(self.start_time, self.end_time)
    }

    /// Canceled bookings no longer occupy the calendar.
    pub fn is_live(&self) -> bool {
        self.status != BookingStatus::Canceled
    }
}

/// Input for inserting a booking inside a store transaction.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub interval: Interval,
    pub student_id: Uuid,
    pub status: BookingStatus,
    pub origin: BookingOrigin,
    pub credit_charged: bool,
    pub class_notes: String,
}

//=========================================================================================
// Credit Ledger
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditTransactionKind {
    Purchase,
    SessionBooking,
    Adjustment,
    Deduction,
    Refund,
}

impl CreditTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditTransactionKind::Purchase => "PURCHASE",
            CreditTransactionKind::SessionBooking => "SESSION_BOOKING",
            CreditTransactionKind::Adjustment => "ADJUSTMENT",
            CreditTransactionKind::Deduction => "DEDUCTION",
            CreditTransactionKind::Refund => "REFUND",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PURCHASE" => Some(CreditTransactionKind::Purchase),
            "SESSION_BOOKING" => Some(CreditTransactionKind::SessionBooking),
            "ADJUSTMENT" => Some(CreditTransactionKind::Adjustment),
            "DEDUCTION" => Some(CreditTransactionKind::Deduction),
            "REFUND" => Some(CreditTransactionKind::Refund),
            _ => None,
        }
    }
}

/// An append-only ledger row. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub student_id: Uuid,
    pub amount: i32,
    pub kind: CreditTransactionKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A ledger row about to be appended together with its balance change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCreditTransaction {
    pub student_id: Uuid,
    pub amount: i32,
    pub kind: CreditTransactionKind,
    pub description: String,
}

//=========================================================================================
// Authorization
//=========================================================================================

/// Who is performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin,
    Student(Uuid),
}

/// Explicit authorization context passed into every mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub actor: Actor,
}

impl AuthContext {
    pub fn admin() -> Self {
        Self { actor: Actor::Admin }
    }

    pub fn student(student_id: Uuid) -> Self {
        Self {
            actor: Actor::Student(student_id),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.actor == Actor::Admin
    }

    /// Admins act for everyone; students only for themselves.
    pub fn can_act_for(&self, student_id: Uuid) -> bool {
        match self.actor {
            Actor::Admin => true,
            Actor::Student(id) => id == student_id,
        }
    }
}
