//! crates/booking_core/src/booking.rs
//!
//! The booking transaction manager: every calendar or credit mutation runs here,
//! inside one store transaction that holds the calendar lock from the first read
//! to commit. Validation failures return before any write; the uncommitted
//! transaction is dropped and rolls back.
//!
//! Notifications are sent only after commit and never fail an operation.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    AuthContext, Booking, BookingOrigin, BookingStatus, NewBooking, Student,
};
use crate::error::{BookingError, BookingResult};
use crate::interval::Interval;
use crate::ledger::{self, LedgerEntry};
use crate::ports::{BookingStore, NotificationService, StoreTransaction};
use crate::slots::{self, CandidateSlot};

/// Duration used by admin bookings when the caller gives none.
pub const DEFAULT_ADMIN_SESSION_MINUTES: i64 = 60;

/// Backfilled sessions are recorded at midday UTC for one hour.
pub const BACKFILL_HOUR_UTC: u32 = 12;
pub const BACKFILL_SESSION_MINUTES: i64 = 60;

//=========================================================================================
// The Manager
//=========================================================================================

/// Owns the storage and notification ports and exposes the booking operations.
#[derive(Clone)]
pub struct BookingManager {
    pub(crate) store: Arc<dyn BookingStore>,
    notifier: Arc<dyn NotificationService>,
}

impl BookingManager {
    pub fn new(store: Arc<dyn BookingStore>, notifier: Arc<dyn NotificationService>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    /// Opens a transaction already holding the calendar lock.
    pub(crate) async fn begin_locked(&self) -> BookingResult<Box<dyn StoreTransaction>> {
        let mut tx = self.store.begin().await?;
        tx.lock_calendar().await?;
        Ok(tx)
    }

    /// Post-commit hook. Failures are logged and swallowed.
    async fn dispatch_notification(&self, booking_id: Uuid) {
        if let Err(e) = self.notifier.notify(booking_id).await {
            warn!(booking_id = %booking_id, error = %e, "Booking notification failed");
        }
    }

    //=====================================================================================
    // Read path
    //=====================================================================================

    /// Candidate start times for one UTC day, computed from the stored windows and
    /// the non-canceled bookings touching that day. Overlapping windows yield
    /// repeated starts; see [`Self::merged_start_times`] for a deduplicated view.
    pub async fn viable_start_times(
        &self,
        date: NaiveDate,
        duration_minutes: i64,
    ) -> BookingResult<Vec<CandidateSlot>> {
        let (windows, bookings) = self.load_day(date, duration_minutes).await?;
        Ok(slots::get_viable_start_times(
            &windows,
            &bookings,
            duration_minutes,
        ))
    }

    /// Like [`Self::viable_start_times`], but windows are coalesced first and
    /// each start instant appears once.
    pub async fn merged_start_times(
        &self,
        date: NaiveDate,
        duration_minutes: i64,
    ) -> BookingResult<Vec<CandidateSlot>> {
        let (windows, bookings) = self.load_day(date, duration_minutes).await?;
        let merged = slots::merge_windows(&windows);
        Ok(slots::collapse_duplicates(slots::get_viable_start_times(
            &merged,
            &bookings,
            duration_minutes,
        )))
    }

    async fn load_day(
        &self,
        date: NaiveDate,
        duration_minutes: i64,
    ) -> BookingResult<(Vec<Interval>, Vec<Interval>)> {
        if duration_minutes <= 0 {
            return Err(BookingError::InvalidInput(format!(
                "duration must be positive, got {} minutes",
                duration_minutes
            )));
        }
        let day = Interval::utc_day(date);
        let windows = self
            .store
            .list_availability_overlapping(day)
            .await?
            .iter()
            .map(|w| w.interval())
            .collect();
        let bookings = self
            .store
            .list_active_bookings_overlapping(day)
            .await?
            .iter()
            .map(|b| b.interval())
            .collect();
        Ok((windows, bookings))
    }

    //=====================================================================================
    // Self-service booking
    //=====================================================================================

    /// Books `[start_time, start_time + student's default duration)` for a student.
    ///
    /// Rejects with `InsufficientCredits` when the student's scheduled sessions
    /// (self-service or admin-booked) already use up their balance, `OutsideAvailability` when no
    /// single window contains the session, and `SlotCollision` when any live
    /// booking (of any student) overlaps it. No credit is taken here; the
    /// session is charged when it is completed.
    pub async fn book_session(
        &self,
        ctx: &AuthContext,
        start_time: DateTime<Utc>,
        student_id: Uuid,
    ) -> BookingResult<Booking> {
        if !ctx.can_act_for(student_id) {
            return Err(BookingError::Forbidden);
        }

        let mut tx = self.begin_locked().await?;

        // 1. Load the student.
        let student = load_student(tx.as_mut(), student_id).await?;

        // 2. Compute the session interval.
        let session = Interval::from_duration(
            start_time,
            i64::from(student.default_duration_minutes),
        )?;

        // 3. Credit gate.
        let active = tx.count_active_scheduled(student.id).await?;
        if active >= i64::from(student.credits) {
            debug!(student_id = %student.id, active, credits = student.credits, "Booking rejected: insufficient credits");
            return Err(BookingError::InsufficientCredits {
                credits: student.credits,
                active,
            });
        }

        // 4. Availability containment.
        let windows = tx.list_availability_overlapping(session).await?;
        if !windows.iter().any(|w| w.interval().contains(&session)) {
            debug!(student_id = %student.id, start = %session.start, "Booking rejected: outside availability");
            return Err(BookingError::OutsideAvailability);
        }

        // 5. Calendar-wide collision check.
        ensure_free(tx.as_mut(), session, None).await?;

        // 6. Persist.
        let booking = tx
            .insert_booking(&NewBooking {
                interval: session,
                student_id: student.id,
                status: BookingStatus::Scheduled,
                origin: BookingOrigin::SelfService,
                credit_charged: false,
                class_notes: String::new(),
            })
            .await?;
        tx.commit().await?;
        info!(booking_id = %booking.id, student_id = %student.id, start = %booking.start_time, "Session booked");

        // 7. Best-effort confirmation.
        self.dispatch_notification(booking.id).await;
        Ok(booking)
    }

    //=====================================================================================
    // Lifecycle
    //=====================================================================================

    /// Marks a scheduled session as held and charges its credit if it has not
    /// been charged yet.
    pub async fn complete_session(
        &self,
        ctx: &AuthContext,
        booking_id: Uuid,
    ) -> BookingResult<Booking> {
        require_admin(ctx)?;
        let mut tx = self.begin_locked().await?;

        let mut booking = load_booking(tx.as_mut(), booking_id).await?;
        let student_id = booking
            .student_id
            .ok_or_else(|| BookingError::NotFound(format!("Booking {} has no student", booking.id)))?;
        load_student(tx.as_mut(), student_id).await?;
        if booking.status != BookingStatus::Scheduled {
            return Err(BookingError::InvalidInput(format!(
                "only scheduled sessions can be completed, this one is {}",
                booking.status.as_str()
            )));
        }

        booking.status = BookingStatus::Completed;
        if !booking.credit_charged {
            let description = format!("Session completed: {}", booking.start_time.to_rfc3339());
            ledger::post(
                tx.as_mut(),
                student_id,
                LedgerEntry::session_booking(description),
            )
            .await?;
            booking.credit_charged = true;
        }
        tx.update_booking(&booking).await?;
        tx.commit().await?;
        info!(booking_id = %booking.id, student_id = %student_id, "Session completed");
        Ok(booking)
    }

    /// Cancels a scheduled session. The row stays for history and stops
    /// blocking the calendar; a credit taken at booking time is refunded.
    pub async fn cancel_session(
        &self,
        ctx: &AuthContext,
        booking_id: Uuid,
    ) -> BookingResult<Booking> {
        let mut tx = self.begin_locked().await?;

        let mut booking = load_booking(tx.as_mut(), booking_id).await?;
        let owner = booking.student_id;
        let permitted = match owner {
            Some(student_id) => ctx.can_act_for(student_id),
            None => ctx.is_admin(),
        };
        if !permitted {
            return Err(BookingError::Forbidden);
        }
        if booking.status != BookingStatus::Scheduled {
            return Err(BookingError::InvalidInput(format!(
                "only scheduled sessions can be canceled, this one is {}",
                booking.status.as_str()
            )));
        }

        booking.status = BookingStatus::Canceled;
        if let (true, Some(student_id)) = (booking.credit_charged, owner) {
            ledger::post(
                tx.as_mut(),
                student_id,
                LedgerEntry::refund(booking.start_time),
            )
            .await?;
            booking.credit_charged = false;
        }
        tx.update_booking(&booking).await?;
        tx.commit().await?;
        info!(booking_id = %booking.id, "Session canceled");
        Ok(booking)
    }

    /// Removes a booking. A credit that was charged for it comes back as a refund;
    /// an uncharged reservation is removed without touching the balance.
    pub async fn delete_session(&self, ctx: &AuthContext, booking_id: Uuid) -> BookingResult<()> {
        require_admin(ctx)?;
        let mut tx = self.begin_locked().await?;

        let booking = load_booking(tx.as_mut(), booking_id).await?;
        if booking.credit_charged {
            let student_id = booking.student_id.ok_or_else(|| {
                BookingError::NotFound(format!("Booking {} has no student", booking.id))
            })?;
            ledger::post(
                tx.as_mut(),
                student_id,
                LedgerEntry::refund(booking.start_time),
            )
            .await?;
        }
        tx.delete_booking(booking.id).await?;
        tx.commit().await?;
        info!(booking_id = %booking.id, refunded = booking.credit_charged, "Session deleted");
        Ok(())
    }

    pub async fn update_class_notes(
        &self,
        ctx: &AuthContext,
        booking_id: Uuid,
        notes: String,
    ) -> BookingResult<Booking> {
        require_admin(ctx)?;
        let mut tx = self.store.begin().await?;
        let mut booking = load_booking(tx.as_mut(), booking_id).await?;
        booking.class_notes = notes;
        tx.update_booking(&booking).await?;
        tx.commit().await?;
        Ok(booking)
    }

    //=====================================================================================
    // Admin override path
    //=====================================================================================

    /// Books a session on the admin's authority: no credit gate and no
    /// availability check, but the no-overlap rule still holds. The credit is
    /// taken immediately and may drive the balance negative.
    pub async fn admin_book_session(
        &self,
        ctx: &AuthContext,
        student_id: Uuid,
        start_time: DateTime<Utc>,
        duration_minutes: Option<i64>,
    ) -> BookingResult<Booking> {
        require_admin(ctx)?;
        let session = Interval::from_duration(
            start_time,
            duration_minutes.unwrap_or(DEFAULT_ADMIN_SESSION_MINUTES),
        )?;

        let mut tx = self.begin_locked().await?;
        ensure_free(tx.as_mut(), session, None).await?;
        let student = load_student(tx.as_mut(), student_id).await?;

        let booking = tx
            .insert_booking(&NewBooking {
                interval: session,
                student_id: student.id,
                status: BookingStatus::Scheduled,
                origin: BookingOrigin::Admin,
                credit_charged: true,
                class_notes: "Manually booked by Admin".to_string(),
            })
            .await?;
        let description = format!(
            "Manual booking by Admin for {}",
            session.start.format("%a %b %d %Y")
        );
        let balance = ledger::post(
            tx.as_mut(),
            student.id,
            LedgerEntry::session_booking(description),
        )
        .await?;
        tx.commit().await?;
        info!(booking_id = %booking.id, student_id = %student.id, balance, "Admin booked session");

        self.dispatch_notification(booking.id).await;
        Ok(booking)
    }

    /// Moves a booking. Only the no-overlap rule is re-checked, against every
    /// other live booking; availability and credits are left alone.
    pub async fn update_session_time(
        &self,
        ctx: &AuthContext,
        booking_id: Uuid,
        new_start: DateTime<Utc>,
        duration_minutes: Option<i64>,
    ) -> BookingResult<Booking> {
        require_admin(ctx)?;
        let session = Interval::from_duration(
            new_start,
            duration_minutes.unwrap_or(DEFAULT_ADMIN_SESSION_MINUTES),
        )?;

        let mut tx = self.begin_locked().await?;
        let mut booking = load_booking(tx.as_mut(), booking_id).await?;
        ensure_free(tx.as_mut(), session, Some(booking.id)).await?;

        booking.start_time = session.start;
        booking.end_time = session.end;
        tx.update_booking(&booking).await?;
        tx.commit().await?;
        info!(booking_id = %booking.id, start = %booking.start_time, "Session rescheduled");
        Ok(booking)
    }

    /// Records past sessions as completed, one per date, and deducts them in a
    /// single ledger entry. Historical entries skip availability and collision
    /// checks.
    pub async fn backfill_sessions(
        &self,
        ctx: &AuthContext,
        student_id: Uuid,
        dates: &[NaiveDate],
    ) -> BookingResult<Vec<Booking>> {
        require_admin(ctx)?;
        if dates.is_empty() {
            return Ok(Vec::new());
        }
        let count = i32::try_from(dates.len())
            .map_err(|_| BookingError::InvalidInput("too many dates".to_string()))?;

        let mut tx = self.begin_locked().await?;
        load_student(tx.as_mut(), student_id).await?;

        let mut created = Vec::with_capacity(dates.len());
        for date in dates {
            let start = backfill_start(*date)?;
            let booking = tx
                .insert_booking(&NewBooking {
                    interval: Interval::from_duration(start, BACKFILL_SESSION_MINUTES)?,
                    student_id,
                    status: BookingStatus::Completed,
                    origin: BookingOrigin::Backfill,
                    credit_charged: true,
                    class_notes: "Backfilled Session".to_string(),
                })
                .await?;
            created.push(booking);
        }
        ledger::post(
            tx.as_mut(),
            student_id,
            LedgerEntry::backfill_deduction(count),
        )
        .await?;
        tx.commit().await?;
        info!(student_id = %student_id, sessions = count, "Backfilled sessions");
        Ok(created)
    }
}

//=========================================================================================
// Helpers shared with the admin module
//=========================================================================================

pub(crate) fn require_admin(ctx: &AuthContext) -> BookingResult<()> {
    if ctx.is_admin() {
        Ok(())
    } else {
        Err(BookingError::Forbidden)
    }
}

pub(crate) async fn load_student(
    tx: &mut dyn StoreTransaction,
    student_id: Uuid,
) -> BookingResult<Student> {
    tx.get_student(student_id)
        .await?
        .ok_or_else(|| BookingError::NotFound(format!("Student {} not found", student_id)))
}

async fn load_booking(tx: &mut dyn StoreTransaction, booking_id: Uuid) -> BookingResult<Booking> {
    tx.get_booking(booking_id)
        .await?
        .ok_or_else(|| BookingError::NotFound(format!("Booking {} not found", booking_id)))
}

/// Fails with `SlotCollision` if any live booking other than `exclude` overlaps `session`.
async fn ensure_free(
    tx: &mut dyn StoreTransaction,
    session: Interval,
    exclude: Option<Uuid>,
) -> BookingResult<()> {
    let nearby = tx.list_active_bookings_overlapping(session).await?;
    let clash = nearby
        .iter()
        .filter(|b| Some(b.id) != exclude)
        .find(|b| b.interval().overlaps(&session));
    match clash {
        Some(existing) => {
            debug!(existing = %existing.id, start = %session.start, "Rejected overlapping session");
            Err(BookingError::SlotCollision)
        }
        None => Ok(()),
    }
}

fn backfill_start(date: NaiveDate) -> BookingResult<DateTime<Utc>> {
    let midday = date
        .and_hms_opt(BACKFILL_HOUR_UTC, 0, 0)
        .ok_or_else(|| BookingError::InvalidInput(format!("cannot backfill {}", date)))?;
    Ok(Utc.from_utc_datetime(&midday))
}
