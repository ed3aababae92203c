//! crates/booking_core/src/admin.rs
//!
//! Admin-only management of students, credits and availability windows.
//! Balance changes go through the ledger like every other credit mutation.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::booking::{load_student, require_admin, BookingManager};
use crate::domain::{AuthContext, AvailabilityWindow, Booking, CreditTransaction, NewStudent, Student};
use crate::error::{BookingError, BookingResult};
use crate::interval::Interval;
use crate::ledger::{self, LedgerEntry, Reconciliation};

/// Longest date range one recurring request may cover, in days.
pub const MAX_RECURRING_SPAN_DAYS: i64 = 366;

/// A weekly pattern of availability windows over a date range (inclusive).
#[derive(Debug, Clone, Deserialize)]
pub struct RecurringWindows {
    pub weekdays: Vec<Weekday>,
    pub start_time: NaiveTime,
    pub duration_minutes: i64,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Everything an admin sees about one student.
#[derive(Debug, Clone, Serialize)]
pub struct StudentDetails {
    pub student: Student,
    pub bookings: Vec<Booking>,
    pub transactions: Vec<CreditTransaction>,
    pub reconciliation: Reconciliation,
}

/// Expands a weekly pattern into concrete UTC intervals, in date order.
pub fn recurring_intervals(pattern: &RecurringWindows) -> BookingResult<Vec<Interval>> {
    if pattern.weekdays.is_empty() {
        return Err(BookingError::InvalidInput(
            "select at least one weekday".to_string(),
        ));
    }
    if pattern.to < pattern.from {
        return Err(BookingError::InvalidInput(format!(
            "range ends ({}) before it starts ({})",
            pattern.to, pattern.from
        )));
    }
    let span = (pattern.to - pattern.from).num_days();
    if span >= MAX_RECURRING_SPAN_DAYS {
        return Err(BookingError::InvalidInput(format!(
            "range covers {} days, at most {} are allowed",
            span + 1,
            MAX_RECURRING_SPAN_DAYS
        )));
    }

    let mut intervals = Vec::new();
    for day in pattern.from.iter_days().take_while(|d| *d <= pattern.to) {
        if pattern.weekdays.contains(&day.weekday()) {
            let start: DateTime<Utc> = Utc.from_utc_datetime(&day.and_time(pattern.start_time));
            intervals.push(Interval::from_duration(start, pattern.duration_minutes)?);
        }
    }
    Ok(intervals)
}

impl BookingManager {
    //=====================================================================================
    // Students and credits
    //=====================================================================================

    /// Creates a student; a positive starting balance is recorded as a purchase.
    pub async fn create_student(
        &self,
        ctx: &AuthContext,
        new_student: NewStudent,
    ) -> BookingResult<Student> {
        require_admin(ctx)?;
        if new_student.email.trim().is_empty() || new_student.name.trim().is_empty() {
            return Err(BookingError::InvalidInput(
                "name and email are required".to_string(),
            ));
        }
        validate_duration(new_student.default_duration_minutes)?;
        if new_student.initial_credits < 0 {
            return Err(BookingError::InvalidInput(
                "initial credits cannot be negative".to_string(),
            ));
        }

        let mut tx = self.begin_locked().await?;
        let mut student = tx.insert_student(&new_student).await?;
        if new_student.initial_credits > 0 {
            student.credits = ledger::post(
                tx.as_mut(),
                student.id,
                LedgerEntry::purchase(new_student.initial_credits),
            )
            .await?;
        }
        tx.commit().await?;
        info!(student_id = %student.id, credits = student.credits, "Student created");
        Ok(student)
    }

    /// Grants (or, with a negative amount, removes) credits as an adjustment.
    pub async fn add_credits(
        &self,
        ctx: &AuthContext,
        student_id: Uuid,
        amount: i32,
    ) -> BookingResult<Student> {
        require_admin(ctx)?;
        let mut tx = self.begin_locked().await?;
        let mut student = load_student(tx.as_mut(), student_id).await?;
        student.credits = ledger::post(tx.as_mut(), student_id, LedgerEntry::adjustment(amount)).await?;
        tx.commit().await?;
        info!(student_id = %student_id, amount, balance = student.credits, "Credits adjusted");
        Ok(student)
    }

    pub async fn update_student_duration(
        &self,
        ctx: &AuthContext,
        student_id: Uuid,
        minutes: i32,
    ) -> BookingResult<Student> {
        require_admin(ctx)?;
        validate_duration(minutes)?;
        let mut tx = self.store.begin().await?;
        let mut student = load_student(tx.as_mut(), student_id).await?;
        tx.update_student_duration(student_id, minutes).await?;
        tx.commit().await?;
        student.default_duration_minutes = minutes;
        Ok(student)
    }

    pub async fn list_students(&self, ctx: &AuthContext) -> BookingResult<Vec<Student>> {
        require_admin(ctx)?;
        Ok(self.store.list_students().await?)
    }

    /// The student with their bookings, ledger history and a balance check.
    pub async fn student_details(
        &self,
        ctx: &AuthContext,
        student_id: Uuid,
    ) -> BookingResult<StudentDetails> {
        if !ctx.can_act_for(student_id) {
            return Err(BookingError::Forbidden);
        }
        let student = self
            .store
            .get_student(student_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Student {} not found", student_id)))?;
        let bookings = self.store.list_bookings_for_student(student_id).await?;
        let transactions = self.store.list_credit_transactions(student_id).await?;
        let reconciliation = ledger::reconcile(student.credits, &transactions);
        Ok(StudentDetails {
            student,
            bookings,
            transactions,
            reconciliation,
        })
    }

    //=====================================================================================
    // Availability
    //=====================================================================================

    pub async fn list_availability(&self, range: Interval) -> BookingResult<Vec<AvailabilityWindow>> {
        Ok(self.store.list_availability_overlapping(range).await?)
    }

    pub async fn create_availability_window(
        &self,
        ctx: &AuthContext,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> BookingResult<AvailabilityWindow> {
        require_admin(ctx)?;
        let range = Interval::new(start_time, end_time)?;
        let mut tx = self.store.begin().await?;
        let window = tx.insert_availability(range).await?;
        tx.commit().await?;
        info!(window_id = %window.id, start = %window.start_time, end = %window.end_time, "Availability window created");
        Ok(window)
    }

    pub async fn delete_availability_window(
        &self,
        ctx: &AuthContext,
        window_id: Uuid,
    ) -> BookingResult<()> {
        require_admin(ctx)?;
        let mut tx = self.store.begin().await?;
        if !tx.delete_availability(window_id).await? {
            return Err(BookingError::NotFound(format!(
                "Availability window {} not found",
                window_id
            )));
        }
        tx.commit().await?;
        info!(window_id = %window_id, "Availability window deleted");
        Ok(())
    }

    /// Creates the windows of a weekly pattern, skipping any date that already
    /// has a window starting at the same instant. Returns how many were created.
    pub async fn generate_recurring_windows(
        &self,
        ctx: &AuthContext,
        pattern: &RecurringWindows,
    ) -> BookingResult<usize> {
        require_admin(ctx)?;
        let intervals = recurring_intervals(pattern)?;

        let mut tx = self.store.begin().await?;
        let mut created = 0;
        for interval in intervals {
            let existing = tx.list_availability_overlapping(interval).await?;
            if existing.iter().any(|w| w.start_time == interval.start) {
                continue;
            }
            tx.insert_availability(interval).await?;
            created += 1;
        }
        tx.commit().await?;
        info!(created, "Recurring availability generated");
        Ok(created)
    }
}

fn validate_duration(minutes: i32) -> BookingResult<()> {
    if minutes <= 0 {
        return Err(BookingError::InvalidInput(format!(
            "session duration must be positive, got {} minutes",
            minutes
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::ports::NoopNotifier;
    use chrono::Duration;
    use std::sync::Arc;

    fn manager() -> BookingManager {
        BookingManager::new(Arc::new(InMemoryStore::new()), Arc::new(NoopNotifier))
    }

    fn new_student(credits: i32) -> NewStudent {
        NewStudent {
            email: "bea@example.com".to_string(),
            name: "Bea".to_string(),
            initial_credits: credits,
            default_duration_minutes: 60,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn initial_credits_are_recorded_as_purchase() {
        let manager = manager();
        let admin = AuthContext::admin();
        let student = manager.create_student(&admin, new_student(10)).await.unwrap();
        assert_eq!(student.credits, 10);

        let details = manager.student_details(&admin, student.id).await.unwrap();
        assert_eq!(details.transactions.len(), 1);
        assert_eq!(details.transactions[0].kind.as_str(), "PURCHASE");
        assert!(details.reconciliation.is_consistent());
    }

    #[tokio::test]
    async fn zero_initial_credits_write_no_ledger_row() {
        let manager = manager();
        let admin = AuthContext::admin();
        let student = manager.create_student(&admin, new_student(0)).await.unwrap();
        let details = manager.student_details(&admin, student.id).await.unwrap();
        assert!(details.transactions.is_empty());
    }

    #[tokio::test]
    async fn adjustments_keep_balance_and_ledger_in_step() {
        let manager = manager();
        let admin = AuthContext::admin();
        let student = manager.create_student(&admin, new_student(2)).await.unwrap();

        let student = manager.add_credits(&admin, student.id, 5).await.unwrap();
        assert_eq!(student.credits, 7);
        let student = manager.add_credits(&admin, student.id, -3).await.unwrap();
        assert_eq!(student.credits, 4);

        let details = manager.student_details(&admin, student.id).await.unwrap();
        assert_eq!(details.transactions.len(), 3);
        assert_eq!(details.transactions[0].amount, -3);
        assert!(details.reconciliation.is_consistent());
    }

    #[tokio::test]
    async fn management_requires_admin() {
        let manager = manager();
        let student_ctx = AuthContext::student(Uuid::new_v4());
        assert!(matches!(
            manager.create_student(&student_ctx, new_student(1)).await,
            Err(BookingError::Forbidden)
        ));
        let now = Utc::now();
        assert!(matches!(
            manager
                .create_availability_window(&student_ctx, now, now + Duration::hours(1))
                .await,
            Err(BookingError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn invalid_student_input_is_rejected() {
        let manager = manager();
        let admin = AuthContext::admin();
        let mut bad = new_student(1);
        bad.default_duration_minutes = 0;
        assert!(matches!(
            manager.create_student(&admin, bad).await,
            Err(BookingError::InvalidInput(_))
        ));
        let student = manager.create_student(&admin, new_student(1)).await.unwrap();
        assert!(matches!(
            manager.update_student_duration(&admin, student.id, -15).await,
            Err(BookingError::InvalidInput(_))
        ));
        let updated = manager
            .update_student_duration(&admin, student.id, 90)
            .await
            .unwrap();
        assert_eq!(updated.default_duration_minutes, 90);
    }

    #[tokio::test]
    async fn availability_windows_round_trip() {
        let manager = manager();
        let admin = AuthContext::admin();
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();

        assert!(matches!(
            manager.create_availability_window(&admin, start, start).await,
            Err(BookingError::InvalidInput(_))
        ));

        let window = manager
            .create_availability_window(&admin, start, start + Duration::hours(3))
            .await
            .unwrap();
        let day = Interval::utc_day(start.date_naive());
        assert_eq!(manager.list_availability(day).await.unwrap(), vec![window.clone()]);

        manager.delete_availability_window(&admin, window.id).await.unwrap();
        assert!(manager.list_availability(day).await.unwrap().is_empty());
        assert!(matches!(
            manager.delete_availability_window(&admin, window.id).await,
            Err(BookingError::NotFound(_))
        ));
    }

    #[test]
    fn recurring_pattern_expands_matching_weekdays() {
        // 2025-03-10 is a Monday.
        let pattern = RecurringWindows {
            weekdays: vec![Weekday::Mon, Weekday::Wed],
            start_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            duration_minutes: 120,
            from: date(2025, 3, 10),
            to: date(2025, 3, 17),
        };
        let starts: Vec<_> = recurring_intervals(&pattern)
            .unwrap()
            .iter()
            .map(|i| i.start)
            .collect();
        assert_eq!(
            starts,
            vec![
                Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 12, 14, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 17, 14, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn recurring_span_is_capped_at_a_year() {
        let pattern = RecurringWindows {
            weekdays: vec![Weekday::Mon],
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_minutes: 60,
            from: date(2025, 1, 1),
            to: date(2025, 12, 31),
        };
        assert_eq!(recurring_intervals(&pattern).unwrap().len(), 52);

        let too_long = RecurringWindows {
            from: NaiveDate::MIN,
            to: NaiveDate::MAX,
            ..pattern.clone()
        };
        assert!(matches!(
            recurring_intervals(&too_long),
            Err(BookingError::InvalidInput(_))
        ));
        let just_over = RecurringWindows {
            to: date(2026, 1, 1),
            from: date(2024, 12, 31),
            ..pattern
        };
        assert!(recurring_intervals(&just_over).is_err());
    }

    #[tokio::test]
    async fn recurring_generation_skips_existing_starts() {
        let manager = manager();
        let admin = AuthContext::admin();
        let pattern = RecurringWindows {
            weekdays: vec![Weekday::Mon, Weekday::Tue],
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration_minutes: 180,
            from: date(2025, 3, 10),
            to: date(2025, 3, 11),
        };
        assert_eq!(
            manager.generate_recurring_windows(&admin, &pattern).await.unwrap(),
            2
        );
        assert_eq!(
            manager.generate_recurring_windows(&admin, &pattern).await.unwrap(),
            0
        );

        let empty = RecurringWindows {
            weekdays: Vec::new(),
            ..pattern
        };
        assert!(matches!(
            manager.generate_recurring_windows(&admin, &empty).await,
            Err(BookingError::InvalidInput(_))
        ));
    }
}
