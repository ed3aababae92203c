//! crates/booking_core/src/memory.rs
//!
//! An in-process implementation of the storage ports.
//!
//! A transaction owns the store's mutex from `begin` until it is committed or
//! dropped, so transactions run one at a time. Writes land in a working copy
//! that replaces the shared state only on commit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{
    AvailabilityWindow, Booking, BookingStatus, CreditTransaction, NewBooking,
    NewCreditTransaction, NewStudent, Student,
};
use crate::interval::Interval;
use crate::ports::{BookingStore, PortError, PortResult, StoreTransaction};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    students: HashMap<Uuid, Student>,
    windows: Vec<AvailabilityWindow>,
    bookings: Vec<Booking>,
    ledger: Vec<CreditTransaction>,
}

impl MemoryState {
    fn windows_overlapping(&self, range: Interval) -> Vec<AvailabilityWindow> {
        let mut found: Vec<_> = self
            .windows
            .iter()
            .filter(|w| w.start_time < range.end && w.end_time > range.start)
            .cloned()
            .collect();
        found.sort_by_key(|w| w.start_time);
        found
    }

    fn live_bookings_overlapping(&self, range: Interval) -> Vec<Booking> {
        let mut found: Vec<_> = self
            .bookings
            .iter()
            .filter(|b| b.is_live() && b.start_time < range.end && b.end_time > range.start)
            .cloned()
            .collect();
        found.sort_by_key(|b| b.start_time);
        found
    }

    fn booking(&self, booking_id: Uuid) -> Option<Booking> {
        self.bookings.iter().find(|b| b.id == booking_id).cloned()
    }
}

/// Shared handle; clones see the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn begin(&self) -> PortResult<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn get_student(&self, student_id: Uuid) -> PortResult<Option<Student>> {
        Ok(self.state.lock().await.students.get(&student_id).cloned())
    }

    async fn list_students(&self) -> PortResult<Vec<Student>> {
        let state = self.state.lock().await;
        let mut students: Vec<_> = state.students.values().cloned().collect();
        students.sort_by(|a, b| a.credits.cmp(&b.credits).then_with(|| a.name.cmp(&b.name)));
        Ok(students)
    }

    async fn get_booking(&self, booking_id: Uuid) -> PortResult<Option<Booking>> {
        Ok(self.state.lock().await.booking(booking_id))
    }

    async fn list_bookings_for_student(&self, student_id: Uuid) -> PortResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<_> = state
            .bookings
            .iter()
            .filter(|b| b.student_id == Some(student_id))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(bookings)
    }

    async fn list_availability_overlapping(
        &self,
        range: Interval,
    ) -> PortResult<Vec<AvailabilityWindow>> {
        Ok(self.state.lock().await.windows_overlapping(range))
    }

    async fn list_active_bookings_overlapping(&self, range: Interval) -> PortResult<Vec<Booking>> {
        Ok(self.state.lock().await.live_bookings_overlapping(range))
    }

    async fn list_credit_transactions(
        &self,
        student_id: Uuid,
    ) -> PortResult<Vec<CreditTransaction>> {
        let state = self.state.lock().await;
        // Appended in order, so reversing gives newest first.
        Ok(state
            .ledger
            .iter()
            .rev()
            .filter(|t| t.student_id == student_id)
            .cloned()
            .collect())
    }
}

/// Holds the store lock for its whole lifetime.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_calendar(&mut self) -> PortResult<()> {
        // Already exclusive since `begin`.
        Ok(())
    }

    async fn get_student(&mut self, student_id: Uuid) -> PortResult<Option<Student>> {
        Ok(self.working.students.get(&student_id).cloned())
    }

    async fn insert_student(&mut self, student: &NewStudent) -> PortResult<Student> {
        if self
            .working
            .students
            .values()
            .any(|s| s.email.eq_ignore_ascii_case(&student.email))
        {
            return Err(PortError::Conflict(format!(
                "Student with email {} already exists",
                student.email
            )));
        }
        let record = Student {
            id: Uuid::new_v4(),
            email: student.email.clone(),
            name: student.name.clone(),
            credits: 0,
            default_duration_minutes: student.default_duration_minutes,
            password_set: false,
            created_at: Utc::now(),
        };
        self.working.students.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_student_duration(
        &mut self,
        student_id: Uuid,
        minutes: i32,
    ) -> PortResult<()> {
        let student = self
            .working
            .students
            .get_mut(&student_id)
            .ok_or_else(|| PortError::NotFound(format!("Student {} not found", student_id)))?;
        student.default_duration_minutes = minutes;
        Ok(())
    }

    async fn list_availability_overlapping(
        &mut self,
        range: Interval,
    ) -> PortResult<Vec<AvailabilityWindow>> {
        Ok(self.working.windows_overlapping(range))
    }

    async fn insert_availability(&mut self, range: Interval) -> PortResult<AvailabilityWindow> {
        let window = AvailabilityWindow {
            id: Uuid::new_v4(),
            start_time: range.start,
            end_time: range.end,
        };
        self.working.windows.push(window.clone());
        Ok(window)
    }

    async fn delete_availability(&mut self, window_id: Uuid) -> PortResult<bool> {
        let before = self.working.windows.len();
        self.working.windows.retain(|w| w.id != window_id);
        Ok(self.working.windows.len() != before)
    }

    async fn get_booking(&mut self, booking_id: Uuid) -> PortResult<Option<Booking>> {
        Ok(self.working.booking(booking_id))
    }

    async fn list_active_bookings_overlapping(
        &mut self,
        range: Interval,
    ) -> PortResult<Vec<Booking>> {
        Ok(self.working.live_bookings_overlapping(range))
    }

    async fn count_active_scheduled(&mut self, student_id: Uuid) -> PortResult<i64> {
        Ok(self
            .working
            .bookings
            .iter()
            .filter(|b| b.student_id == Some(student_id) && b.status == BookingStatus::Scheduled)
            .count() as i64)
    }

    async fn insert_booking(&mut self, booking: &NewBooking) -> PortResult<Booking> {
        let record = Booking {
            id: Uuid::new_v4(),
            start_time: booking.interval.start,
            end_time: booking.interval.end,
            student_id: Some(booking.student_id),
            status: booking.status,
            origin: booking.origin,
            credit_charged: booking.credit_charged,
            class_notes: booking.class_notes.clone(),
            created_at: Utc::now(),
        };
        self.working.bookings.push(record.clone());
        Ok(record)
    }

    async fn update_booking(&mut self, booking: &Booking) -> PortResult<()> {
        let slot = self
            .working
            .bookings
            .iter_mut()
            .find(|b| b.id == booking.id)
            .ok_or_else(|| PortError::NotFound(format!("Booking {} not found", booking.id)))?;
        *slot = booking.clone();
        Ok(())
    }

    async fn delete_booking(&mut self, booking_id: Uuid) -> PortResult<()> {
        self.working.bookings.retain(|b| b.id != booking_id);
        Ok(())
    }

    async fn post_ledger_entry(
        &mut self,
        entry: &NewCreditTransaction,
    ) -> PortResult<(CreditTransaction, i32)> {
        let student = self
            .working
            .students
            .get_mut(&entry.student_id)
            .ok_or_else(|| {
                PortError::NotFound(format!("Student {} not found", entry.student_id))
            })?;
        student.credits += entry.amount;
        let balance = student.credits;

        let row = CreditTransaction {
            id: Uuid::new_v4(),
            student_id: entry.student_id,
            amount: entry.amount,
            kind: entry.kind,
            description: entry.description.clone(),
            created_at: Utc::now(),
        };
        self.working.ledger.push(row.clone());
        Ok((row, balance))
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn new_student(email: &str) -> NewStudent {
        NewStudent {
            email: email.to_string(),
            name: "Test".to_string(),
            initial_credits: 0,
            default_duration_minutes: 60,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_student(&new_student("gone@example.com"))
                .await
                .unwrap();
        }
        assert!(store.list_students().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let student = tx
            .insert_student(&new_student("kept@example.com"))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(
            store.get_student(student.id).await.unwrap().map(|s| s.email),
            Some("kept@example.com".to_string())
        );
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_student(&new_student("dup@example.com"))
            .await
            .unwrap();
        let again = tx.insert_student(&new_student("DUP@example.com")).await;
        assert!(matches!(again, Err(PortError::Conflict(_))));
    }

    #[tokio::test]
    async fn range_queries_use_half_open_bounds_and_skip_canceled() {
        let store = InMemoryStore::new();
        let nine = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        let mut tx = store.begin().await.unwrap();
        let student = tx
            .insert_student(&new_student("range@example.com"))
            .await
            .unwrap();
        let mut booking = NewBooking {
            interval: Interval::from_duration(nine, 60).unwrap(),
            student_id: student.id,
            status: BookingStatus::Scheduled,
            origin: crate::domain::BookingOrigin::SelfService,
            credit_charged: false,
            class_notes: String::new(),
        };
        tx.insert_booking(&booking).await.unwrap();
        booking.interval = Interval::from_duration(nine + Duration::hours(2), 60).unwrap();
        booking.status = BookingStatus::Canceled;
        tx.insert_booking(&booking).await.unwrap();
        tx.commit().await.unwrap();

        let touching = Interval::from_duration(nine + Duration::hours(1), 60).unwrap();
        assert!(store
            .list_active_bookings_overlapping(touching)
            .await
            .unwrap()
            .is_empty());
        let day = Interval::utc_day(nine.date_naive());
        assert_eq!(
            store.list_active_bookings_overlapping(day).await.unwrap().len(),
            1
        );
    }
}
