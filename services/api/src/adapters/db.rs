//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `BookingStore` and `StoreTransaction` ports from the `core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.
//!
//! Writers serialize on a transaction-scoped advisory lock. The `bookings_no_overlap`
//! exclusion constraint backs the no-overlap rule at the storage level as well.

use async_trait::async_trait;
use booking_core::domain::{
    AvailabilityWindow, Booking, BookingOrigin, BookingStatus, CreditTransaction,
    CreditTransactionKind, NewBooking, NewCreditTransaction, NewStudent, Student,
};
use booking_core::interval::Interval;
use booking_core::ports::{BookingStore, PortError, PortResult, StoreTransaction};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Key of the advisory lock that guards the calendar and credit balances.
const CALENDAR_LOCK_KEY: i64 = 0x5e55_1045;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `BookingStore` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// An open database transaction. Dropping it without `commit` rolls back.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const STUDENT_COLUMNS: &str =
    "id, email, name, credits, default_duration_minutes, password_hash IS NOT NULL AS password_set, created_at";
const BOOKING_COLUMNS: &str =
    "id, start_time, end_time, student_id, status, origin, credit_charged, class_notes, created_at";
const TRANSACTION_COLUMNS: &str = "id, student_id, amount, kind, description, created_at";

#[derive(FromRow)]
struct StudentRecord {
    id: Uuid,
    email: String,
    name: String,
    credits: i32,
    default_duration_minutes: i32,
    password_set: bool,
    created_at: DateTime<Utc>,
}
impl StudentRecord {
    fn to_domain(self) -> Student {
        Student {
            id: self.id,
            email: self.email,
            name: self.name,
            credits: self.credits,
            default_duration_minutes: self.default_duration_minutes,
            password_set: self.password_set,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct WindowRecord {
    id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}
impl WindowRecord {
    fn to_domain(self) -> AvailabilityWindow {
        AvailabilityWindow {
            id: self.id,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

#[derive(FromRow)]
struct BookingRecord {
    id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    student_id: Option<Uuid>,
    status: String,
    origin: String,
    credit_charged: bool,
    class_notes: String,
    created_at: DateTime<Utc>,
}
impl BookingRecord {
    fn to_domain(self) -> PortResult<Booking> {
        let status = BookingStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown booking status '{}'", self.status))
        })?;
        let origin = BookingOrigin::parse(&self.origin).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown booking origin '{}'", self.origin))
        })?;
        Ok(Booking {
            id: self.id,
            start_time: self.start_time,
            end_time: self.end_time,
            student_id: self.student_id,
            status,
            origin,
            credit_charged: self.credit_charged,
            class_notes: self.class_notes,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct CreditTransactionRecord {
    id: Uuid,
    student_id: Uuid,
    amount: i32,
    kind: String,
    description: String,
    created_at: DateTime<Utc>,
}
impl CreditTransactionRecord {
    fn to_domain(self) -> PortResult<CreditTransaction> {
        let kind = CreditTransactionKind::parse(&self.kind).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown credit transaction kind '{}'", self.kind))
        })?;
        Ok(CreditTransaction {
            id: self.id,
            student_id: self.student_id,
            amount: self.amount,
            kind,
            description: self.description,
            created_at: self.created_at,
        })
    }
}

/// Translates constraint violations into the port's conflict variants.
fn map_db_error(e: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(ref db) = e {
        match db.code().as_deref() {
            // exclusion_violation
            Some("23P01") => return PortError::Overlap(db.message().to_string()),
            // unique_violation
            Some("23505") => return PortError::Conflict(db.message().to_string()),
            _ => {}
        }
    }
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// Queries shared by the pool and by open transactions
//=========================================================================================

async fn fetch_student<'e>(
    exec: impl PgExecutor<'e>,
    student_id: Uuid,
    for_update: bool,
) -> PortResult<Option<Student>> {
    let sql = format!(
        "SELECT {} FROM students WHERE id = $1{}",
        STUDENT_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let record = sqlx::query_as::<_, StudentRecord>(&sql)
        .bind(student_id)
        .fetch_optional(exec)
        .await
        .map_err(map_db_error)?;
    Ok(record.map(StudentRecord::to_domain))
}

async fn fetch_booking<'e>(
    exec: impl PgExecutor<'e>,
    booking_id: Uuid,
    for_update: bool,
) -> PortResult<Option<Booking>> {
    let sql = format!(
        "SELECT {} FROM bookings WHERE id = $1{}",
        BOOKING_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, BookingRecord>(&sql)
        .bind(booking_id)
        .fetch_optional(exec)
        .await
        .map_err(map_db_error)?
        .map(BookingRecord::to_domain)
        .transpose()
}

async fn fetch_windows_overlapping<'e>(
    exec: impl PgExecutor<'e>,
    range: Interval,
) -> PortResult<Vec<AvailabilityWindow>> {
    let records = sqlx::query_as::<_, WindowRecord>(
        "SELECT id, start_time, end_time FROM availability_windows
         WHERE start_time < $2 AND end_time > $1
         ORDER BY start_time",
    )
    .bind(range.start)
    .bind(range.end)
    .fetch_all(exec)
    .await
    .map_err(map_db_error)?;
    Ok(records.into_iter().map(WindowRecord::to_domain).collect())
}

async fn fetch_live_bookings_overlapping<'e>(
    exec: impl PgExecutor<'e>,
    range: Interval,
) -> PortResult<Vec<Booking>> {
    let sql = format!(
        "SELECT {} FROM bookings
         WHERE status <> 'CANCELED' AND start_time < $2 AND end_time > $1
         ORDER BY start_time",
        BOOKING_COLUMNS
    );
    sqlx::query_as::<_, BookingRecord>(&sql)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(exec)
        .await
        .map_err(map_db_error)?
        .into_iter()
        .map(BookingRecord::to_domain)
        .collect()
}

//=========================================================================================
// `BookingStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl BookingStore for PgStore {
    async fn begin(&self) -> PortResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.map_err(map_db_error)?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn get_student(&self, student_id: Uuid) -> PortResult<Option<Student>> {
        fetch_student(&self.pool, student_id, false).await
    }

    async fn list_students(&self) -> PortResult<Vec<Student>> {
        let sql = format!(
            "SELECT {} FROM students ORDER BY credits ASC, name ASC",
            STUDENT_COLUMNS
        );
        let records = sqlx::query_as::<_, StudentRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(records.into_iter().map(StudentRecord::to_domain).collect())
    }

    async fn get_booking(&self, booking_id: Uuid) -> PortResult<Option<Booking>> {
        fetch_booking(&self.pool, booking_id, false).await
    }

    async fn list_bookings_for_student(&self, student_id: Uuid) -> PortResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE student_id = $1 ORDER BY start_time DESC",
            BOOKING_COLUMNS
        );
        sqlx::query_as::<_, BookingRecord>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(BookingRecord::to_domain)
            .collect()
    }

    async fn list_availability_overlapping(
        &self,
        range: Interval,
    ) -> PortResult<Vec<AvailabilityWindow>> {
        fetch_windows_overlapping(&self.pool, range).await
    }

    async fn list_active_bookings_overlapping(&self, range: Interval) -> PortResult<Vec<Booking>> {
        fetch_live_bookings_overlapping(&self.pool, range).await
    }

    async fn list_credit_transactions(
        &self,
        student_id: Uuid,
    ) -> PortResult<Vec<CreditTransaction>> {
        let sql = format!(
            "SELECT {} FROM credit_transactions WHERE student_id = $1
             ORDER BY created_at DESC, id",
            TRANSACTION_COLUMNS
        );
        sqlx::query_as::<_, CreditTransactionRecord>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(CreditTransactionRecord::to_domain)
            .collect()
    }
}

//=========================================================================================
// `StoreTransaction` Trait Implementation
//=========================================================================================

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn lock_calendar(&mut self) -> PortResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(CALENDAR_LOCK_KEY)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn get_student(&mut self, student_id: Uuid) -> PortResult<Option<Student>> {
        fetch_student(&mut *self.tx, student_id, true).await
    }

    async fn insert_student(&mut self, student: &NewStudent) -> PortResult<Student> {
        let sql = format!(
            "INSERT INTO students (id, email, name, credits, default_duration_minutes)
             VALUES ($1, $2, $3, 0, $4)
             RETURNING {}",
            STUDENT_COLUMNS
        );
        let record = sqlx::query_as::<_, StudentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&student.email)
            .bind(&student.name)
            .bind(student.default_duration_minutes)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| match map_db_error(e) {
                PortError::Conflict(_) => PortError::Conflict(format!(
                    "Student with email {} already exists",
                    student.email
                )),
                other => other,
            })?;
        Ok(record.to_domain())
    }

    async fn update_student_duration(
        &mut self,
        student_id: Uuid,
        minutes: i32,
    ) -> PortResult<()> {
        let result = sqlx::query("UPDATE students SET default_duration_minutes = $2 WHERE id = $1")
            .bind(student_id)
            .bind(minutes)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Student {} not found", student_id)));
        }
        Ok(())
    }

    async fn list_availability_overlapping(
        &mut self,
        range: Interval,
    ) -> PortResult<Vec<AvailabilityWindow>> {
        fetch_windows_overlapping(&mut *self.tx, range).await
    }

    async fn insert_availability(&mut self, range: Interval) -> PortResult<AvailabilityWindow> {
        let record = sqlx::query_as::<_, WindowRecord>(
            "INSERT INTO availability_windows (id, start_time, end_time)
             VALUES ($1, $2, $3)
             RETURNING id, start_time, end_time",
        )
        .bind(Uuid::new_v4())
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn delete_availability(&mut self, window_id: Uuid) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM availability_windows WHERE id = $1")
            .bind(window_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_booking(&mut self, booking_id: Uuid) -> PortResult<Option<Booking>> {
        fetch_booking(&mut *self.tx, booking_id, true).await
    }

    async fn list_active_bookings_overlapping(
        &mut self,
        range: Interval,
    ) -> PortResult<Vec<Booking>> {
        fetch_live_bookings_overlapping(&mut *self.tx, range).await
    }

    async fn count_active_scheduled(&mut self, student_id: Uuid) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bookings WHERE student_id = $1 AND status = 'SCHEDULED'",
        )
        .bind(student_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)
    }

    async fn insert_booking(&mut self, booking: &NewBooking) -> PortResult<Booking> {
        let sql = format!(
            "INSERT INTO bookings
                (id, start_time, end_time, student_id, status, origin, credit_charged, class_notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            BOOKING_COLUMNS
        );
        sqlx::query_as::<_, BookingRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(booking.interval.start)
            .bind(booking.interval.end)
            .bind(booking.student_id)
            .bind(booking.status.as_str())
            .bind(booking.origin.as_str())
            .bind(booking.credit_charged)
            .bind(&booking.class_notes)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)?
            .to_domain()
    }

    async fn update_booking(&mut self, booking: &Booking) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE bookings
             SET start_time = $2, end_time = $3, status = $4, origin = $5,
                 credit_charged = $6, class_notes = $7
             WHERE id = $1",
        )
        .bind(booking.id)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.status.as_str())
        .bind(booking.origin.as_str())
        .bind(booking.credit_charged)
        .bind(&booking.class_notes)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Booking {} not found", booking.id)));
        }
        Ok(())
    }

    async fn delete_booking(&mut self, booking_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(booking_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn post_ledger_entry(
        &mut self,
        entry: &NewCreditTransaction,
    ) -> PortResult<(CreditTransaction, i32)> {
        let balance: i32 = sqlx::query_scalar(
            "UPDATE students SET credits = credits + $2 WHERE id = $1 RETURNING credits",
        )
        .bind(entry.student_id)
        .bind(entry.amount)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| PortError::NotFound(format!("Student {} not found", entry.student_id)))?;

        let sql = format!(
            "INSERT INTO credit_transactions (id, student_id, amount, kind, description)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, CreditTransactionRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(entry.student_id)
            .bind(entry.amount)
            .bind(entry.kind.as_str())
            .bind(&entry.description)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)?
            .to_domain()?;
        Ok((row, balance))
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        self.tx.commit().await.map_err(map_db_error)
    }
}
