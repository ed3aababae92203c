//! services/api/src/web/admin.rs
//!
//! Handlers for the `/admin` routes. Authority is checked by the booking
//! manager; a non-admin caller gets 403 from there.

use crate::error::ApiError;
use crate::web::rest::{
    AvailabilityWindowResponse, BookingResponse, StudentDetailsResponse, StudentResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use booking_core::admin::RecurringWindows;
use booking_core::domain::{AuthContext, NewStudent};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Request Payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct AdminBookRequest {
    student_id: Uuid,
    start_time: DateTime<Utc>,
    /// Defaults to 60.
    duration_minutes: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct RescheduleRequest {
    start_time: DateTime<Utc>,
    /// Defaults to 60.
    duration_minutes: Option<i64>,
}

#[derive(Deserialize, ToSchema)]
pub struct NotesRequest {
    class_notes: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateStudentRequest {
    email: String,
    name: String,
    #[serde(default)]
    initial_credits: i32,
    default_duration_minutes: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreditsRequest {
    /// Positive to grant, negative to remove.
    amount: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct DurationRequest {
    default_duration_minutes: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct BackfillRequest {
    dates: Vec<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateWindowRequest {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
pub struct RecurringWindowsRequest {
    /// Days of the week, 0 = Sunday through 6 = Saturday.
    weekdays: Vec<u8>,
    /// UTC start of each window, `HH:MM`.
    #[schema(example = "14:00")]
    start_time: String,
    duration_minutes: i64,
    from: NaiveDate,
    to: NaiveDate,
}

#[derive(Serialize, ToSchema)]
pub struct RecurringWindowsResponse {
    created: usize,
}

impl RecurringWindowsRequest {
    fn into_pattern(self) -> Result<RecurringWindows, ApiError> {
        let weekdays = self
            .weekdays
            .iter()
            .map(|d| weekday_from_sunday(*d))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ApiError::BadRequest("weekdays must be between 0 and 6".to_string()))?;
        let start_time = NaiveTime::parse_from_str(&self.start_time, "%H:%M").map_err(|_| {
            ApiError::BadRequest(format!("start_time '{}' is not HH:MM", self.start_time))
        })?;
        Ok(RecurringWindows {
            weekdays,
            start_time,
            duration_minutes: self.duration_minutes,
            from: self.from,
            to: self.to,
        })
    }
}

fn weekday_from_sunday(day: u8) -> Option<Weekday> {
    match day {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

//=========================================================================================
// Bookings
//=========================================================================================

/// Book on the admin's authority: no credit gate, no availability check.
#[utoipa::path(
    post,
    path = "/admin/bookings",
    request_body = AdminBookRequest,
    responses(
        (status = 201, description = "Session booked and charged", body = BookingResponse),
        (status = 409, description = "Overlaps an existing session")
    )
)]
pub async fn admin_book_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<AdminBookRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .manager
        .admin_book_session(&ctx, body.student_id, body.start_time, body.duration_minutes)
        .await?;
    Ok((StatusCode::CREATED, Json(BookingResponse::from(booking))))
}

/// Mark a scheduled session as held.
#[utoipa::path(
    post,
    path = "/admin/bookings/{id}/complete",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Session completed", body = BookingResponse),
        (status = 400, description = "Session is not scheduled")
    )
)]
pub async fn complete_booking_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking = state.manager.complete_session(&ctx, booking_id).await?;
    Ok(Json(booking.into()))
}

/// Move a session.
#[utoipa::path(
    put,
    path = "/admin/bookings/{id}/time",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = RescheduleRequest,
    responses(
        (status = 200, description = "Session moved", body = BookingResponse),
        (status = 409, description = "Overlaps another session")
    )
)]
pub async fn reschedule_booking_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<RescheduleRequest>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking = state
        .manager
        .update_session_time(&ctx, booking_id, body.start_time, body.duration_minutes)
        .await?;
    Ok(Json(booking.into()))
}

#[utoipa::path(
    put,
    path = "/admin/bookings/{id}/notes",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = NotesRequest,
    responses((status = 200, description = "Notes saved", body = BookingResponse))
)]
pub async fn update_notes_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<NotesRequest>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking = state
        .manager
        .update_class_notes(&ctx, booking_id, body.class_notes)
        .await?;
    Ok(Json(booking.into()))
}

/// Remove a session, refunding its credit if one was charged.
#[utoipa::path(
    delete,
    path = "/admin/bookings/{id}",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "No such booking")
    )
)]
pub async fn delete_booking_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(booking_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.manager.delete_session(&ctx, booking_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Students
//=========================================================================================

#[utoipa::path(
    post,
    path = "/admin/students",
    request_body = CreateStudentRequest,
    responses(
        (status = 201, description = "Student created", body = StudentResponse),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn create_student_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateStudentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new_student = NewStudent {
        email: body.email,
        name: body.name,
        initial_credits: body.initial_credits,
        default_duration_minutes: body.default_duration_minutes.unwrap_or(60),
    };
    let student = state.manager.create_student(&ctx, new_student).await?;
    Ok((StatusCode::CREATED, Json(StudentResponse::from(student))))
}

/// All students, lowest balance first.
#[utoipa::path(
    get,
    path = "/admin/students",
    responses((status = 200, description = "Students", body = [StudentResponse]))
)]
pub async fn list_students_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Vec<StudentResponse>>, ApiError> {
    let students = state.manager.list_students(&ctx).await?;
    Ok(Json(students.into_iter().map(Into::into).collect()))
}

/// A student with bookings, ledger history and a balance check.
#[utoipa::path(
    get,
    path = "/admin/students/{id}",
    params(("id" = Uuid, Path, description = "Student id")),
    responses(
        (status = 200, description = "Student details", body = StudentDetailsResponse),
        (status = 404, description = "No such student")
    )
)]
pub async fn student_details_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<StudentDetailsResponse>, ApiError> {
    let details = state.manager.student_details(&ctx, student_id).await?;
    Ok(Json(details.into()))
}

#[utoipa::path(
    post,
    path = "/admin/students/{id}/credits",
    params(("id" = Uuid, Path, description = "Student id")),
    request_body = CreditsRequest,
    responses((status = 200, description = "Balance adjusted", body = StudentResponse))
)]
pub async fn add_credits_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(student_id): Path<Uuid>,
    Json(body): Json<CreditsRequest>,
) -> Result<Json<StudentResponse>, ApiError> {
    let student = state
        .manager
        .add_credits(&ctx, student_id, body.amount)
        .await?;
    Ok(Json(student.into()))
}

#[utoipa::path(
    put,
    path = "/admin/students/{id}/duration",
    params(("id" = Uuid, Path, description = "Student id")),
    request_body = DurationRequest,
    responses((status = 200, description = "Default duration updated", body = StudentResponse))
)]
pub async fn update_duration_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(student_id): Path<Uuid>,
    Json(body): Json<DurationRequest>,
) -> Result<Json<StudentResponse>, ApiError> {
    let student = state
        .manager
        .update_student_duration(&ctx, student_id, body.default_duration_minutes)
        .await?;
    Ok(Json(student.into()))
}

/// Record past sessions as completed and deduct them in one ledger entry.
#[utoipa::path(
    post,
    path = "/admin/students/{id}/backfill",
    params(("id" = Uuid, Path, description = "Student id")),
    request_body = BackfillRequest,
    responses((status = 201, description = "Sessions recorded", body = [BookingResponse]))
)]
pub async fn backfill_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(student_id): Path<Uuid>,
    Json(body): Json<BackfillRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .manager
        .backfill_sessions(&ctx, student_id, &body.dates)
        .await?;
    let created: Vec<BookingResponse> = created.into_iter().map(Into::into).collect();
    Ok((StatusCode::CREATED, Json(created)))
}

//=========================================================================================
// Availability
//=========================================================================================

#[utoipa::path(
    post,
    path = "/admin/availability",
    request_body = CreateWindowRequest,
    responses(
        (status = 201, description = "Window created", body = AvailabilityWindowResponse),
        (status = 400, description = "Empty or inverted window")
    )
)]
pub async fn create_window_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateWindowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let window = state
        .manager
        .create_availability_window(&ctx, body.start_time, body.end_time)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AvailabilityWindowResponse::from(window)),
    ))
}

/// Create weekly windows over a date range, skipping starts that already exist.
#[utoipa::path(
    post,
    path = "/admin/availability/recurring",
    request_body = RecurringWindowsRequest,
    responses((status = 201, description = "Windows created", body = RecurringWindowsResponse))
)]
pub async fn recurring_windows_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<RecurringWindowsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pattern = body.into_pattern()?;
    let created = state
        .manager
        .generate_recurring_windows(&ctx, &pattern)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RecurringWindowsResponse { created }),
    ))
}

#[utoipa::path(
    delete,
    path = "/admin/availability/{id}",
    params(("id" = Uuid, Path, description = "Window id")),
    responses(
        (status = 204, description = "Window deleted"),
        (status = 404, description = "No such window")
    )
)]
pub async fn delete_window_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(window_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .manager
        .delete_availability_window(&ctx, window_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_numbers_start_on_sunday() {
        assert_eq!(weekday_from_sunday(0), Some(Weekday::Sun));
        assert_eq!(weekday_from_sunday(6), Some(Weekday::Sat));
        assert_eq!(weekday_from_sunday(7), None);
    }

    #[test]
    fn recurring_request_rejects_bad_time() {
        let request = RecurringWindowsRequest {
            weekdays: vec![1],
            start_time: "2pm".to_string(),
            duration_minutes: 60,
            from: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            to: NaiveDate::from_ymd_opt(2025, 3, 17).unwrap(),
        };
        assert!(matches!(request.into_pattern(), Err(ApiError::BadRequest(_))));
    }
}
