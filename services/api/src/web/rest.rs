//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the public and student-facing REST endpoints,
//! the response payloads shared with the admin handlers, and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::admin;
use crate::web::middleware::STUDENT_ID_HEADER;
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use booking_core::admin::StudentDetails;
use booking_core::domain::{
    Actor, AuthContext, AvailabilityWindow, Booking, CreditTransaction, Student,
};
use booking_core::interval::Interval;
use booking_core::slots::CandidateSlot;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{IntoParams, Modify, OpenApi, ToSchema};
use uuid::Uuid;

/// Session length used by `/slots` when the caller gives none.
const DEFAULT_SLOT_MINUTES: i64 = 60;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        list_slots_handler,
        list_availability_handler,
        create_booking_handler,
        cancel_booking_handler,
        admin::admin_book_handler,
        admin::complete_booking_handler,
        admin::reschedule_booking_handler,
        admin::update_notes_handler,
        admin::delete_booking_handler,
        admin::create_student_handler,
        admin::list_students_handler,
        admin::student_details_handler,
        admin::add_credits_handler,
        admin::update_duration_handler,
        admin::backfill_handler,
        admin::create_window_handler,
        admin::recurring_windows_handler,
        admin::delete_window_handler,
    ),
    components(
        schemas(
            SlotResponse, BookingResponse, StudentResponse, AvailabilityWindowResponse,
            CreditTransactionResponse, ReconciliationResponse, StudentDetailsResponse,
            CreateBookingRequest, admin::AdminBookRequest, admin::RescheduleRequest,
            admin::NotesRequest, admin::CreateStudentRequest, admin::CreditsRequest,
            admin::DurationRequest, admin::BackfillRequest, admin::CreateWindowRequest,
            admin::RecurringWindowsRequest, admin::RecurringWindowsResponse,
        )
    ),
    modifiers(&CallerSchemes),
    tags(
        (name = "Tutoring Booking API", description = "Slot discovery, booking and credit management for a single tutor.")
    )
)]
pub struct ApiDoc;

/// Documents the two ways a caller identifies itself.
struct CallerSchemes;

impl Modify for CallerSchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "admin_token",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
        components.add_security_scheme(
            "student_id",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(STUDENT_ID_HEADER))),
        );
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct SlotResponse {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    available: bool,
}

impl From<CandidateSlot> for SlotResponse {
    fn from(slot: CandidateSlot) -> Self {
        Self {
            start_time: slot.start_time,
            end_time: slot.end_time,
            available: slot.available,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BookingResponse {
    id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    student_id: Option<Uuid>,
    /// `SCHEDULED`, `COMPLETED` or `CANCELED`.
    status: String,
    /// `SELF_SERVICE`, `ADMIN` or `BACKFILL`.
    origin: String,
    credit_charged: bool,
    class_notes: String,
    created_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            start_time: b.start_time,
            end_time: b.end_time,
            student_id: b.student_id,
            status: b.status.as_str().to_string(),
            origin: b.origin.as_str().to_string(),
            credit_charged: b.credit_charged,
            class_notes: b.class_notes,
            created_at: b.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StudentResponse {
    id: Uuid,
    email: String,
    name: String,
    credits: i32,
    default_duration_minutes: i32,
    password_set: bool,
    created_at: DateTime<Utc>,
}

impl From<Student> for StudentResponse {
    fn from(s: Student) -> Self {
        Self {
            id: s.id,
            email: s.email,
            name: s.name,
            credits: s.credits,
            default_duration_minutes: s.default_duration_minutes,
            password_set: s.password_set,
            created_at: s.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AvailabilityWindowResponse {
    id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl From<AvailabilityWindow> for AvailabilityWindowResponse {
    fn from(w: AvailabilityWindow) -> Self {
        Self {
            id: w.id,
            start_time: w.start_time,
            end_time: w.end_time,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CreditTransactionResponse {
    id: Uuid,
    amount: i32,
    kind: String,
    description: String,
    created_at: DateTime<Utc>,
}

impl From<CreditTransaction> for CreditTransactionResponse {
    fn from(t: CreditTransaction) -> Self {
        Self {
            id: t.id,
            amount: t.amount,
            kind: t.kind.as_str().to_string(),
            description: t.description,
            created_at: t.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ReconciliationResponse {
    ledger_total: i64,
    balance: i32,
    drift: i64,
    consistent: bool,
}

#[derive(Serialize, ToSchema)]
pub struct StudentDetailsResponse {
    student: StudentResponse,
    bookings: Vec<BookingResponse>,
    transactions: Vec<CreditTransactionResponse>,
    reconciliation: ReconciliationResponse,
}

impl From<StudentDetails> for StudentDetailsResponse {
    fn from(d: StudentDetails) -> Self {
        Self {
            reconciliation: ReconciliationResponse {
                ledger_total: d.reconciliation.ledger_total,
                balance: d.reconciliation.balance,
                drift: d.reconciliation.drift,
                consistent: d.reconciliation.is_consistent(),
            },
            student: d.student.into(),
            bookings: d.bookings.into_iter().map(Into::into).collect(),
            transactions: d.transactions.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SlotsQuery {
    /// UTC calendar day, `YYYY-MM-DD`.
    date: NaiveDate,
    /// Session length; defaults to 60.
    duration_minutes: Option<i64>,
    /// Coalesce overlapping windows and list each start once.
    #[serde(default)]
    merge: bool,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AvailabilityQuery {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    start_time: DateTime<Utc>,
    /// Required when the caller is the admin; defaults to the calling student.
    student_id: Option<Uuid>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(get, path = "/health", responses((status = 200, description = "Service is up")))]
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// List candidate start times for one UTC day.
#[utoipa::path(
    get,
    path = "/slots",
    params(SlotsQuery),
    responses(
        (status = 200, description = "Candidate slots in window-then-time order", body = [SlotResponse]),
        (status = 400, description = "Non-positive duration")
    )
)]
pub async fn list_slots_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<SlotResponse>>, ApiError> {
    let duration = query.duration_minutes.unwrap_or(DEFAULT_SLOT_MINUTES);
    let slots = if query.merge {
        state.manager.merged_start_times(query.date, duration).await?
    } else {
        state.manager.viable_start_times(query.date, duration).await?
    };
    Ok(Json(slots.into_iter().map(Into::into).collect()))
}

/// List availability windows overlapping `[from, to)`.
#[utoipa::path(
    get,
    path = "/availability",
    params(AvailabilityQuery),
    responses(
        (status = 200, description = "Windows ordered by start", body = [AvailabilityWindowResponse]),
        (status = 400, description = "Empty or inverted range")
    )
)]
pub async fn list_availability_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<AvailabilityWindowResponse>>, ApiError> {
    let range = Interval::new(query.from, query.to)?;
    let windows = state.manager.list_availability(range).await?;
    Ok(Json(windows.into_iter().map(Into::into).collect()))
}

/// Book a session at the student's default duration.
#[utoipa::path(
    post,
    path = "/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 201, description = "Session booked", body = BookingResponse),
        (status = 402, description = "Not enough unreserved credits"),
        (status = 409, description = "Overlaps an existing session"),
        (status = 422, description = "Outside the tutor's availability")
    ),
    params(
        ("x-student-id" = Option<Uuid>, Header, description = "The acting student.")
    )
)]
pub async fn create_booking_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let student_id = match (body.student_id, ctx.actor) {
        (Some(id), _) => id,
        (None, Actor::Student(id)) => id,
        (None, Actor::Admin) => {
            return Err(ApiError::BadRequest("student_id is required".to_string()))
        }
    };
    let booking = state
        .manager
        .book_session(&ctx, body.start_time, student_id)
        .await?;
    Ok((StatusCode::CREATED, Json(BookingResponse::from(booking))))
}

/// Cancel a scheduled session. Allowed for the admin and the owning student.
#[utoipa::path(
    post,
    path = "/bookings/{id}/cancel",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Session canceled", body = BookingResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such booking")
    )
)]
pub async fn cancel_booking_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking = state.manager.cancel_session(&ctx, booking_id).await?;
    Ok(Json(booking.into()))
}
