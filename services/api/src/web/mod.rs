pub mod admin;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use middleware::resolve_actor;
pub use rest::ApiDoc;
pub use state::AppState;

/// Builds the complete application: public routes, protected routes behind
/// [`resolve_actor`], and the Swagger UI.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no credentials required)
    let public_routes = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/slots", get(rest::list_slots_handler))
        .route("/availability", get(rest::list_availability_handler));

    // Protected routes (admin token or student id required)
    let protected_routes = Router::new()
        .route("/bookings", post(rest::create_booking_handler))
        .route("/bookings/{id}/cancel", post(rest::cancel_booking_handler))
        .route("/admin/bookings", post(admin::admin_book_handler))
        .route(
            "/admin/bookings/{id}",
            delete(admin::delete_booking_handler),
        )
        .route(
            "/admin/bookings/{id}/complete",
            post(admin::complete_booking_handler),
        )
        .route(
            "/admin/bookings/{id}/time",
            put(admin::reschedule_booking_handler),
        )
        .route(
            "/admin/bookings/{id}/notes",
            put(admin::update_notes_handler),
        )
        .route(
            "/admin/students",
            post(admin::create_student_handler).get(admin::list_students_handler),
        )
        .route("/admin/students/{id}", get(admin::student_details_handler))
        .route(
            "/admin/students/{id}/credits",
            post(admin::add_credits_handler),
        )
        .route(
            "/admin/students/{id}/duration",
            put(admin::update_duration_handler),
        )
        .route(
            "/admin/students/{id}/backfill",
            post(admin::backfill_handler),
        )
        .route("/admin/availability", post(admin::create_window_handler))
        .route(
            "/admin/availability/recurring",
            post(admin::recurring_windows_handler),
        )
        .route(
            "/admin/availability/{id}",
            delete(admin::delete_window_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            resolve_actor,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static(middleware::STUDENT_ID_HEADER),
        ]);

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    // Merge the API router with the Swagger UI router for a complete application.
    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
