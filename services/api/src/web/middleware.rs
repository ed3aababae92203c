//! services/api/src/web/middleware.rs
//!
//! Resolves who is calling before a protected handler runs.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use booking_core::domain::AuthContext;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

/// Header carrying the acting student's id.
pub const STUDENT_ID_HEADER: &str = "x-student-id";

/// Middleware that turns request credentials into an [`AuthContext`].
///
/// `Authorization: Bearer <ADMIN_TOKEN>` acts as the admin; otherwise the
/// `x-student-id` header names the acting student. Anything else is rejected
/// with 401. The context is inserted into request extensions for handlers.
pub async fn resolve_actor(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = actor_from_headers(req.headers(), &state.config.admin_token)?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

fn actor_from_headers(headers: &HeaderMap, admin_token: &str) -> Result<AuthContext, ApiError> {
    // 1. Admin bearer token
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Unauthorized("malformed Authorization header".to_string()))?;
        if token != admin_token {
            debug!("Rejected request with an unknown bearer token");
            return Err(ApiError::Unauthorized("invalid token".to_string()));
        }
        return Ok(AuthContext::admin());
    }

    // 2. Student identity
    let raw = headers
        .get(STUDENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("credentials required".to_string()))?;
    let student_id = Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::Unauthorized(format!("invalid {} header", STUDENT_ID_HEADER)))?;
    Ok(AuthContext::student(student_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_must_match_exactly() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(actor_from_headers(&headers, "s3cret").unwrap().is_admin());
        assert!(actor_from_headers(&headers, "other").is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic s3cret"));
        assert!(actor_from_headers(&headers, "s3cret").is_err());
    }

    #[test]
    fn student_header_identifies_student() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            STUDENT_ID_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        let ctx = actor_from_headers(&headers, "s3cret").unwrap();
        assert!(ctx.can_act_for(id));
        assert!(!ctx.is_admin());

        assert!(actor_from_headers(&HeaderMap::new(), "s3cret").is_err());
    }
}
