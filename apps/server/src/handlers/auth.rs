use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::auth;
use crate::models::{ApiResponse, AuthStatusResponse, VerifyAdminRequest};
use crate::AppState;

/// POST /api/auth/verify-admin — password check; on success a signed
/// session token is set as an HttpOnly cookie.
pub async fn verify_admin(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyAdminRequest>,
) -> Response {
    if state.admin_password.is_empty() || body.password != state.admin_password {
        tracing::warn!("rejected admin password attempt");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error("Invalid password")),
        )
            .into_response();
    }

    let token = auth::issue_token(&state.session_secret, chrono::Utc::now().timestamp());
    (
        StatusCode::OK,
        [(header::SET_COOKIE, auth::session_cookie(&token))],
        Json(ApiResponse::success(AuthStatusResponse {
            is_authenticated: true,
        })),
    )
        .into_response()
}

/// GET /api/auth/check-auth — does the request carry a live session?
pub async fn check_auth(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let now = chrono::Utc::now().timestamp();
    if auth::is_authorized(&headers, &state.session_secret, now) {
        Json(ApiResponse::success(AuthStatusResponse {
            is_authenticated: true,
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::success(AuthStatusResponse {
                is_authenticated: false,
            })),
        )
            .into_response()
    }
}
