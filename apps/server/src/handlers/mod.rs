pub mod auth;
pub mod content;
pub mod health;
pub mod reservations;
pub mod settings;

use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::AppState;

/// Guard for admin-only writes: a valid session cookie or nothing.
pub(crate) fn require_admin(headers: &HeaderMap, state: &AppState) -> Result<(), ApiError> {
    let now = chrono::Utc::now().timestamp();
    if crate::auth::is_authorized(headers, &state.session_secret, now) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}
