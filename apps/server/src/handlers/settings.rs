use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

use crate::error::ApiError;
use crate::kst::{now_kst, KstDay};
use crate::models::{ApiResponse, AvailabilitySettings};
use crate::notify;
use crate::AppState;

/// GET /api/settings — the full availability document.
///
/// Reading the settings is also where approaching period expiry is
/// noticed; the warning goes out fire-and-forget so the read never waits
/// on Telegram.
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<AvailabilitySettings>>, ApiError> {
    let settings = state.settings.load().map_err(ApiError::Internal)?;

    let today = KstDay::from_datetime(&now_kst());
    if let Some(warning) = notify::period_expiry_notice(&settings, today) {
        let state = state.clone();
        tokio::spawn(async move {
            state.notifier.send(&warning).await;
        });
    }

    Ok(Json(ApiResponse::success(settings)))
}

/// POST /api/settings — full replacement of the document, admin only.
/// 423 when another save holds the lock; validation errors verbatim.
pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(new_settings): Json<AvailabilitySettings>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    super::require_admin(&headers, &state)?;

    state.settings.save(&new_settings)?;
    tracing::info!("settings saved");
    Ok(Json(ApiResponse::success("Settings saved")))
}
