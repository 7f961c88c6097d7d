use axum::{extract::State, http::HeaderMap, Json};
use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::ApiResponse;
use crate::AppState;

/// GET /api/intro-content — landing page content. A missing file is an
/// empty document, not an error, so a fresh deploy renders.
pub async fn get_content(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let content = match fs::read_to_string(&state.content_path) {
        Ok(raw) => serde_json::from_str(&raw)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("content file corrupt: {e}")))?,
        Err(e) if e.kind() == ErrorKind::NotFound => serde_json::json!({}),
        Err(e) => return Err(ApiError::Internal(e.into())),
    };
    Ok(Json(ApiResponse::success(content)))
}

/// POST /api/intro-content — replace the landing page content, admin only.
pub async fn save_content(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(content): Json<serde_json::Value>,
) -> Result<Json<ApiResponse<&'static str>>, ApiError> {
    super::require_admin(&headers, &state)?;

    if let Some(dir) = state.content_path.parent() {
        fs::create_dir_all(dir).map_err(|e| ApiError::Internal(e.into()))?;
    }
    let pretty = serde_json::to_string_pretty(&content)
        .map_err(|e| ApiError::Internal(e.into()))?;
    fs::write(&state.content_path, pretty).map_err(|e| ApiError::Internal(e.into()))?;

    Ok(Json(ApiResponse::success("Content saved")))
}
