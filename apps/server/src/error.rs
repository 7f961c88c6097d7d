use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

use crate::models::ApiResponse;

/// Failure taxonomy for the booking flow. Every variant maps to a client
/// status; none is fatal to the process.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed settings or booking input. Rejected before any external
    /// call; the message is surfaced verbatim.
    #[error("{0}")]
    Validation(String),

    /// The settings lock is held by another request. Retry later.
    #[error("Settings are being saved by another request. Try again shortly.")]
    ResourceBusy,

    /// The slot was taken between display and commit. Re-select.
    #[error("That time was just booked. Please pick another slot.")]
    Conflict,

    #[error("{0}")]
    NotFound(String),

    /// Settings/content writes require a valid admin session.
    #[error("Authentication required")]
    Unauthorized,

    /// A calendar/spreadsheet call failed. Partial commits are logged at
    /// the call site, not reconciled here.
    #[error("External service error: {0}")]
    External(String),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::External(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::ResourceBusy => StatusCode::LOCKED,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::External(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if let ApiError::Internal(err) = &self {
            tracing::error!("internal error: {:#}", err);
        }
        let status = self.status();
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

// ── Tests ──
