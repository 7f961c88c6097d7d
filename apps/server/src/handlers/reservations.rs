use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::DateTime;
use std::sync::Arc;

use crate::availability;
use crate::error::ApiError;
use crate::gateway::Member;
use crate::kst::{kst, now_kst, KstDay};
use crate::models::{
    ApiResponse, AvailableTimesQuery, AvailableTimesResponse, BookedTimesResponse,
    CreateReservationRequest, HourSlot, ReservationsQuery, RescheduleReservationRequest,
};
use crate::notify;
use crate::AppState;

fn parse_reservation_time(raw: &str) -> Result<chrono::DateTime<chrono::FixedOffset>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&kst()))
        .map_err(|_| ApiError::validation("Invalid reservation time"))
}

/// POST /api/reservations — commit a booking.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateReservationRequest>,
) -> Result<Json<ApiResponse<crate::models::ReservationSummary>>, ApiError> {
    let member = Member::parse(&body.member_name, &body.member_id)?;
    let start = parse_reservation_time(&body.date_time)?;

    let settings = state.settings.load().map_err(ApiError::Internal)?;
    let reservation = state
        .gateway
        .create(&settings, start, &member, now_kst())
        .await?;

    let message = notify::booking_created_message(&reservation);
    let notify_state = state.clone();
    tokio::spawn(async move {
        notify_state.notifier.send(&message).await;
    });

    Ok(Json(ApiResponse::success(reservation)))
}

/// PUT /api/reservations — move an existing booking.
pub async fn reschedule(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RescheduleReservationRequest>,
) -> Result<Json<ApiResponse<crate::models::ReservationSummary>>, ApiError> {
    let member = Member::parse(&body.member_name, &body.member_id)?;
    let new_start = parse_reservation_time(&body.date_time)?;

    let moved = state
        .gateway
        .reschedule(&body.event_id, new_start, &member, now_kst())
        .await?;

    let message = notify::booking_rescheduled_message(&moved);
    let notify_state = state.clone();
    tokio::spawn(async move {
        notify_state.notifier.send(&message).await;
    });

    Ok(Json(ApiResponse::success(moved.reservation)))
}

/// GET /api/reservations?date=YYYY-MM-DD — hours already taken that day.
/// GET /api/reservations?memberId=… — the member's upcoming reservations.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReservationsQuery>,
) -> Result<Response, ApiError> {
    if let Some(member_id) = query.member_id.as_deref() {
        let reservations = state
            .gateway
            .member_reservations(member_id, now_kst())
            .await?;
        return Ok(Json(ApiResponse::success(reservations)).into_response());
    }

    if let Some(date) = query.date.as_deref() {
        let day = KstDay::parse(date)
            .ok_or_else(|| ApiError::validation(format!("Invalid date: {date}")))?;
        let booked = state.gateway.booked_hours(day).await?;
        return Ok(Json(ApiResponse::success(BookedTimesResponse {
            booked_times: booked.into_iter().collect(),
        }))
        .into_response());
    }

    Err(ApiError::validation(
        "Either date or memberId query parameter is required",
    ))
}

/// GET /api/available-times?date=YYYY-MM-DD — offerable hours with booked
/// flags, so the page can show taken slots as disabled rather than absent.
pub async fn available_times(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailableTimesQuery>,
) -> Result<Json<ApiResponse<AvailableTimesResponse>>, ApiError> {
    let day = KstDay::parse(&query.date)
        .ok_or_else(|| ApiError::validation(format!("Invalid date: {}", query.date)))?;

    let settings = state.settings.load().map_err(ApiError::Internal)?;
    let hours = availability::offerable_hours(&settings, day, now_kst());

    let booked = if hours.is_empty() {
        Default::default()
    } else {
        state.gateway.booked_hours(day).await?
    };

    Ok(Json(ApiResponse::success(AvailableTimesResponse {
        hours: hours
            .into_iter()
            .map(|hour| HourSlot {
                hour,
                booked: booked.contains(&hour),
            })
            .collect(),
        notice: settings.available_hours.notice.clone(),
    })))
}
