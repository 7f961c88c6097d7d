//! External calendar access. The calendar is the source of truth for booked
//! slots, so the gateway talks to it through the `CalendarApi` trait and the
//! production implementation is a thin HTTP client over the Google Calendar
//! v3 REST endpoints.

use chrono::{DateTime, Duration, FixedOffset};
use serde::Deserialize;
use std::future::Future;

use crate::error::ApiError;
use crate::kst::kst;

/// Fixed length of a training session.
pub const SESSION_MINUTES: i64 = 50;

#[derive(Debug, Clone)]
pub enum EventTime {
    /// Date-only event; blocks the whole day.
    AllDay,
    At(DateTime<FixedOffset>),
}

#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
}

impl CalendarEvent {
    pub fn start_time(&self) -> Option<DateTime<FixedOffset>> {
        match self.start {
            EventTime::At(dt) => Some(dt),
            EventTime::AllDay => None,
        }
    }
}

/// What the gateway writes: a reservation event with a fixed duration.
#[derive(Debug, Clone)]
pub struct EventPayload {
    pub summary: String,
    pub description: String,
    pub start: DateTime<FixedOffset>,
}

impl EventPayload {
    pub fn end(&self) -> DateTime<FixedOffset> {
        self.start + Duration::minutes(SESSION_MINUTES)
    }
}

pub trait CalendarApi: Send + Sync {
    fn list_events(
        &self,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> impl Future<Output = Result<Vec<CalendarEvent>, ApiError>> + Send;

    fn get_event(
        &self,
        event_id: &str,
    ) -> impl Future<Output = Result<CalendarEvent, ApiError>> + Send;

    fn insert_event(
        &self,
        payload: &EventPayload,
    ) -> impl Future<Output = Result<CalendarEvent, ApiError>> + Send;

    fn update_event(
        &self,
        event_id: &str,
        payload: &EventPayload,
    ) -> impl Future<Output = Result<CalendarEvent, ApiError>> + Send;
}

// ── Google Calendar client ──

pub struct GoogleCalendarClient {
    http: reqwest::Client,
    calendar_id: String,
    token: String,
}

const CALENDAR_BASE: &str = "https://www.googleapis.com/calendar/v3/calendars";

impl GoogleCalendarClient {
    pub fn new(calendar_id: String, token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            calendar_id,
            token,
        }
    }

    fn events_url(&self) -> String {
        format!("{}/{}/events", CALENDAR_BASE, self.calendar_id)
    }

    fn event_body(payload: &EventPayload) -> serde_json::Value {
        serde_json::json!({
            "summary": payload.summary,
            "description": payload.description,
            "start": {
                "dateTime": payload.start.to_rfc3339(),
                "timeZone": "Asia/Seoul",
            },
            "end": {
                "dateTime": payload.end().to_rfc3339(),
                "timeZone": "Asia/Seoul",
            },
            "reminders": {
                "useDefault": false,
                "overrides": [
                    {"method": "email", "minutes": 60},
                    {"method": "popup", "minutes": 30},
                ],
            },
        })
    }
}

impl CalendarApi for GoogleCalendarClient {
    async fn list_events(
        &self,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Result<Vec<CalendarEvent>, ApiError> {
        let response = self
            .http
            .get(self.events_url())
            .bearer_auth(&self.token)
            .query(&[
                ("timeMin", from.to_rfc3339()),
                ("timeMax", to.to_rfc3339()),
                ("singleEvents", "true".into()),
                ("orderBy", "startTime".into()),
                ("timeZone", "Asia/Seoul".into()),
            ])
            .send()
            .await
            .map_err(|e| ApiError::external(format!("calendar list failed: {e}")))?;

        let response = check_status(response, "calendar list").await?;
        let body: WireEventList = response
            .json()
            .await
            .map_err(|e| ApiError::external(format!("calendar list decode failed: {e}")))?;
        Ok(body.items.into_iter().filter_map(WireEvent::into_event).collect())
    }

    async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, ApiError> {
        let response = self
            .http
            .get(format!("{}/{}", self.events_url(), event_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::external(format!("calendar get failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::not_found("Reservation not found in the calendar"));
        }
        let response = check_status(response, "calendar get").await?;
        let wire: WireEvent = response
            .json()
            .await
            .map_err(|e| ApiError::external(format!("calendar get decode failed: {e}")))?;
        wire.into_event()
            .ok_or_else(|| ApiError::external("calendar returned an event without times"))
    }

    async fn insert_event(&self, payload: &EventPayload) -> Result<CalendarEvent, ApiError> {
        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(&self.token)
            .json(&Self::event_body(payload))
            .send()
            .await
            .map_err(|e| ApiError::external(format!("calendar insert failed: {e}")))?;

        let response = check_status(response, "calendar insert").await?;
        let wire: WireEvent = response
            .json()
            .await
            .map_err(|e| ApiError::external(format!("calendar insert decode failed: {e}")))?;
        wire.into_event()
            .ok_or_else(|| ApiError::external("calendar returned an event without times"))
    }

    async fn update_event(
        &self,
        event_id: &str,
        payload: &EventPayload,
    ) -> Result<CalendarEvent, ApiError> {
        let response = self
            .http
            .put(format!("{}/{}", self.events_url(), event_id))
            .bearer_auth(&self.token)
            .json(&Self::event_body(payload))
            .send()
            .await
            .map_err(|e| ApiError::external(format!("calendar update failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::not_found("Reservation not found in the calendar"));
        }
        let response = check_status(response, "calendar update").await?;
        let wire: WireEvent = response
            .json()
            .await
            .map_err(|e| ApiError::external(format!("calendar update decode failed: {e}")))?;
        wire.into_event()
            .ok_or_else(|| ApiError::external("calendar returned an event without times"))
    }
}

async fn check_status(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!("{context}: HTTP {status}: {body}");
    Err(ApiError::external(format!("{context}: HTTP {status}")))
}

// ── Wire types ──

#[derive(Debug, Deserialize)]
struct WireEventList {
    #[serde(default)]
    items: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    start: Option<WireEventTime>,
    end: Option<WireEventTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEventTime {
    date: Option<String>,
    date_time: Option<String>,
}

impl WireEventTime {
    fn into_event_time(self) -> Option<EventTime> {
        if self.date.is_some() {
            return Some(EventTime::AllDay);
        }
        let raw = self.date_time?;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|dt| EventTime::At(dt.with_timezone(&kst())))
    }
}

impl WireEvent {
    fn into_event(self) -> Option<CalendarEvent> {
        let start = self.start?.into_event_time()?;
        let end = self.end?.into_event_time()?;
        Some(CalendarEvent {
            id: self.id,
            summary: self.summary.unwrap_or_default(),
            start,
            end,
        })
    }
}

// ── Tests ──
