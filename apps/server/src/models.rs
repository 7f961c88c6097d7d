use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::kst::KstDay;

// ── Settings document ──

/// The availability-settings document. Field names mirror the JSON the
/// admin UI reads and writes (`disabledDates`, `availableHours`, ...), so
/// the document round-trips through serde unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySettings {
    pub disabled_dates: Vec<String>,
    pub holidays: Vec<String>,
    pub available_hours: AvailableHours,
    pub reservation_period: Option<ReservationPeriod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableHours {
    pub weekday: HourRange,
    pub weekend: HourRange,
    pub holiday: HourRange,
    pub same_day: SameDayPolicy,
    pub notice: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HourRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SameDayPolicy {
    pub enabled: bool,
    pub min_hours_after: u32,
}

/// Inclusive booking window. Nullable on the wire: an unset or half-set
/// period means nothing is bookable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationPeriod {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl AvailabilitySettings {
    /// Seed document written on first load.
    pub fn seed() -> Self {
        Self {
            disabled_dates: Vec::new(),
            holidays: Vec::new(),
            available_hours: AvailableHours {
                weekday: HourRange { start: 14, end: 22 },
                weekend: HourRange { start: 10, end: 17 },
                holiday: HourRange { start: 10, end: 17 },
                same_day: SameDayPolicy {
                    enabled: true,
                    min_hours_after: 2,
                },
                notice: "* Booking hours\nWeekdays 2pm - 10pm\nWeekends 10am - 5pm".into(),
            },
            reservation_period: None,
        }
    }

    pub fn disabled_days(&self) -> HashSet<KstDay> {
        self.disabled_dates
            .iter()
            .filter_map(|s| KstDay::parse(s))
            .collect()
    }

    pub fn holiday_days(&self) -> HashSet<KstDay> {
        self.holidays.iter().filter_map(|s| KstDay::parse(s)).collect()
    }

    /// The effective booking window, or None when the period is unset,
    /// half-set, or unparseable (all of which mean "nothing bookable").
    pub fn period_range(&self) -> Option<(KstDay, KstDay)> {
        let period = self.reservation_period.as_ref()?;
        let start = KstDay::parse(period.start_date.as_deref()?)?;
        let end = KstDay::parse(period.end_date.as_deref()?)?;
        Some((start, end))
    }
}

// ── API request/response types ──

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    pub date_time: String,
    pub member_name: String,
    pub member_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleReservationRequest {
    pub event_id: String,
    pub date_time: String,
    pub member_name: String,
    pub member_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationsQuery {
    pub date: Option<String>,
    pub member_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailableTimesQuery {
    pub date: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedTimesResponse {
    pub booked_times: Vec<u32>,
}

/// One offerable hour on a date. Booked hours stay in the list, flagged,
/// so the UI can render them disabled rather than absent.
#[derive(Debug, Serialize)]
pub struct HourSlot {
    pub hour: u32,
    pub booked: bool,
}

#[derive(Debug, Serialize)]
pub struct AvailableTimesResponse {
    pub hours: Vec<HourSlot>,
    pub notice: String,
}

/// A committed reservation as returned to the booking client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationSummary {
    pub date: String,
    pub time: String,
    pub member_name: String,
    pub member_id: String,
    pub event_id: String,
}

/// One row of a member's upcoming reservations. Serialized as an ordered
/// tuple `[date, time, memberId, name, eventId, changeHistory]` — the
/// contract the reservation page consumes.
#[derive(Debug, Clone, Serialize)]
pub struct MemberReservation(
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub Option<String>,
);

#[derive(Debug, Deserialize)]
pub struct VerifyAdminRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatusResponse {
    pub is_authenticated: bool,
}

// ── Response envelope ──

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_wire_contract_round_trip() {
        let json = r#"{
            "disabledDates": ["2026-08-15"],
            "holidays": ["2026-09-25"],
            "availableHours": {
                "weekday": {"start": 14, "end": 22},
                "weekend": {"start": 10, "end": 17},
                "holiday": {"start": 10, "end": 17},
                "sameDay": {"enabled": true, "minHoursAfter": 2},
                "notice": "hello"
            },
            "reservationPeriod": {"startDate": "2026-08-01", "endDate": "2026-08-31"}
        }"#;
        let settings: AvailabilitySettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.available_hours.same_day.min_hours_after, 2);

        let back = serde_json::to_value(&settings).unwrap();
        assert_eq!(back["availableHours"]["sameDay"]["minHoursAfter"], 2);
        assert_eq!(back["disabledDates"][0], "2026-08-15");
        assert_eq!(back["reservationPeriod"]["startDate"], "2026-08-01");
    }

    #[test]
    fn test_period_range_absent() {
        let settings = AvailabilitySettings::seed();
        assert!(settings.period_range().is_none());
    }

    #[test]
    fn test_period_range_half_set() {
        let mut settings = AvailabilitySettings::seed();
        settings.reservation_period = Some(ReservationPeriod {
            start_date: Some("2026-08-01".into()),
            end_date: None,
        });
        assert!(settings.period_range().is_none());
    }

    #[test]
    fn test_period_range_present() {
        let mut settings = AvailabilitySettings::seed();
        settings.reservation_period = Some(ReservationPeriod {
            start_date: Some("2026-08-01".into()),
            end_date: Some("2026-08-31".into()),
        });
        let (start, end) = settings.period_range().unwrap();
        assert!(start < end);
    }

    #[test]
    fn test_member_reservation_serializes_as_tuple() {
        let row = MemberReservation(
            "2026-08-20".into(),
            "15:00".into(),
            "01012345678".into(),
            "Jane".into(),
            "evt1".into(),
            None,
        );
        let v = serde_json::to_value(&row).unwrap();
        assert!(v.is_array());
        assert_eq!(v[0], "2026-08-20");
        assert_eq!(v[4], "evt1");
    }
}
