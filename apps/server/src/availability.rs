//! Pure availability rules: which dates are selectable and which hours a
//! date offers. No I/O — callers load the settings document and pass the
//! current KST time in, which keeps every rule unit-testable.

use chrono::{DateTime, FixedOffset, Timelike};

use crate::kst::KstDay;
use crate::models::{AvailabilitySettings, HourRange};

/// Classification of a date for hour-range selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayKind {
    Weekday,
    Weekend,
    Holiday,
}

/// Resolve the day kind. Holiday classification wins over weekend: a
/// Saturday listed as a holiday uses holiday hours.
pub fn day_kind(settings: &AvailabilitySettings, day: KstDay) -> DayKind {
    if settings.holiday_days().contains(&day) {
        DayKind::Holiday
    } else if day.is_weekend() {
        DayKind::Weekend
    } else {
        DayKind::Weekday
    }
}

fn hour_range(settings: &AvailabilitySettings, kind: DayKind) -> HourRange {
    match kind {
        DayKind::Weekday => settings.available_hours.weekday,
        DayKind::Weekend => settings.available_hours.weekend,
        DayKind::Holiday => settings.available_hours.holiday,
    }
}

/// Whether `day` may be booked at all, given the current time.
///
/// Fail closed: no reservation period configured means no date is
/// selectable. Past days are never selectable; the current day only when
/// the same-day policy allows it.
pub fn is_date_selectable(
    settings: &AvailabilitySettings,
    day: KstDay,
    now: DateTime<FixedOffset>,
) -> bool {
    let Some((start, end)) = settings.period_range() else {
        return false;
    };
    if day < start || day > end {
        return false;
    }
    if settings.disabled_days().contains(&day) {
        return false;
    }

    let today = KstDay::from_datetime(&now);
    if day < today {
        return false;
    }
    if day == today && !settings.available_hours.same_day.enabled {
        return false;
    }
    true
}

/// All hours offerable on `day`, ascending. Empty when the date is not
/// selectable. The same-day floor excludes hours less than
/// `now.hour + minHoursAfter`; on any other day the full range applies.
///
/// Hours already booked in the calendar are *not* removed here — the
/// handler layer flags them so the UI can show them as taken.
pub fn offerable_hours(
    settings: &AvailabilitySettings,
    day: KstDay,
    now: DateTime<FixedOffset>,
) -> Vec<u32> {
    if !is_date_selectable(settings, day, now) {
        return Vec::new();
    }

    let range = hour_range(settings, day_kind(settings, day));
    let today = KstDay::from_datetime(&now);
    let floor = if day == today && settings.available_hours.same_day.enabled {
        now.hour() + settings.available_hours.same_day.min_hours_after
    } else {
        0
    };

    (range.start..=range.end).filter(|h| *h >= floor).collect()
}

// ── Tests ──
