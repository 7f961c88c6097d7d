use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};
use std::fmt;

/// Seoul timezone offset (UTC+9). Every date/hour decision in the booking
/// flow happens in this frame, regardless of the server's local timezone.
const KST_OFFSET_SECS: i32 = 9 * 3600;

/// The fixed KST offset.
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).unwrap()
}

/// Current wall-clock time in KST.
pub fn now_kst() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&kst())
}

/// A calendar day in the KST reference frame.
///
/// Equality and ordering are day-granularity by construction: two instants
/// are "the same day" iff they fall on the same KST calendar date. This is
/// the only place dates are compared anywhere in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KstDay(NaiveDate);

impl KstDay {
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self(dt.with_timezone(&kst()).date_naive())
    }

    /// Parse a wire date: either a bare `YYYY-MM-DD` (taken as that KST
    /// calendar day) or an RFC 3339 timestamp (converted to KST first).
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Some(Self(date));
        }
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| Self::from_datetime(&dt))
    }

    pub fn weekday(&self) -> Weekday {
        self.0.weekday()
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Whole days from `self` to `other` (negative if `other` is earlier).
    pub fn days_until(&self, other: KstDay) -> i64 {
        (other.0 - self.0).num_days()
    }

    /// The day's full range in KST, 00:00:00 through 23:59:59.
    pub fn bounds(&self) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
        let start = kst()
            .from_local_datetime(&self.0.and_hms_opt(0, 0, 0).unwrap())
            .unwrap();
        let end = kst()
            .from_local_datetime(&self.0.and_hms_opt(23, 59, 59).unwrap())
            .unwrap();
        (start, end)
    }
}

impl fmt::Display for KstDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

// ── Tests ──
