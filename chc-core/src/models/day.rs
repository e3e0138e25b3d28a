//! Calendar-day filters
//!
//! Listing endpoints take `date=YYYY-MM-DD`. The day is interpreted in the
//! configured timezone and turned into a half-open UTC range.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use super::ValidationError;

/// Parse a `YYYY-MM-DD` query value.
pub fn parse_day(s: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::rule("Invalid date format. Use YYYY-MM-DD"))
}

/// Half-open `[start, end)` range in UTC covering one local day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBounds {
    pub day: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayBounds {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Compute the UTC bounds of `day` in `tz`.
pub fn day_bounds(day: NaiveDate, tz: Tz) -> DayBounds {
    let next = day.succ_opt().unwrap_or(NaiveDate::MAX);
    DayBounds {
        day,
        start: local_midnight(day, tz),
        end: local_midnight(next, tz),
    }
}

/// Local calendar day of a UTC instant.
pub fn local_day(ts: DateTime<Utc>, tz: Tz) -> NaiveDate {
    ts.with_timezone(&tz).date_naive()
}

fn local_midnight(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    // Zones that skip midnight on DST change start the day an hour later.
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_day() {
        let d = parse_day("2025-03-14").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
    }

    #[test]
    fn rejects_other_formats() {
        for bad in ["14-03-2025", "2025/03/14", "", "2025-02-30"] {
            let err = parse_day(bad).unwrap_err();
            assert_eq!(err.to_string(), "Invalid date format. Use YYYY-MM-DD");
        }
    }

    #[test]
    fn utc_bounds_are_midnight_to_midnight() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let b = day_bounds(day, Tz::UTC);
        assert_eq!(b.start.to_rfc3339(), "2025-03-14T00:00:00+00:00");
        assert_eq!(b.end.to_rfc3339(), "2025-03-15T00:00:00+00:00");
        assert!(b.contains(b.start));
        assert!(!b.contains(b.end));
    }

    #[test]
    fn kolkata_day_starts_previous_utc_evening() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let b = day_bounds(day, chrono_tz::Asia::Kolkata);
        assert_eq!(b.start.to_rfc3339(), "2025-03-13T18:30:00+00:00");
        assert_eq!(local_day(b.start, chrono_tz::Asia::Kolkata), day);
    }
}
