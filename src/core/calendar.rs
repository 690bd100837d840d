//! Calendar arithmetic for bookings, leave resolution and the monthly ledger.
//!
//! Everything is computed in UTC. "End of month" means the last millisecond of the
//! month, matching how end dates are stored on bookings.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Parses a caller-supplied date: an RFC 3339 instant, a naive `YYYY-MM-DDTHH:MM:SS`
/// (read as UTC) or a plain `YYYY-MM-DD` (midnight UTC).
#[must_use]
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Number of days charged for `[start, end)`: partial days round up, minimum one.
#[must_use]
pub fn billable_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let millis = (end - start).num_milliseconds();
    if millis <= 0 {
        return 1;
    }
    ((millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY).max(1)
}

/// Midnight at the start of the UTC day containing `instant`.
#[must_use]
pub fn start_of_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map_or(instant, |naive| naive.and_utc())
}

/// A calendar month in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthPeriod {
    /// Calendar year
    pub year: i32,
    /// Month, 1 through 12
    pub month: u32,
}

impl MonthPeriod {
    /// The month containing `instant`.
    #[must_use]
    pub fn containing(instant: DateTime<Utc>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
        }
    }

    /// The month before this one.
    #[must_use]
    pub const fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// The month after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First instant of the month.
    #[must_use]
    pub fn start(self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Last millisecond of the month.
    #[must_use]
    pub fn end(self) -> DateTime<Utc> {
        self.next().start() - Duration::milliseconds(1)
    }

    /// Whether `[start, end]` shares at least one instant with this month.
    #[must_use]
    pub fn overlaps(self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end() && end >= self.start()
    }

    /// `YYYY-MM` label used for run markers and messages.
    #[must_use]
    pub fn key(self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

/// Last millisecond of the month containing `instant`.
#[must_use]
pub fn end_of_month(instant: DateTime<Utc>) -> DateTime<Utc> {
    MonthPeriod::containing(instant).end()
}

/// Last millisecond of the month after the one containing `instant`.
#[must_use]
pub fn end_of_next_month(instant: DateTime<Utc>) -> DateTime<Utc> {
    MonthPeriod::containing(instant).next().end()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        parse_instant(raw).unwrap()
    }

    #[test]
    fn test_parse_accepted_formats() {
        assert_eq!(at("2024-01-10"), at("2024-01-10T00:00:00Z"));
        assert_eq!(at("2024-01-10T12:30:00"), at("2024-01-10T12:30:00+00:00"));
        assert_eq!(at("2024-01-10T12:30:00+02:00"), at("2024-01-10T10:30:00Z"));
        assert!(parse_instant("not a date").is_none());
        assert!(parse_instant("2024-02-30").is_none());
        assert!(parse_instant("   ").is_none());
    }

    #[test]
    fn test_billable_days_rounds_up() {
        assert_eq!(billable_days(at("2024-01-10"), at("2024-01-12")), 2);
        assert_eq!(
            billable_days(at("2024-01-10"), at("2024-01-12T00:00:01Z")),
            3
        );
        assert_eq!(billable_days(at("2024-01-10"), at("2024-01-10T01:00:00Z")), 1);
        assert_eq!(billable_days(at("2024-01-10"), at("2024-01-09")), 1);
    }

    #[test]
    fn test_end_of_month_is_last_millisecond() {
        let end = end_of_month(at("2024-01-15T09:00:00Z"));
        assert_eq!(end.to_rfc3339(), "2024-01-31T23:59:59.999+00:00");

        let leap = end_of_month(at("2024-02-03"));
        assert_eq!(leap.date_naive(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_end_of_next_month_crosses_year() {
        let end = end_of_next_month(at("2024-12-20"));
        assert_eq!(end.to_rfc3339(), "2025-01-31T23:59:59.999+00:00");
    }

    #[test]
    fn test_previous_month_wraps_year() {
        let period = MonthPeriod::containing(at("2024-01-05")).previous();
        assert_eq!(period, MonthPeriod { year: 2023, month: 12 });
        assert_eq!(period.key(), "2023-12");
        assert_eq!(period.start(), at("2023-12-01"));
    }

    #[test]
    fn test_overlap_is_inclusive() {
        let jan = MonthPeriod { year: 2024, month: 1 };
        assert!(jan.overlaps(at("2023-12-20"), at("2024-01-01")));
        assert!(jan.overlaps(at("2024-01-31T23:59:59.999Z"), at("2024-03-01")));
        assert!(!jan.overlaps(at("2024-02-01"), at("2024-03-01")));
        assert!(!jan.overlaps(at("2023-11-01"), at("2023-12-31")));
    }
}
