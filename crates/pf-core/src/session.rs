//! Venue-local calendar and time-of-day.
//!
//! Every rule that talks about "today" or "09:30" means the exchange's wall
//! clock, not UTC. `VenueClock` converts a UTC instant into that frame:
//! - Daily-loss and consistency rules bucket by venue date
//! - Blackout windows compare venue time-of-day
//! - Streak analysis groups by venue date and ISO week
//!
//! The clock never reads the system time itself; callers pass `now`.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Timezone wrapper for venue-local conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueClock {
    tz: Tz,
}

impl Default for VenueClock {
    /// CME equity-index and metals/energy micros settle on New York time.
    fn default() -> Self {
        Self {
            tz: chrono_tz::America::New_York,
        }
    }
}

impl VenueClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Parse an IANA zone name, e.g. `America/Chicago`.
    pub fn from_name(name: &str) -> Option<Self> {
        name.parse::<Tz>().ok().map(Self::new)
    }

    #[inline]
    pub fn tz(&self) -> Tz {
        self.tz
    }

    #[inline]
    pub fn local(&self, at: DateTime<Utc>) -> DateTime<Tz> {
        at.with_timezone(&self.tz)
    }

    /// Calendar date at the venue.
    #[must_use]
    pub fn venue_date(&self, at: DateTime<Utc>) -> NaiveDate {
        self.local(at).date_naive()
    }

    /// Time of day at the venue.
    #[must_use]
    pub fn venue_time(&self, at: DateTime<Utc>) -> NaiveTime {
        self.local(at).time()
    }

    /// ISO (year, week) at the venue.
    #[must_use]
    pub fn iso_week(&self, at: DateTime<Utc>) -> (i32, u32) {
        let week = self.venue_date(at).iso_week();
        (week.year(), week.week())
    }

    /// Whole venue-calendar days between two instants (`to - from`).
    #[must_use]
    pub fn days_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
        (self.venue_date(to) - self.venue_date(from)).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(year: i32, month: u32, day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, 0).unwrap()
    }

    #[test]
    fn test_venue_date_lags_utc_in_evening() {
        let clock = VenueClock::default();
        // 2025-03-04 02:00 UTC is 2025-03-03 21:00 in New York (EST)
        let at = utc(2025, 3, 4, 2, 0);
        assert_eq!(
            clock.venue_date(at),
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
        );
        assert_eq!(clock.venue_time(at), NaiveTime::from_hms_opt(21, 0, 0).unwrap());
    }

    #[test]
    fn test_dst_shift() {
        let clock = VenueClock::default();
        // July: EDT, UTC-4
        let at = utc(2025, 7, 1, 13, 30);
        assert_eq!(clock.venue_time(at), NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    }

    #[test]
    fn test_iso_week_and_days_between() {
        let clock = VenueClock::default();
        // Monday 2025-03-03 and Sunday 2025-03-09 share ISO week 10
        let mon = utc(2025, 3, 3, 15, 0);
        let sun = utc(2025, 3, 9, 15, 0);
        assert_eq!(clock.iso_week(mon), (2025, 10));
        assert_eq!(clock.iso_week(sun), (2025, 10));
        assert_eq!(clock.days_between(mon, sun), 6);
    }

    #[test]
    fn test_from_name() {
        assert!(VenueClock::from_name("America/Chicago").is_some());
        assert!(VenueClock::from_name("Mars/Olympus").is_none());
    }
}
