// src/models/window.rs

//! Lookback windows for "new adoption" queries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};

use crate::error::{AppError, Result};

/// A lookback window: `thisweek`, `Nh`, `Nd` or `Nw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Window {
    /// Since Monday 00:00 UTC of the current week
    #[default]
    ThisWeek,
    Hours(u32),
    Days(u32),
    Weeks(u32),
}

impl Window {
    /// Start of the window relative to `now`.
    ///
    /// Fails when the window reaches past the representable date range.
    pub fn since(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let span = match *self {
            Window::ThisWeek => return Ok(start_of_week(now)),
            Window::Hours(n) => Duration::try_hours(i64::from(n)),
            Window::Days(n) => Duration::try_days(i64::from(n)),
            Window::Weeks(n) => Duration::try_weeks(i64::from(n)),
        };
        span.and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| AppError::validation(format!("window {self} is too large")))
    }
}

impl FromStr for Window {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        if s == "thisweek" {
            return Ok(Window::ThisWeek);
        }

        let invalid = || {
            AppError::validation(format!(
                "invalid window '{s}' (use thisweek, or a number followed by h, d or w)"
            ))
        };

        let unit = s.chars().last().ok_or_else(invalid)?;
        let value: u32 = s[..s.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;

        match unit {
            'h' => Ok(Window::Hours(value)),
            'd' => Ok(Window::Days(value)),
            'w' => Ok(Window::Weeks(value)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::ThisWeek => f.write_str("thisweek"),
            Window::Hours(n) => write!(f, "{n}h"),
            Window::Days(n) => write!(f, "{n}d"),
            Window::Weeks(n) => write!(f, "{n}w"),
        }
    }
}

/// Monday 00:00 UTC of the week containing `now`.
pub fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = i64::from(now.weekday().num_days_from_monday());
    let monday = now.date_naive() - Duration::days(days_from_monday);
    monday.and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_windows() {
        assert_eq!("thisweek".parse::<Window>().unwrap(), Window::ThisWeek);
        assert_eq!("7d".parse::<Window>().unwrap(), Window::Days(7));
        assert_eq!("2W".parse::<Window>().unwrap(), Window::Weeks(2));
        assert_eq!("12h".parse::<Window>().unwrap(), Window::Hours(12));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "d", "7", "7m", "-1d", "sevend"] {
            assert!(bad.parse::<Window>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_start_of_week_on_tuesday() {
        let tuesday = Utc.with_ymd_and_hms(2024, 1, 16, 15, 30, 0).unwrap();
        assert_eq!(
            start_of_week(tuesday),
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_start_of_week_on_sunday_and_monday() {
        let sunday = Utc.with_ymd_and_hms(2024, 1, 21, 23, 59, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(start_of_week(sunday), monday);
        assert_eq!(start_of_week(monday), monday);
    }

    #[test]
    fn test_days_window() {
        let now = Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap();
        assert_eq!(
            Window::Days(7).since(now).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_oversized_window_is_rejected() {
        let now = Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap();
        let window: Window = "100000000d".parse().unwrap();
        assert!(matches!(window.since(now), Err(AppError::Validation(_))));
        assert!(Window::Weeks(u32::MAX).since(now).is_err());
        assert!(Window::Hours(24).since(now).is_ok());
    }
}
