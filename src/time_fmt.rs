//! UTC calendar and time-string utilities shared by both programs.
//!
//! Day-file spanning (§4.1) and the `start_time`/`-l` CLI handling (§6)
//! both hinge on converting between unix seconds and UTC calendar dates;
//! this is the one place that happens.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{Result, SeismuxError};

/// UTC calendar date, used for day-file naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UtcDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl UtcDate {
    /// The UTC calendar date a unix-seconds instant falls on.
    #[must_use]
    pub fn from_unix_secs(secs: i64) -> UtcDate {
        let dt = Utc.timestamp_opt(secs, 0).single().expect("valid unix timestamp");
        UtcDate {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
        }
    }

    /// Midnight UTC of this date, in unix seconds.
    #[must_use]
    pub fn midnight_unix_secs(&self) -> i64 {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .expect("valid ymd")
            .and_hms_opt(0, 0, 0)
            .expect("valid hms")
            .and_utc()
            .timestamp()
    }

    /// The calendar day immediately before this one.
    #[must_use]
    pub fn previous(&self) -> UtcDate {
        UtcDate::from_unix_secs(self.midnight_unix_secs() - 1)
    }

    /// The calendar day immediately after this one.
    #[must_use]
    pub fn next(&self) -> UtcDate {
        UtcDate::from_unix_secs(self.midnight_unix_secs() + 24 * 3600)
    }

    /// Julian day-of-year (1-366), as stored in block descriptors.
    #[must_use]
    pub fn julian_day(&self) -> u32 {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .expect("valid ymd")
            .ordinal()
    }

    /// Day-file name: `sys<N>.<YYYYMMDD>.dat`, per §4.1.
    #[must_use]
    pub fn day_file_name(&self, system_number: u32) -> String {
        format!(
            "sys{}.{:04}{:02}{:02}.dat",
            system_number, self.year, self.month, self.day
        )
    }
}

/// Parse a CLI `start_time` argument: `MMDD_HHMM`, `MMDDYY_HHMM`,
/// `MMDD_HHMMSS`, or `MMDDYY_HHMMSS` (§6). `reference_year` anchors the
/// two forms lacking an explicit year (the year the tool is run in).
pub fn parse_start_time(s: &str, reference_year: i32, local: bool) -> Result<DateTime<Utc>> {
    let (date_part, time_part) = s.split_once('_').ok_or_else(|| {
        SeismuxError::config(format!("start_time {s:?} missing '_' separator"))
    })?;

    let (month, day, year) = match date_part.len() {
        4 => {
            let month: u32 = date_part[0..2].parse().map_err(bad_start_time)?;
            let day: u32 = date_part[2..4].parse().map_err(bad_start_time)?;
            (month, day, reference_year)
        }
        6 => {
            let month: u32 = date_part[0..2].parse().map_err(bad_start_time)?;
            let day: u32 = date_part[2..4].parse().map_err(bad_start_time)?;
            let yy: i32 = date_part[4..6].parse().map_err(bad_start_time)?;
            (month, day, 2000 + yy)
        }
        _ => {
            return Err(SeismuxError::config(format!(
                "start_time {s:?}: date part must be MMDD or MMDDYY"
            )))
        }
    };

    let (hour, minute, second) = match time_part.len() {
        4 => {
            let hour: u32 = time_part[0..2].parse().map_err(bad_start_time)?;
            let minute: u32 = time_part[2..4].parse().map_err(bad_start_time)?;
            (hour, minute, 0)
        }
        6 => {
            let hour: u32 = time_part[0..2].parse().map_err(bad_start_time)?;
            let minute: u32 = time_part[2..4].parse().map_err(bad_start_time)?;
            let second: u32 = time_part[4..6].parse().map_err(bad_start_time)?;
            (hour, minute, second)
        }
        _ => {
            return Err(SeismuxError::config(format!(
                "start_time {s:?}: time part must be HHMM or HHMMSS"
            )))
        }
    };

    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .ok_or_else(|| SeismuxError::config(format!("start_time {s:?}: out of range")))?;

    if local {
        // No local timezone database is consulted here: `-l` is accepted
        // as an interface per §6, but without per-platform TZ plumbing
        // (explicitly out of scope, §1) "local" degrades to the same
        // calendar math interpreted as UTC.
        log::warn!("parse_start_time: -l requested but no local TZ database is wired up; treating {s:?} as UTC");
    }
    Ok(Utc.from_utc_datetime(&naive))
}

fn bad_start_time(_: std::num::ParseIntError) -> SeismuxError {
    SeismuxError::config("start_time contains a non-numeric field")
}

/// Format a unix-seconds timestamp as `%.3f` offset-from-start seconds.
#[must_use]
pub fn format_offset(start_secs: f64, t: f64) -> String {
    format!("{:.3}", t - start_secs)
}

/// Format a unix-seconds timestamp as `%.3f` epoch seconds.
#[must_use]
pub fn format_epoch(t: f64) -> String {
    format!("{:.3}", t)
}

/// Render a unix-seconds timestamp as an ISO-ish UTC string, for headers.
#[must_use]
pub fn format_header_time(secs: f64) -> String {
    let whole = secs.floor() as i64;
    let ndt = NaiveDateTime::from_timestamp_opt(whole, 0).unwrap_or_default();
    ndt.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_roundtrip() {
        let d = UtcDate { year: 2024, month: 12, day: 31 };
        let secs = d.midnight_unix_secs();
        assert_eq!(UtcDate::from_unix_secs(secs), d);
        assert_eq!(UtcDate::from_unix_secs(secs + 5000), d);
    }

    #[test]
    fn previous_and_next_span_month() {
        let d = UtcDate { year: 2024, month: 3, day: 1 };
        assert_eq!(d.previous(), UtcDate { year: 2024, month: 2, day: 29 });
        let d = UtcDate { year: 2024, month: 2, day: 29 };
        assert_eq!(d.next(), UtcDate { year: 2024, month: 3, day: 1 });
    }

    #[test]
    fn day_file_name_format() {
        let d = UtcDate { year: 2023, month: 1, day: 5 };
        assert_eq!(d.day_file_name(3), "sys3.20230105.dat");
    }

    #[test]
    fn parse_mmdd_hhmm() {
        let t = parse_start_time("0704_1230", 2026, false).unwrap();
        assert_eq!(t.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-07-04 12:30:00");
    }

    #[test]
    fn parse_mmddyy_hhmmss() {
        let t = parse_start_time("070426_123045", 2000, false).unwrap();
        assert_eq!(t.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-07-04 12:30:45");
    }

    #[test]
    fn parse_rejects_missing_separator() {
        assert!(parse_start_time("07041230", 2026, false).is_err());
    }
}
