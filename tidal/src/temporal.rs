//! Calendar types: [`Date`], [`Time`], [`Timestamp`] and [`Interval`].
//!
//! All types are plain component structs. Ordering is derived and therefore
//! component-wise, which for validated values coincides with chronological
//! order. Text forms follow ISO-8601.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::{str::FromStr, sync::OnceLock};

const SECONDS_PER_DAY: i64 = 86_400;
const NANOS_PER_SECOND: u32 = 1_000_000_000;
const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;

#[derive(Debug, thiserror::Error)]
#[error("Invalid {kind} literal {input:?}")]
pub struct ParseTemporalError {
    kind: &'static str,
    input: String,
}

impl ParseTemporalError {
    fn new(kind: &'static str, input: &str) -> Self {
        Self {
            kind,
            input: input.to_owned(),
        }
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Date {
    year: i32,
    month: u8,
    day: u8,
}

impl Date {
    pub fn new(year: i32, month: u8, day: u8) -> Option<Self> {
        (1..=12).contains(&month).then_some(())?;
        (1..=days_in_month(year, month)).contains(&day).then_some(())?;
        Some(Self { year, month, day })
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u8 {
        self.month
    }

    pub fn day(self) -> u8 {
        self.day
    }

    /// Days since 1970-01-01.
    pub fn days_since_epoch(self) -> i64 {
        days_from_civil(i64::from(self.year), self.month.into(), self.day.into())
    }

    pub fn from_days_since_epoch(days: i64) -> Option<Self> {
        let (year, month, day) = civil_from_days(days);
        Some(Self {
            year: year.try_into().ok()?,
            month: month as u8,
            day: day as u8,
        })
    }
}

impl From<Timestamp> for Date {
    fn from(ts: Timestamp) -> Self {
        ts.date
    }
}

impl FromStr for Date {
    type Err = ParseTemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let err = || ParseTemporalError::new("date", s);
        let caps = regex(&RE, r"^(-?\d{4,})-(\d{2})-(\d{2})$")
            .captures(s.trim())
            .ok_or_else(err)?;
        parse_date(&caps[1], &caps[2], &caps[3]).ok_or_else(err)
    }
}

impl std::fmt::Display for Date {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.year < 0 {
            write!(f, "-{:04}-{:02}-{:02}", self.year.unsigned_abs(), self.month, self.day)
        } else {
            write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time {
    hour: u8,
    minute: u8,
    second: u8,
}

impl Time {
    pub const MIDNIGHT: Self = Self {
        hour: 0,
        minute: 0,
        second: 0,
    };

    pub fn new(hour: u8, minute: u8, second: u8) -> Option<Self> {
        (hour < 24 && minute < 60 && second < 60).then_some(Self {
            hour,
            minute,
            second,
        })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    pub fn second(self) -> u8 {
        self.second
    }

    pub fn seconds_since_midnight(self) -> u32 {
        u32::from(self.hour) * 3600 + u32::from(self.minute) * 60 + u32::from(self.second)
    }

    fn from_seconds_since_midnight(secs: u32) -> Self {
        Self {
            hour: (secs / 3600) as u8,
            minute: (secs / 60 % 60) as u8,
            second: (secs % 60) as u8,
        }
    }
}

impl From<Timestamp> for Time {
    fn from(ts: Timestamp) -> Self {
        ts.time
    }
}

impl FromStr for Time {
    type Err = ParseTemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let err = || ParseTemporalError::new("time", s);
        let caps = regex(&RE, r"^(\d{2}):(\d{2}):(\d{2})$")
            .captures(s.trim())
            .ok_or_else(err)?;
        parse_time(&caps[1], &caps[2], &caps[3]).ok_or_else(err)
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    date: Date,
    time: Time,
    nanos: u32,
}

impl Timestamp {
    pub fn new(date: Date, time: Time, nanos: u32) -> Option<Self> {
        (nanos < NANOS_PER_SECOND).then_some(Self { date, time, nanos })
    }

    /// Builds a timestamp from seconds since 1970-01-01 00:00:00.
    ///
    /// Returns `None` if the year does not fit.
    pub fn from_unix(secs: i64) -> Option<Self> {
        let days = secs.div_euclid(SECONDS_PER_DAY);
        let secs_of_day = secs.rem_euclid(SECONDS_PER_DAY) as u32;
        Some(Self {
            date: Date::from_days_since_epoch(days)?,
            time: Time::from_seconds_since_midnight(secs_of_day),
            nanos: 0,
        })
    }

    /// Seconds since 1970-01-01 00:00:00, discarding the fraction.
    pub fn to_unix(self) -> i64 {
        self.date.days_since_epoch() * SECONDS_PER_DAY
            + i64::from(self.time.seconds_since_midnight())
    }

    pub fn date(self) -> Date {
        self.date
    }

    pub fn time(self) -> Time {
        self.time
    }

    pub fn year(self) -> i32 {
        self.date.year
    }

    pub fn month(self) -> u8 {
        self.date.month
    }

    pub fn day(self) -> u8 {
        self.date.day
    }

    pub fn hour(self) -> u8 {
        self.time.hour
    }

    pub fn minute(self) -> u8 {
        self.time.minute
    }

    pub fn second(self) -> u8 {
        self.time.second
    }

    /// Fractional second in nanoseconds.
    pub fn nanos(self) -> u32 {
        self.nanos
    }
}

impl From<Date> for Timestamp {
    fn from(date: Date) -> Self {
        Self {
            date,
            time: Time::MIDNIGHT,
            nanos: 0,
        }
    }
}

impl From<Time> for Timestamp {
    /// Places the time on 1970-01-01.
    fn from(time: Time) -> Self {
        Self {
            date: Date {
                year: 1970,
                month: 1,
                day: 1,
            },
            time,
            nanos: 0,
        }
    }
}

impl FromStr for Timestamp {
    type Err = ParseTemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let err = || ParseTemporalError::new("timestamp", s);
        let caps = regex(
            &RE,
            r"^(-?\d{4,})-(\d{2})-(\d{2})(?:[ T](\d{2}):(\d{2}):(\d{2})(?:\.(\d{1,9}))?)?$",
        )
        .captures(s.trim())
        .ok_or_else(err)?;
        let date = parse_date(&caps[1], &caps[2], &caps[3]).ok_or_else(err)?;
        let time = match (caps.get(4), caps.get(5), caps.get(6)) {
            (Some(h), Some(m), Some(s)) => {
                parse_time(h.as_str(), m.as_str(), s.as_str()).ok_or_else(err)?
            }
            _ => Time::MIDNIGHT,
        };
        let nanos = match caps.get(7) {
            Some(fraction) => {
                let digits = fraction.as_str();
                let scale = 10u32.pow(9 - digits.len() as u32);
                digits.parse::<u32>().map_err(|_| err())? * scale
            }
            None => 0,
        };
        Ok(Self { date, time, nanos })
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.date, self.time)?;
        if self.nanos != 0 {
            let fraction = format!("{:09}", self.nanos);
            write!(f, ".{}", fraction.trim_end_matches('0'))?;
        }
        Ok(())
    }
}

/// A calendar duration.
///
/// Months, days and sub-day time are kept apart because their lengths are
/// not fixed relative to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    months: i32,
    days: i32,
    micros: i64,
}

impl Interval {
    pub fn new(months: i32, days: i32, micros: i64) -> Self {
        Self {
            months,
            days,
            micros,
        }
    }

    pub fn months(self) -> i32 {
        self.months
    }

    pub fn days(self) -> i32 {
        self.days
    }

    pub fn micros(self) -> i64 {
        self.micros
    }
}

impl FromStr for Interval {
    type Err = ParseTemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let err = || ParseTemporalError::new("interval", s);
        let caps = regex(
            &RE,
            r"^P(?:(-?\d+)Y)?(?:(-?\d+)M)?(?:(-?\d+)D)?(?:T(?:(-?\d+)H)?(?:(-?\d+)M)?(?:(-?)(\d+)(?:\.(\d{1,6}))?S)?)?$",
        )
        .captures(s.trim())
        .ok_or_else(err)?;
        if (1..=7).all(|i| caps.get(i).is_none()) {
            return Err(err());
        }
        let int = |i: usize| -> Result<i64, ParseTemporalError> {
            caps.get(i)
                .map_or(Ok(0), |m| m.as_str().parse().map_err(|_| err()))
        };

        let extra_months = int(2)?;
        let months = int(1)?
            .checked_mul(12)
            .and_then(|years| years.checked_add(extra_months))
            .and_then(|months| i32::try_from(months).ok())
            .ok_or_else(err)?;
        let days = i32::try_from(int(3)?).map_err(|_| err())?;

        let mut seconds = int(7)?.checked_mul(MICROS_PER_SECOND).ok_or_else(err)?;
        if let Some(fraction) = caps.get(8) {
            let digits = fraction.as_str();
            let scale = 10i64.pow(6 - digits.len() as u32);
            let fraction = digits.parse::<i64>().map_err(|_| err())? * scale;
            seconds = seconds.checked_add(fraction).ok_or_else(err)?;
        }
        if caps.get(6).is_some_and(|sign| sign.as_str() == "-") {
            seconds = -seconds;
        }
        let micros = int(4)?
            .checked_mul(MICROS_PER_HOUR)
            .and_then(|h| int(5).ok()?.checked_mul(MICROS_PER_MINUTE)?.checked_add(h))
            .and_then(|hm| hm.checked_add(seconds))
            .ok_or_else(err)?;
        Ok(Self {
            months,
            days,
            micros,
        })
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::default() {
            return f.write_str("PT0S");
        }
        f.write_str("P")?;
        let (years, months) = (self.months / 12, self.months % 12);
        if years != 0 {
            write!(f, "{years}Y")?;
        }
        if months != 0 {
            write!(f, "{months}M")?;
        }
        if self.days != 0 {
            write!(f, "{}D", self.days)?;
        }
        if self.micros == 0 {
            return Ok(());
        }
        f.write_str("T")?;
        let hours = self.micros / MICROS_PER_HOUR;
        let minutes = self.micros % MICROS_PER_HOUR / MICROS_PER_MINUTE;
        let rest = self.micros % MICROS_PER_MINUTE;
        if hours != 0 {
            write!(f, "{hours}H")?;
        }
        if minutes != 0 {
            write!(f, "{minutes}M")?;
        }
        if rest != 0 {
            let sign = if rest < 0 { "-" } else { "" };
            let rest = rest.unsigned_abs();
            write!(f, "{sign}{}", rest / MICROS_PER_SECOND as u64)?;
            let fraction = rest % MICROS_PER_SECOND as u64;
            if fraction != 0 {
                let fraction = format!("{fraction:06}");
                write!(f, ".{}", fraction.trim_end_matches('0'))?;
            }
            f.write_str("S")?;
        }
        Ok(())
    }
}

fn parse_date(year: &str, month: &str, day: &str) -> Option<Date> {
    Date::new(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn parse_time(hour: &str, minute: &str, second: &str) -> Option<Time> {
    Time::new(hour.parse().ok()?, minute.parse().ok()?, second.parse().ok()?)
}

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

// Howard Hinnant's days_from_civil / civil_from_days.

fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let year_of_era = year.rem_euclid(400);
    let day_of_year = (153 * (month + if month > 2 { -3 } else { 9 }) + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}

fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let days = days + 719_468;
    let era = days.div_euclid(146_097);
    let day_of_era = days.rem_euclid(146_097);
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let mp = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = year_of_era + era * 400;
    (if month <= 2 { year + 1 } else { year }, month, day)
}
