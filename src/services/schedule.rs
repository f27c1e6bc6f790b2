use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("Invalid time regex"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid auto-collect time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("No auto-collect times configured")]
    Empty,
}

/// Daily times at which an automatic collection run starts.
///
/// Parsed from the whitespace-separated settings value, e.g. `"6:00 18:00 24:00"`.
/// `24:00` means midnight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoCollectSchedule {
    times: Vec<NaiveTime>,
}

impl AutoCollectSchedule {
    pub fn parse(raw: &str) -> Result<Self, ScheduleError> {
        let mut times = raw
            .split_whitespace()
            .map(parse_time)
            .collect::<Result<Vec<_>, _>>()?;

        if times.is_empty() {
            return Err(ScheduleError::Empty);
        }

        times.sort();
        times.dedup();
        Ok(Self { times })
    }

    pub fn times(&self) -> &[NaiveTime] {
        &self.times
    }

    /// First scheduled time strictly after `now`, rolling over to the next day.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date();
        self.times
            .iter()
            .map(|t| today.and_time(*t))
            .find(|candidate| *candidate > now)
            .unwrap_or_else(|| (today + Duration::days(1)).and_time(self.times[0]))
    }

    /// True when `now` falls in a scheduled minute that has not fired yet.
    pub fn is_due(&self, now: NaiveDateTime, last_fired: Option<NaiveDateTime>) -> bool {
        let minute = truncate_to_minute(now);
        if !self.times.contains(&minute.time()) {
            return false;
        }
        last_fired.is_none_or(|last| truncate_to_minute(last) != minute)
    }
}

fn parse_time(token: &str) -> Result<NaiveTime, ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(token.to_string());
    let caps = TIME_PATTERN.captures(token).ok_or_else(invalid)?;

    let hour: u32 = caps[1].parse().map_err(|_| invalid())?;
    let minute: u32 = caps[2].parse().map_err(|_| invalid())?;

    match (hour, minute) {
        (24, 0) => Ok(NaiveTime::MIN),
        _ => NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid),
    }
}

fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}
