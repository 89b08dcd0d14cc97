//! Scheduling windows derived from a booking's date and free-text time slot.
//!
//! Labels look like `"10:00 AM - 10:30 AM"`. Both sides must read as
//! `H:MM AM/PM`; anything else is [`TimeSlotError::Malformed`], which callers
//! classify as upcoming instead of failing (slots can be typed in by hand).

use chrono::{Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use shared_proto::session::SessionTiming;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeSlotError {
    #[error("malformed time slot: {0:?}")]
    Malformed(String),
}

/// Source of "now" in schedule-local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock shifted into the configured schedule offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(|offset| Self { offset })
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Builds the window for `slot` on `date`. An end clock earlier than the
    /// start clock belongs to the following day.
    pub fn from_slot(date: NaiveDate, slot: &str) -> Result<Self, TimeSlotError> {
        let (start, end) = parse_time_slot(slot)?;
        let start = date.and_time(start);
        let mut end = date.and_time(end);
        if end < start {
            end += Duration::days(1);
        }
        Ok(Self { start, end })
    }

    pub fn classify(&self, now: NaiveDateTime) -> SessionTiming {
        if now < self.start {
            SessionTiming::Upcoming
        } else if now <= self.end {
            SessionTiming::Live
        } else {
            SessionTiming::Expired
        }
    }

    /// Half-open intersection: back-to-back windows do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Classifies a booking's slot against `now`, treating unparsable labels as upcoming.
pub fn evaluate(date: NaiveDate, slot: &str, now: NaiveDateTime) -> SessionTiming {
    match TimeWindow::from_slot(date, slot) {
        Ok(window) => window.classify(now),
        Err(err) => {
            tracing::debug!(component = "time_window", error = %err, "treating slot as upcoming");
            SessionTiming::Upcoming
        }
    }
}

pub fn parse_time_slot(slot: &str) -> Result<(NaiveTime, NaiveTime), TimeSlotError> {
    let malformed = || TimeSlotError::Malformed(slot.to_string());

    let (raw_start, raw_end) = slot
        .split_once(|c| c == '-' || c == '\u{2013}')
        .ok_or_else(malformed)?;

    let start = parse_clock(raw_start).ok_or_else(malformed)?;
    let end = parse_clock(raw_end).ok_or_else(malformed)?;
    Ok((start, end))
}

/// Parses `"10:00 AM"`, `"1:05pm"` or `"01:40AM"`.
pub fn parse_clock(label: &str) -> Option<NaiveTime> {
    let label = label.trim();
    let (hours, rest) = label.split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || !hours.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let minutes = rest.get(..2)?;
    if !minutes.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let meridiem = rest[2..].trim_start().to_ascii_uppercase();

    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if !(1..=12).contains(&hours) {
        return None;
    }

    let hours = match meridiem.as_str() {
        "AM" if hours == 12 => 0,
        "AM" => hours,
        "PM" if hours == 12 => 12,
        "PM" => hours + 12,
        _ => return None,
    };

    NaiveTime::from_hms_opt(hours, minutes, 0)
}

/// Human-readable distance to `target`: `2d 3h 5m`, `3h 5m`, `5m`, or `Now`.
pub fn format_countdown(target: NaiveDateTime, now: NaiveDateTime) -> String {
    let diff = target - now;
    if diff <= Duration::zero() {
        return "Now".to_string();
    }

    let total_minutes = diff.num_minutes();
    let days = total_minutes / (60 * 24);
    let hours = (total_minutes % (60 * 24)) / 60;
    let minutes = total_minutes % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
