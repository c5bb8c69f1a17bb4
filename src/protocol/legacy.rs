//! Legacy input formats
//!
//! - `name: value [timestamp]` event lines from older collectors
//! - `%Y%m%dT%H%M` timespecs accepted at query boundaries

use super::error::{ParseError, ParseErrorKind};
use super::wire::parse_double;
use crate::storage::slot::{self, Slot};
use crate::storage::AddressingError;
use crate::types::{current_timestamp, Event, MAX_EVENT_NAME_LEN};
use chrono::NaiveDate;

fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_EVENT_NAME_LEN {
        return name;
    }
    let mut end = MAX_EVENT_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Parse a legacy `name: value [timestamp]` line
///
/// The name is truncated to 255 bytes. A missing timestamp defaults to the
/// current time; a present one must be an integer.
pub fn parse_event_legacy(line: &str) -> Result<Event, ParseError> {
    let (name, value) = line.split_once(": ").ok_or_else(|| {
        ParseError::new(ParseErrorKind::UnexpectedEof).with_context(line)
    })?;

    let (lval, timestamp) = match value.split_once(' ') {
        Some((lval, tval)) => {
            let ts = tval.parse::<i64>().map_err(|_| {
                ParseError::new(ParseErrorKind::InvalidNumber {
                    literal: tval.to_string(),
                })
            })?;
            (lval, ts as f64)
        },
        None => (value, current_timestamp().trunc()),
    };

    let (v, rest) = parse_double(lval)?;
    if !rest.is_empty() {
        return Err(ParseError::new(ParseErrorKind::InvalidNumber {
            literal: lval.to_string(),
        }));
    }

    Ok(Event::new(truncate_name(name), v, timestamp))
}

/// A minute-resolution calendar point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timespec {
    /// Year
    pub year: i32,
    /// Month, 1-12
    pub month: u32,
    /// Day of month, 1-31
    pub day: u32,
    /// Hour, 0-23
    pub hour: u32,
    /// Minute, 0-59
    pub minute: u32,
}

impl Timespec {
    /// One-minute bucket of this point within its day
    pub fn slot(&self) -> Result<Slot, AddressingError> {
        slot::time_to_slot(self.hour, self.minute)
    }

    /// `YYYYMMDD` day key
    pub fn date_key(&self) -> String {
        format!("{:04}{:02}{:02}", self.year, self.month, self.day)
    }

    /// UTC unix timestamp of the start of this minute
    pub fn timestamp(&self) -> Result<i64, AddressingError> {
        slot::slot_to_timestamp(self.year, self.month, self.day, self.slot()?.index())
    }

    /// Whether the day exists in the calendar (e.g. rejects Feb 30)
    pub fn is_calendar_date(&self) -> bool {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day).is_some()
    }
}

fn timespec_field<T: std::str::FromStr>(
    input: &str,
    range: std::ops::Range<usize>,
    name: &str,
) -> Result<T, ParseError> {
    let invalid = || {
        ParseError::new(ParseErrorKind::InvalidTimespec {
            reason: format!("malformed {}", name),
        })
        .at_column(range.start)
        .with_context(input)
    };
    let digits = input.get(range.clone()).ok_or_else(invalid)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse::<T>().map_err(|_| invalid())
}

fn check_range(value: u32, min: u32, max: u32, name: &str, input: &str) -> Result<(), ParseError> {
    if value < min || value > max {
        return Err(ParseError::new(ParseErrorKind::InvalidTimespec {
            reason: format!("{} {} out of range {}..={}", name, value, min, max),
        })
        .with_context(input));
    }
    Ok(())
}

/// Parse a `%Y%m%dT%H%M` timespec, e.g. `20240131T2359`
///
/// Month, day, hour and minute are range-checked; nothing is corrected.
pub fn parse_timespec(input: &str) -> Result<Timespec, ParseError> {
    if input.len() != 13 || input.as_bytes().get(8) != Some(&b'T') {
        return Err(ParseError::new(ParseErrorKind::InvalidTimespec {
            reason: "expected YYYYMMDDTHHMM".to_string(),
        })
        .with_context(input));
    }

    let year = timespec_field::<i32>(input, 0..4, "year")?;
    let month = timespec_field::<u32>(input, 4..6, "month")?;
    let day = timespec_field::<u32>(input, 6..8, "day")?;
    let hour = timespec_field::<u32>(input, 9..11, "hour")?;
    let minute = timespec_field::<u32>(input, 11..13, "minute")?;

    check_range(month, 1, 12, "month", input)?;
    check_range(day, 1, 31, "day", input)?;
    check_range(hour, 0, 23, "hour", input)?;
    check_range(minute, 0, 59, "minute", input)?;

    Ok(Timespec {
        year,
        month,
        day,
        hour,
        minute,
    })
}
