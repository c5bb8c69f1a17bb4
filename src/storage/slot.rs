//! Slot arithmetic
//!
//! A day is split into 1440 one-minute slots, `slot = hour * 60 + minute`.
//! Conversions in both directions reject out-of-range input.

use super::TimeBasis;
use crate::error::AddressingError;
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

/// Number of slots in one day
pub const SLOTS_PER_DAY: usize = 1440;

/// A one-minute bucket within a calendar day, always in `0..1440`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(u16);

impl Slot {
    /// Create a slot from its index
    pub fn new(index: u32) -> Result<Self, AddressingError> {
        if index as usize >= SLOTS_PER_DAY {
            return Err(AddressingError::SlotOutOfRange(index));
        }
        Ok(Self(index as u16))
    }

    /// Slot index
    pub fn index(&self) -> u32 {
        self.0 as u32
    }

    /// `(hour, minute)` of the slot start
    pub fn to_time(&self) -> (u32, u32) {
        (self.index() / 60, self.index() % 60)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Slot {
    type Err = AddressingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let index = s
            .parse::<u32>()
            .map_err(|_| AddressingError::MalformedLine(format!("invalid slot '{}'", s)))?;
        Slot::new(index)
    }
}

/// Convert an hour and minute to a slot
pub fn time_to_slot(hour: u32, minute: u32) -> Result<Slot, AddressingError> {
    if hour > 23 {
        return Err(AddressingError::HourOutOfRange(hour));
    }
    if minute > 59 {
        return Err(AddressingError::MinuteOutOfRange(minute));
    }
    Slot::new(hour * 60 + minute)
}

/// Convert a slot index back to `(hour, minute)`
pub fn slot_to_time(slot: u32) -> Result<(u32, u32), AddressingError> {
    Slot::new(slot).map(|s| s.to_time())
}

/// UTC unix timestamp of the start of `slot` on the given day
pub fn slot_to_timestamp(year: i32, month: u32, day: u32, slot: u32) -> Result<i64, AddressingError> {
    let (hour, minute) = slot_to_time(slot)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(AddressingError::InvalidDate { year, month, day })?;
    let datetime = date
        .and_hms_opt(hour, minute, 0)
        .ok_or(AddressingError::InvalidDate { year, month, day })?;
    Ok(datetime.and_utc().timestamp())
}

/// `YYYYMMDD` day key of a datetime
pub fn datetime_date<Tz: TimeZone>(datetime: &DateTime<Tz>) -> String {
    format!(
        "{:04}{:02}{:02}",
        datetime.year(),
        datetime.month(),
        datetime.day()
    )
}

/// `HHMM` time key of a datetime
pub fn datetime_time<Tz: TimeZone>(datetime: &DateTime<Tz>) -> String {
    format!("{:02}{:02}", datetime.hour(), datetime.minute())
}

/// Convert unix seconds to a UTC datetime
pub fn timestamp_to_datetime(timestamp: f64) -> Result<DateTime<Utc>, AddressingError> {
    if !timestamp.is_finite() || timestamp.abs() > i64::MAX as f64 {
        return Err(AddressingError::InvalidTimestamp(timestamp));
    }
    let secs = timestamp.floor();
    let nanos = (((timestamp - secs) * 1e9) as u32).min(999_999_999);
    DateTime::from_timestamp(secs as i64, nanos).ok_or(AddressingError::InvalidTimestamp(timestamp))
}

fn address_of<Tz: TimeZone>(datetime: &DateTime<Tz>) -> Result<(String, Slot), AddressingError> {
    Ok((
        datetime_date(datetime),
        time_to_slot(datetime.hour(), datetime.minute())?,
    ))
}

/// Day key and slot of a timestamp, using calendar fields in `basis`
pub fn calendar_address(timestamp: f64, basis: TimeBasis) -> Result<(String, Slot), AddressingError> {
    let utc = timestamp_to_datetime(timestamp)?;
    match basis {
        TimeBasis::Utc => address_of(&utc),
        TimeBasis::Local => address_of(&utc.with_timezone(&Local)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_bounds() {
        assert_eq!(time_to_slot(0, 0).unwrap().index(), 0);
        assert_eq!(time_to_slot(23, 59).unwrap().index(), 1439);
        assert_eq!(time_to_slot(12, 30).unwrap().index(), 750);
    }

    #[test]
    fn test_slot_rejects_out_of_range() {
        assert_eq!(time_to_slot(24, 0), Err(AddressingError::HourOutOfRange(24)));
        assert_eq!(time_to_slot(0, 60), Err(AddressingError::MinuteOutOfRange(60)));
        assert_eq!(slot_to_time(1440), Err(AddressingError::SlotOutOfRange(1440)));
        assert!(Slot::new(5000).is_err());
    }

    #[test]
    fn test_slot_round_trip_exhaustive() {
        for hour in 0..24 {
            for minute in 0..60 {
                let slot = time_to_slot(hour, minute).unwrap();
                assert_eq!(slot_to_time(slot.index()).unwrap(), (hour, minute));
            }
        }
    }

    #[test]
    fn test_slot_from_str() {
        assert_eq!("17".parse::<Slot>().unwrap().index(), 17);
        assert!("1440".parse::<Slot>().is_err());
        assert!("x".parse::<Slot>().is_err());
    }

    #[test]
    fn test_slot_to_timestamp() {
        assert_eq!(slot_to_timestamp(1970, 1, 1, 0).unwrap(), 0);
        assert_eq!(slot_to_timestamp(1970, 1, 1, 1439).unwrap(), 86_340);
        assert!(matches!(
            slot_to_timestamp(2023, 2, 30, 0),
            Err(AddressingError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_calendar_address_utc() {
        // 2023-11-14 22:13:20 UTC
        let (date, slot) = calendar_address(1_700_000_000.0, TimeBasis::Utc).unwrap();
        assert_eq!(date, "20231114");
        assert_eq!(slot.to_time(), (22, 13));
    }

    #[test]
    fn test_calendar_address_rejects_non_finite() {
        assert!(calendar_address(f64::NAN, TimeBasis::Utc).is_err());
        assert!(calendar_address(f64::INFINITY, TimeBasis::Local).is_err());
    }

    #[test]
    fn test_datetime_keys() {
        let dt = timestamp_to_datetime(1_700_000_000.5).unwrap();
        assert_eq!(datetime_date(&dt), "20231114");
        assert_eq!(datetime_time(&dt), "2213");
    }
}
