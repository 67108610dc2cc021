//! Date and time of day conversion.
//!
//! Dates travel as a signed day count where day 0 is 1858-11-17, times of day
//! as an unsigned count of 1/10000 second since midnight.
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::row::DecodeError;

/// Days between 0000-03-01 of the proleptic calendar and the wire epoch.
const EPOCH_OFFSET: i64 = 678_882;

/// Time of day resolution per second.
pub const TIME_FRACTION: u32 = 10_000;

const NANOS_PER_FRACTION: u32 = 1_000_000_000 / TIME_FRACTION;

pub fn decode_date(raw: i32) -> Result<Date, DecodeError> {
    let mut nday = raw as i64 + EPOCH_OFFSET;
    let century = (4 * nday - 1).div_euclid(146_097);
    nday = 4 * nday - 1 - 146_097 * century;
    let mut day = nday / 4;

    nday = (4 * day + 3) / 1461;
    day = 4 * day + 3 - 1461 * nday;
    day = (day + 4) / 4;

    let mut month = (5 * day - 3) / 153;
    day = 5 * day - 3 - 153 * month;
    day = (day + 5) / 5;

    let mut year = 100 * century + nday;
    if month < 10 {
        month += 3;
    } else {
        month -= 9;
        year += 1;
    }

    let month = Month::try_from(month as u8).map_err(out_of_range)?;
    Date::from_calendar_date(year as i32, month, day as u8).map_err(out_of_range)
}

pub fn encode_date(date: Date) -> i32 {
    let i = date.month() as i64 + 9;
    let mut year = date.year() as i64 + i / 12 - 1;
    let month = i % 12;
    let century = year.div_euclid(100);
    year -= 100 * century;
    let day = (146_097 * century) / 4
        + (1461 * year) / 4
        + (153 * month + 2) / 5
        + date.day() as i64
        - EPOCH_OFFSET;
    day as i32
}

pub fn decode_time(raw: u32) -> Result<Time, DecodeError> {
    let seconds = raw / TIME_FRACTION;
    let nanos = (raw % TIME_FRACTION) * NANOS_PER_FRACTION;
    Time::from_hms_nano(
        (seconds / 3600) as u8,
        (seconds / 60 % 60) as u8,
        (seconds % 60) as u8,
        nanos,
    )
    .map_err(out_of_range)
}

/// Sub 100 microsecond precision is truncated.
pub fn encode_time(time: Time) -> u32 {
    let seconds = time.hour() as u32 * 3600 + time.minute() as u32 * 60 + time.second() as u32;
    seconds * TIME_FRACTION + time.nanosecond() / NANOS_PER_FRACTION
}

pub fn decode_timestamp(date: i32, time: u32) -> Result<PrimitiveDateTime, DecodeError> {
    Ok(PrimitiveDateTime::new(decode_date(date)?, decode_time(time)?))
}

fn out_of_range(err: time::error::ComponentRange) -> DecodeError {
    DecodeError::OutOfRange(err.to_string().into())
}
