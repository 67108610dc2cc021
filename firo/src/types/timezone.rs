//! Time zone ids carried by `WITH TIME ZONE` values.
//!
//! Ids up to 2878 encode a fixed offset of `id - 1439` minutes. Named regions
//! count down from 65535.
use chrono::{NaiveDate, Offset, TimeZone};
use chrono_tz::Tz;
use std::fmt;
use time::{PrimitiveDateTime, UtcOffset, macros::datetime};

use crate::row::DecodeError;

const OFFSET_BIAS: i32 = 1439;
const MAX_OFFSET_ID: u16 = 2 * OFFSET_BIAS as u16;
const FIRST_NAMED_ID: u16 = u16::MAX;

/// Date used to resolve the offset of a named zone for `TIME WITH TIME ZONE`,
/// which has no date of its own.
pub const TIME_REFERENCE: PrimitiveDateTime = datetime!(2020-01-01 00:00);

/// Named regions ordered by id, starting at [`FIRST_NAMED_ID`].
static NAMED: &[&str] = &[
    "GMT",
    "ACT",
    "AET",
    "AGT",
    "ART",
    "AST",
    "Africa/Abidjan",
    "Africa/Accra",
    "Africa/Addis_Ababa",
    "Africa/Algiers",
    "Africa/Asmara",
    "Africa/Asmera",
    "Africa/Bamako",
    "Africa/Bangui",
    "Africa/Banjul",
    "Africa/Bissau",
    "Africa/Blantyre",
    "Africa/Brazzaville",
    "Africa/Bujumbura",
    "Africa/Cairo",
    "Africa/Casablanca",
    "Africa/Ceuta",
    "Africa/Conakry",
    "Africa/Dakar",
    "Africa/Dar_es_Salaam",
    "Africa/Djibouti",
    "Africa/Douala",
    "Africa/El_Aaiun",
    "Africa/Freetown",
    "Africa/Gaborone",
    "Africa/Harare",
    "Africa/Johannesburg",
    "Africa/Juba",
    "Africa/Kampala",
    "Africa/Khartoum",
    "Africa/Kigali",
    "Africa/Kinshasa",
    "Africa/Lagos",
    "Africa/Libreville",
    "Africa/Lome",
    "Africa/Luanda",
    "Africa/Lubumbashi",
    "Africa/Lusaka",
    "Africa/Malabo",
    "Africa/Maputo",
    "Africa/Maseru",
    "Africa/Mbabane",
    "Africa/Mogadishu",
    "Africa/Monrovia",
    "Africa/Nairobi",
    "Africa/Ndjamena",
    "Africa/Niamey",
    "Africa/Nouakchott",
    "Africa/Ouagadougou",
    "Africa/Porto-Novo",
    "Africa/Sao_Tome",
    "Africa/Timbuktu",
    "Africa/Tripoli",
    "Africa/Tunis",
    "Africa/Windhoek",
];

/// Three letter ids the server keeps for compatibility.
static ALIASES: &[(&str, &str)] = &[
    ("ACT", "Australia/Darwin"),
    ("AET", "Australia/Sydney"),
    ("AGT", "America/Argentina/Buenos_Aires"),
    ("ART", "Africa/Cairo"),
    ("AST", "America/Anchorage"),
];

/// A resolved time zone id.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Zone {
    Fixed(UtcOffset),
    Named(&'static str),
}

impl Zone {
    pub fn from_id(id: u16) -> Result<Zone, DecodeError> {
        if id <= MAX_OFFSET_ID {
            let minutes = id as i32 - OFFSET_BIAS;
            return UtcOffset::from_whole_seconds(minutes * 60)
                .map(Zone::Fixed)
                .map_err(|e| DecodeError::OutOfRange(e.to_string().into()));
        }

        NAMED
            .get(usize::from(FIRST_NAMED_ID - id))
            .copied()
            .map(Zone::Named)
            .ok_or(DecodeError::UnknownTimeZone(id))
    }

    /// Offset in effect at `utc`.
    pub fn offset_at(&self, utc: PrimitiveDateTime) -> Result<UtcOffset, DecodeError> {
        let name = match self {
            Zone::Fixed(offset) => return Ok(*offset),
            Zone::Named(name) => *name,
        };

        let iana = ALIASES
            .iter()
            .find_map(|(alias, iana)| (*alias == name).then_some(*iana))
            .unwrap_or(name);
        let tz = iana
            .parse::<Tz>()
            .map_err(|_| DecodeError::OutOfRange(format!("unknown time zone {name:?}").into()))?;

        let naive = NaiveDate::from_ymd_opt(utc.year(), utc.month() as u32, utc.day() as u32)
            .and_then(|d| d.and_hms_opt(utc.hour() as u32, utc.minute() as u32, utc.second() as u32))
            .ok_or_else(|| DecodeError::OutOfRange("timestamp out of range".into()))?;
        let seconds = tz.offset_from_utc_datetime(&naive).fix().local_minus_utc();

        UtcOffset::from_whole_seconds(seconds).map_err(|e| DecodeError::OutOfRange(e.to_string().into()))
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Fixed(offset) => {
                let (h, m, _) = offset.as_hms();
                let sign = if offset.is_negative() { '-' } else { '+' };
                write!(f, "{sign}{:02}:{:02}", h.unsigned_abs(), m.unsigned_abs())
            },
            Zone::Named(name) => f.write_str(name),
        }
    }
}

/// Fixed offset id sent with time zone parameters.
pub fn offset_id(offset: UtcOffset) -> u16 {
    (offset.whole_minutes() as i32 + OFFSET_BIAS) as u16
}

#[cfg(test)]
mod test {
    use super::*;
    use time::macros::offset;

    #[test]
    fn fixed_offsets() {
        assert_eq!(Zone::from_id(1439).unwrap(), Zone::Fixed(UtcOffset::UTC));
        assert_eq!(Zone::from_id(1439 + 330).unwrap(), Zone::Fixed(offset!(+05:30)));
        assert_eq!(Zone::from_id(1439 - 180).unwrap().to_string(), "-03:00");
        assert_eq!(offset_id(offset!(-03:00)), 1259);
    }

    #[test]
    fn named() {
        assert_eq!(Zone::from_id(65535).unwrap(), Zone::Named("GMT"));
        assert_eq!(Zone::from_id(65529).unwrap(), Zone::Named("Africa/Abidjan"));
        assert!(Zone::from_id(40000).is_err());
        assert!(Zone::from_id(3000).is_err());
    }

    #[test]
    fn named_offset() {
        let cairo = Zone::from_id(65535 - 19).unwrap();
        assert_eq!(cairo, Zone::Named("Africa/Cairo"));
        assert_eq!(cairo.offset_at(TIME_REFERENCE).unwrap(), offset!(+02:00));
        let gmt = Zone::from_id(65535).unwrap();
        assert_eq!(gmt.offset_at(TIME_REFERENCE).unwrap(), UtcOffset::UTC);
    }
}
