//! The [`Value`] type and its wire decoding.
use bytes::Bytes;
use std::fmt;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::{
    blob::BlobId,
    firebird::{consts::sql_type, describe::Descriptor},
    row::DecodeError,
    types::{
        Charset, DecFloat, Decimal,
        datetime::{decode_date, decode_time},
        decfloat,
        timezone::{TIME_REFERENCE, Zone},
    },
};

/// Character set id of binary strings.
pub const OCTETS: i32 = 1;

/// A column or parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    /// `SMALLINT`, `INTEGER` and `BIGINT` without fractional digits.
    Integer(i64),
    Int128(i128),
    /// Scaled `NUMERIC` and `DECIMAL`.
    Decimal(Decimal),
    Float(f32),
    Double(f64),
    DecFloat(DecFloat),
    Text(String),
    /// Binary strings.
    Bytes(Bytes),
    Date(Date),
    Time(Time),
    Timestamp(PrimitiveDateTime),
    /// Local time of day with the offset in effect when decoded.
    TimeTz(Time, UtcOffset),
    TimestampTz(OffsetDateTime),
    /// Identifier of a blob, its content is read separately.
    Blob(BlobId),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Int128(_) => "int128",
            Value::Decimal(_) => "decimal",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::DecFloat(_) => "decfloat",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::TimeTz(..) => "time with time zone",
            Value::TimestampTz(_) => "timestamp with time zone",
            Value::Blob(_) => "blob",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => b.fmt(f),
            Value::Integer(i) => i.fmt(f),
            Value::Int128(i) => i.fmt(f),
            Value::Decimal(d) => d.fmt(f),
            Value::Float(v) => v.fmt(f),
            Value::Double(v) => v.fmt(f),
            Value::DecFloat(d) => d.fmt(f),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => {
                use crate::ext::FmtExt;
                b.lossy().fmt(f)
            },
            Value::Date(d) => d.fmt(f),
            Value::Time(t) => t.fmt(f),
            Value::Timestamp(t) => t.fmt(f),
            Value::TimeTz(t, o) => write!(f, "{t} {o}"),
            Value::TimestampTz(t) => t.fmt(f),
            Value::Blob(id) => id.fmt(f),
        }
    }
}

fn fixed<const N: usize>(raw: &[u8]) -> Result<[u8; N], DecodeError> {
    raw.get(..N)
        .and_then(|e| e.try_into().ok())
        .ok_or(DecodeError::Length { expect: N, found: raw.len() })
}

fn be_i32(raw: &[u8]) -> Result<i32, DecodeError> {
    fixed(raw).map(i32::from_be_bytes)
}

fn be_u32(raw: &[u8]) -> Result<u32, DecodeError> {
    fixed(raw).map(u32::from_be_bytes)
}

fn be_u16(raw: &[u8]) -> Result<u16, DecodeError> {
    fixed(raw).map(u16::from_be_bytes)
}

/// Apply a column scale to an exact integer.
fn scaled(raw: i128, scale: i32, wide: bool) -> Value {
    if scale < 0 {
        return Value::Decimal(Decimal::new(raw, scale));
    }
    let value = 10i128
        .checked_pow(scale as u32)
        .and_then(|e| raw.checked_mul(e));
    match value {
        Some(v) if !wide => match i64::try_from(v) {
            Ok(v) => Value::Integer(v),
            Err(_) => Value::Decimal(Decimal::new(raw, scale)),
        },
        Some(v) => Value::Int128(v),
        None => Value::Decimal(Decimal::new(raw, scale)),
    }
}

/// Decode a non null wire value described by `desc`.
///
/// `raw` holds exactly the bytes the fetch declared for the field, without
/// padding.
pub fn decode(desc: &Descriptor, raw: Bytes, charset: Charset) -> Result<Value, DecodeError> {
    use sql_type::*;

    let value = match desc.sql_type {
        TEXT | VARYING => match desc.sub_type {
            OCTETS => Value::Bytes(raw),
            _ => Value::Text(charset.decode(&raw).into_owned()),
        },
        SHORT | LONG => scaled(be_i32(&raw)?.into(), desc.scale, false),
        INT64 => scaled(i64::from_be_bytes(fixed(&raw)?).into(), desc.scale, false),
        INT128 => scaled(i128::from_be_bytes(fixed(&raw)?), desc.scale, true),
        FLOAT => Value::Float(f32::from_be_bytes(fixed(&raw)?)),
        DOUBLE | D_FLOAT => Value::Double(f64::from_be_bytes(fixed(&raw)?)),
        DATE => Value::Date(decode_date(be_i32(&raw)?)?),
        TIME => Value::Time(decode_time(be_u32(&raw)?)?),
        TIMESTAMP => Value::Timestamp(timestamp(&raw)?),
        TIMESTAMP_TZ | TIMESTAMP_TZ_EX => {
            let utc = timestamp(&raw)?;
            let offset = zone_offset(desc.sql_type == TIMESTAMP_TZ_EX, &raw[8..], utc)?;
            Value::TimestampTz(utc.assume_utc().to_offset(offset))
        },
        TIME_TZ | TIME_TZ_EX => {
            let utc = TIME_REFERENCE.replace_time(decode_time(be_u32(&raw)?)?);
            let offset = zone_offset(desc.sql_type == TIME_TZ_EX, &raw[4..], utc)?;
            Value::TimeTz(utc.assume_utc().to_offset(offset).time(), offset)
        },
        BOOLEAN => Value::Boolean(fixed::<1>(&raw)?[0] != 0),
        BLOB | ARRAY | QUAD => Value::Blob(BlobId(u64::from_be_bytes(fixed(&raw)?))),
        DEC64 => Value::DecFloat(decfloat::decode_decimal64(fixed(&raw)?)),
        DEC128 => Value::DecFloat(decfloat::decode_decimal128(fixed(&raw)?)),
        DEC_FIXED => match decfloat::decode_fixed(fixed(&raw)?, desc.scale) {
            DecFloat::Finite(d) => Value::Decimal(d),
            special => Value::DecFloat(special),
        },
        NULL => Value::Null,
        other => return Err(DecodeError::OutOfRange(format!("unsupported column type {other}").into())),
    };

    Ok(value)
}

fn timestamp(raw: &[u8]) -> Result<PrimitiveDateTime, DecodeError> {
    let date = decode_date(be_i32(raw)?)?;
    let time = decode_time(be_u32(raw.get(4..).unwrap_or_default())?)?;
    Ok(PrimitiveDateTime::new(date, time))
}

/// Resolve the offset of a zone suffix: a 2 byte zone id, followed by the
/// offset in minutes for the extended forms.
fn zone_offset(extended: bool, raw: &[u8], utc: PrimitiveDateTime) -> Result<UtcOffset, DecodeError> {
    if extended {
        let minutes = be_u16(raw.get(2..).unwrap_or_default())? as i16;
        return UtcOffset::from_whole_seconds(minutes as i32 * 60)
            .map_err(|e| DecodeError::OutOfRange(e.to_string().into()));
    }
    Zone::from_id(be_u16(raw)?)?.offset_at(utc)
}

/// A type that can be sent as a statement parameter.
///
/// Types without a native wire form are sent as their text representation and
/// converted by the server.
pub trait Encode {
    fn encode(self) -> Value;
}

impl Encode for Value {
    fn encode(self) -> Value {
        self
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(self) -> Value {
        match self {
            Some(v) => v.encode(),
            None => Value::Null,
        }
    }
}

macro_rules! encode {
    ($($ty:ty => |$v:ident| $body:expr;)*) => {$(
        impl Encode for $ty {
            fn encode(self) -> Value {
                let $v = self;
                $body
            }
        }

        impl From<$ty> for Value {
            fn from(value: $ty) -> Value {
                value.encode()
            }
        }
    )*};
}

encode! {
    bool => |v| Value::Boolean(v);
    i8 => |v| Value::Integer(v.into());
    i16 => |v| Value::Integer(v.into());
    i32 => |v| Value::Integer(v.into());
    i64 => |v| Value::Integer(v);
    u8 => |v| Value::Integer(v.into());
    u16 => |v| Value::Integer(v.into());
    u32 => |v| Value::Integer(v.into());
    i128 => |v| Value::Int128(v);
    f32 => |v| Value::Float(v);
    f64 => |v| Value::Double(v);
    Decimal => |v| Value::Decimal(v);
    DecFloat => |v| Value::DecFloat(v);
    String => |v| Value::Text(v);
    &str => |v| Value::Text(v.to_owned());
    Bytes => |v| Value::Bytes(v);
    Vec<u8> => |v| Value::Bytes(v.into());
    &[u8] => |v| Value::Bytes(Bytes::copy_from_slice(v));
    Date => |v| Value::Date(v);
    Time => |v| Value::Time(v);
    PrimitiveDateTime => |v| Value::Timestamp(v);
    OffsetDateTime => |v| Value::TimestampTz(v);
    BlobId => |v| Value::Blob(v);
}

#[cfg(test)]
mod test {
    use super::*;
    use time::macros::{datetime, offset, time};

    fn desc(sql_type: i32, scale: i32) -> Descriptor {
        Descriptor { sql_type, scale, ..Default::default() }
    }

    fn dec(sql_type: i32, scale: i32, raw: &[u8]) -> Value {
        decode(&desc(sql_type, scale), Bytes::copy_from_slice(raw), Charset::UTF8).unwrap()
    }

    #[test]
    fn scaled_integers() {
        use sql_type::*;
        assert_eq!(dec(LONG, 0, &(-42i32).to_be_bytes()), Value::Integer(-42));
        assert_eq!(dec(LONG, 2, &5i32.to_be_bytes()), Value::Integer(500));
        assert_eq!(dec(INT64, -2, &(-1250i64).to_be_bytes()), Value::Decimal(Decimal::new(-1250, -2)));
        assert_eq!(dec(SHORT, -1, &7i32.to_be_bytes()).to_string(), "0.7");
    }

    #[test]
    fn int128() {
        let raw = (-170141183460469231731687303715884105728i128).to_be_bytes();
        assert_eq!(dec(sql_type::INT128, 0, &raw), Value::Int128(i128::MIN));
        let raw = 123456789i128.to_be_bytes();
        assert_eq!(dec(sql_type::INT128, -4, &raw).to_string(), "12345.6789");
    }

    #[test]
    fn text_and_octets() {
        let mut d = desc(sql_type::VARYING, 0);
        d.sub_type = OCTETS;
        let raw = Bytes::from_static(&[0xff, 0x00]);
        assert_eq!(decode(&d, raw.clone(), Charset::UTF8).unwrap(), Value::Bytes(raw));
        assert_eq!(dec(sql_type::TEXT, 0, b"abc"), Value::Text("abc".into()));
    }

    #[test]
    fn timestamps() {
        let mut raw = 0i32.to_be_bytes().to_vec();
        raw.extend_from_slice(&(3600u32 * 10_000).to_be_bytes());
        assert_eq!(dec(sql_type::TIMESTAMP, 0, &raw), Value::Timestamp(datetime!(1858-11-17 01:00)));
    }

    #[test]
    fn timestamp_with_zone() {
        let mut raw = 0i32.to_be_bytes().to_vec();
        raw.extend_from_slice(&(3600u32 * 10_000).to_be_bytes());
        raw.extend_from_slice(&(1439u16 + 120).to_be_bytes());
        let Value::TimestampTz(t) = dec(sql_type::TIMESTAMP_TZ, 0, &raw) else { panic!() };
        assert_eq!(t.offset(), offset!(+02:00));
        assert_eq!(t.time(), time!(03:00));

        // extended form carries the offset, zone id is not consulted
        let mut raw = raw.clone();
        raw[8..10].copy_from_slice(&65535u16.to_be_bytes());
        raw.extend_from_slice(&(-60i16).to_be_bytes());
        let Value::TimestampTz(t) = dec(sql_type::TIMESTAMP_TZ_EX, 0, &raw) else { panic!() };
        assert_eq!(t.offset(), offset!(-01:00));
        assert_eq!(t.time(), time!(00:00));
    }

    #[test]
    fn time_with_named_zone() {
        let mut raw = (12u32 * 3600 * 10_000).to_be_bytes().to_vec();
        raw.extend_from_slice(&(65535u16 - 19).to_be_bytes());
        assert_eq!(dec(sql_type::TIME_TZ, 0, &raw), Value::TimeTz(time!(14:00), offset!(+02:00)));
    }

    #[test]
    fn short_buffer_is_error() {
        let err = decode(&desc(sql_type::INT64, 0), Bytes::from_static(&[1, 2]), Charset::UTF8);
        assert!(matches!(err, Err(DecodeError::Length { expect: 8, found: 2 })));
    }

    #[test]
    fn booleans_and_blobs() {
        assert_eq!(dec(sql_type::BOOLEAN, 0, &[1]), Value::Boolean(true));
        assert_eq!(dec(sql_type::BLOB, 0, &[0, 0, 0, 1, 0, 0, 0, 2]), Value::Blob(BlobId(0x1_0000_0002)));
    }
}
