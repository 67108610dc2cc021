//! Statement parameter encoding.
//!
//! Parameters travel as one message described by a BLR program built from
//! the values themselves: integers as `long` or `int64`, floats as `double`,
//! strings as `text` of their exact length and exact numerics without a
//! native form as text converted by the server. Protocol 13 and later put a
//! null bitmap in front of the message, older ones follow each value with a
//! null indicator word.
use bytes::{BufMut, Bytes, BytesMut};
use time::UtcOffset;

use crate::{
    Result,
    error::Error,
    ext::BufMutExt,
    firebird::{
        blr::{put_header, put_null_indicator, put_trailer},
        consts::{PROTOCOL_VERSION13, blr},
    },
    types::{
        Charset,
        datetime::{encode_date, encode_time},
        timezone::{TIME_REFERENCE, offset_id},
    },
    value::Value,
};

/// Encoded parameter message.
#[derive(Debug, Default)]
pub struct Params {
    pub blr: Bytes,
    pub values: Bytes,
}

/// Encode `params` into their message description and values.
pub fn encode_params(params: &[Value], protocol: u32, charset: Charset) -> Result<Params> {
    if params.is_empty() {
        return Ok(Params::default());
    }

    let mut blr = BytesMut::with_capacity(params.len() * 5 + 8);
    let mut values = BytesMut::with_capacity(params.len() * 8);
    let bitmap = protocol >= PROTOCOL_VERSION13;

    put_header(&mut blr, params.len());

    if bitmap {
        let nulls = null_bitmap(params);
        values.put_slice(&nulls);
        values.put_xdr_pad(nulls.len());
    }

    for param in params {
        put_value(&mut blr, &mut values, param, charset)?;
        put_null_indicator(&mut blr);
        if !bitmap {
            values.put_i32(if param.is_null() { -1 } else { 0 });
        }
    }

    put_trailer(&mut blr);
    Ok(Params { blr: blr.freeze(), values: values.freeze() })
}

/// One bit per parameter, least significant bit first.
fn null_bitmap(params: &[Value]) -> Vec<u8> {
    let mut nulls = vec![0u8; params.len().div_ceil(8)];
    for (i, param) in params.iter().enumerate() {
        if param.is_null() {
            nulls[i / 8] |= 1 << (i % 8);
        }
    }
    nulls
}

fn put_value(blr: &mut BytesMut, values: &mut BytesMut, value: &Value, charset: Charset) -> Result<()> {
    match value {
        Value::Null => blr.put_slice(&[blr::TEXT, 0, 0]),
        Value::Boolean(b) => {
            blr.put_u8(blr::BOOL);
            values.put_slice(&[*b as u8, 0, 0, 0]);
        },
        Value::Integer(i) => match i32::try_from(*i) {
            Ok(i) => {
                blr.put_slice(&[blr::LONG, 0]);
                values.put_i32(i);
            },
            Err(_) => {
                blr.put_slice(&[blr::INT64, 0]);
                values.put_i64(*i);
            },
        },
        Value::Float(f) => {
            blr.put_u8(blr::DOUBLE);
            values.put_f64(*f as f64);
        },
        Value::Double(f) => {
            blr.put_u8(blr::DOUBLE);
            values.put_f64(*f);
        },
        Value::Int128(_) | Value::Decimal(_) | Value::DecFloat(_) => {
            put_text(blr, values, value.to_string().as_bytes())?
        },
        Value::Text(text) => put_text(blr, values, &charset.encode(text))?,
        Value::Bytes(bytes) => put_text(blr, values, bytes)?,
        Value::Date(date) => {
            blr.put_u8(blr::SQL_DATE);
            values.put_i32(encode_date(*date));
        },
        Value::Time(time) => {
            blr.put_u8(blr::SQL_TIME);
            values.put_u32(encode_time(*time));
        },
        Value::Timestamp(ts) => {
            blr.put_u8(blr::TIMESTAMP);
            values.put_i32(encode_date(ts.date()));
            values.put_u32(encode_time(ts.time()));
        },
        Value::TimeTz(time, offset) => {
            let utc = TIME_REFERENCE
                .replace_time(*time)
                .assume_offset(*offset)
                .to_offset(UtcOffset::UTC);
            blr.put_u8(blr::SQL_TIME_TZ);
            values.put_u32(encode_time(utc.time()));
            values.put_u16(offset_id(*offset));
            values.put_u16(0);
        },
        Value::TimestampTz(ts) => {
            let utc = ts.to_offset(UtcOffset::UTC);
            blr.put_u8(blr::TIMESTAMP_TZ);
            values.put_i32(encode_date(utc.date()));
            values.put_u32(encode_time(utc.time()));
            values.put_u16(offset_id(ts.offset()));
            values.put_u16(0);
        },
        Value::Blob(id) => {
            blr.put_slice(&[blr::QUAD, 0]);
            values.put_u64(id.0);
        },
    }
    Ok(())
}

fn put_text(blr: &mut BytesMut, values: &mut BytesMut, bytes: &[u8]) -> Result<()> {
    let Ok(len) = u16::try_from(bytes.len()) else {
        return Err(Error::validation(format!(
            "inline parameter of {} bytes exceeds 65535 bytes",
            bytes.len()
        )));
    };
    blr.put_u8(blr::TEXT);
    blr.put_u16_le(len);
    values.put_slice(bytes);
    values.put_xdr_pad(bytes.len());
    Ok(())
}
