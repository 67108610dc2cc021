//! Message descriptions in binary language representation.
//!
//! Fetch and execute describe the layout of their row message with a small
//! BLR program: a header, one type entry per column each followed by a
//! `short` null indicator entry, and a trailer.
use bytes::{BufMut, Bytes, BytesMut};

use super::{
    ProtocolError,
    consts::{blr, sql_type},
    describe::Descriptor,
};

/// Write the message header for `params` values.
pub fn put_header(buf: &mut BytesMut, params: usize) {
    let len = params * 2;
    buf.put_slice(&[blr::VERSION5, blr::BEGIN, blr::MESSAGE, 0]);
    buf.put_u16_le(len as u16);
}

/// Write the null indicator entry following each value entry.
pub fn put_null_indicator(buf: &mut BytesMut) {
    buf.put_slice(&[blr::SHORT, 0]);
}

pub fn put_trailer(buf: &mut BytesMut) {
    buf.put_slice(&[blr::END, blr::EOC]);
}

/// Build the output message description of prepared columns.
pub fn output_blr(columns: &[Descriptor]) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::with_capacity(columns.len() * 5 + 8);
    put_header(&mut buf, columns.len());

    for col in columns {
        // scale travels as an unsigned byte
        let scale = col.scale as u8;
        let length = col.length as u16;
        match col.sql_type {
            sql_type::VARYING => {
                buf.put_u8(blr::VARYING);
                buf.put_u16_le(length);
            },
            sql_type::TEXT => {
                buf.put_u8(blr::TEXT);
                buf.put_u16_le(length);
            },
            sql_type::LONG => buf.put_slice(&[blr::LONG, scale]),
            sql_type::SHORT => buf.put_slice(&[blr::SHORT, scale]),
            sql_type::INT64 => buf.put_slice(&[blr::INT64, scale]),
            sql_type::INT128 | sql_type::DEC_FIXED => buf.put_slice(&[blr::INT128, scale]),
            sql_type::QUAD => buf.put_slice(&[blr::QUAD, scale]),
            sql_type::BLOB | sql_type::ARRAY => buf.put_slice(&[blr::QUAD, 0]),
            sql_type::DOUBLE => buf.put_u8(blr::DOUBLE),
            sql_type::FLOAT => buf.put_u8(blr::FLOAT),
            sql_type::D_FLOAT => buf.put_u8(blr::D_FLOAT),
            sql_type::DATE => buf.put_u8(blr::SQL_DATE),
            sql_type::TIME => buf.put_u8(blr::SQL_TIME),
            sql_type::TIMESTAMP => buf.put_u8(blr::TIMESTAMP),
            sql_type::BOOLEAN => buf.put_u8(blr::BOOL),
            sql_type::DEC64 => buf.put_u8(blr::DEC64),
            sql_type::DEC128 => buf.put_u8(blr::DEC128),
            sql_type::TIME_TZ => buf.put_u8(blr::SQL_TIME_TZ),
            sql_type::TIMESTAMP_TZ => buf.put_u8(blr::TIMESTAMP_TZ),
            sql_type::TIME_TZ_EX => buf.put_u8(blr::EX_TIME_TZ),
            sql_type::TIMESTAMP_TZ_EX => buf.put_u8(blr::EX_TIMESTAMP_TZ),
            // NULL literal columns are described as empty text
            sql_type::NULL => {
                buf.put_u8(blr::TEXT);
                buf.put_u16_le(0);
            },
            other => return Err(ProtocolError::UnsupportedType(other)),
        }
        put_null_indicator(&mut buf);
    }

    put_trailer(&mut buf);
    Ok(buf.freeze())
}

#[cfg(test)]
mod test {
    use super::*;

    fn col(sql_type: i32, scale: i32, length: i32) -> Descriptor {
        Descriptor { sql_type, scale, length, ..Default::default() }
    }

    #[test]
    fn blr_of_int_and_varchar() {
        let blr = output_blr(&[col(sql_type::LONG, 0, 4), col(sql_type::VARYING, 0, 300)]).unwrap();
        assert_eq!(
            &blr[..],
            &[5, 2, 4, 0, 4, 0, 8, 0, 7, 0, 37, 44, 1, 7, 0, 255, 76]
        );
    }

    #[test]
    fn negative_scale_is_byte() {
        let blr = output_blr(&[col(sql_type::INT64, -2, 8)]).unwrap();
        assert_eq!(&blr[6..8], &[16, 254]);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(output_blr(&[col(1, 0, 0)]).is_err());
    }
}
