//! Row messages.
//!
//! Fetch responses and singleton results carry rows in the layout described
//! by the output BLR. Protocol 13 and later start each row with a null bitmap
//! and omit null values, older versions send every value followed by a null
//! indicator word.
use bytes::Bytes;
use std::sync::Arc;

use crate::{
    Result, Row,
    channel::Channel,
    firebird::{
        ProtocolError,
        consts::PROTOCOL_VERSION13,
        describe::{Descriptor, WireLength},
    },
    row::DecodeError,
    types::Charset,
    value::{self, Value},
};

/// Undecoded row, [`None`] for null values.
pub type RawRow = Vec<Option<Bytes>>;

/// Read one row message.
pub async fn read_raw(ch: &mut Channel, columns: &[Descriptor], protocol: u32) -> Result<RawRow> {
    let mut raw = Vec::with_capacity(columns.len());

    if protocol >= PROTOCOL_VERSION13 {
        let bitmap = ch.read_aligned(columns.len().div_ceil(8)).await?;
        for (i, col) in columns.iter().enumerate() {
            if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                raw.push(None);
                continue;
            }
            raw.push(Some(read_field(ch, col).await?));
        }
    } else {
        for col in columns {
            let value = read_field(ch, col).await?;
            let null = ch.read_i32().await? != 0;
            raw.push((!null).then_some(value));
        }
    }

    Ok(raw)
}

async fn read_field(ch: &mut Channel, col: &Descriptor) -> Result<Bytes> {
    let len = match col.wire_length()? {
        WireLength::Fixed(len) => len,
        WireLength::Varying => {
            let len = ch.read_u32().await? as usize;
            if len > col.length.max(0) as usize {
                return Err(ProtocolError::malformed(format!(
                    "value of {len} bytes exceeds declared length {}",
                    col.length
                ))
                .into());
            }
            len
        },
    };
    ch.read_aligned(len).await
}

/// Decode a raw row against its columns.
pub fn decode_row(
    columns: &Arc<[Descriptor]>,
    raw: RawRow,
    charset: Charset,
) -> Result<Row, DecodeError> {
    let values = columns
        .iter()
        .zip(raw)
        .map(|(col, raw)| match raw {
            Some(raw) => value::decode(col, raw, charset),
            None => Ok(Value::Null),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Row::new(columns.clone(), values))
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::{
        channel::test::pair,
        ext::BufMutExt,
        firebird::consts::{PROTOCOL_VERSION10, PROTOCOL_VERSION16, sql_type},
    };

    fn columns(n: usize) -> Arc<[Descriptor]> {
        (0..n)
            .map(|i| Descriptor {
                sql_type: if i % 3 == 0 { sql_type::VARYING } else { sql_type::LONG },
                length: 10,
                field: format!("C{i}"),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn null_bitmap_of_eleven_columns() {
        let cols = columns(11);
        let (mut ch, mut peer) = pair();

        // odd columns are null
        let mut buf = BytesMut::new();
        buf.put_slice(&[0b1010_1010, 0b0000_0010]);
        buf.put_xdr_pad(2);
        for (i, col) in cols.iter().enumerate() {
            if i % 2 == 1 {
                continue;
            }
            match col.sql_type {
                sql_type::VARYING => buf.put_xdr_str(&format!("v{i}")),
                _ => buf.put_i32(i as i32),
            }
        }
        peer.write_all(&buf).await.unwrap();

        let raw = read_raw(&mut ch, &cols, PROTOCOL_VERSION16).await.unwrap();
        let row = decode_row(&cols, raw, Charset::UTF8).unwrap();
        for (i, value) in row.values().iter().enumerate() {
            match (i % 2, i % 3) {
                (1, _) => assert_eq!(value, &Value::Null, "column {i}"),
                (_, 0) => assert_eq!(value, &Value::Text(format!("v{i}"))),
                _ => assert_eq!(value, &Value::Integer(i as i64)),
            }
        }
    }

    #[tokio::test]
    async fn null_indicators_before_protocol_13() {
        let cols = columns(2);
        let (mut ch, mut peer) = pair();

        let mut buf = BytesMut::new();
        buf.put_xdr_str("abc");
        buf.put_i32(0);
        buf.put_i32(0);
        buf.put_i32(-1);
        peer.write_all(&buf).await.unwrap();

        let raw = read_raw(&mut ch, &cols, PROTOCOL_VERSION10).await.unwrap();
        let row = decode_row(&cols, raw, Charset::UTF8).unwrap();
        assert_eq!(row.values(), &[Value::Text("abc".into()), Value::Null]);
    }

    #[tokio::test]
    async fn zero_length_varying() {
        let cols = columns(1);
        let (mut ch, mut peer) = pair();

        let mut buf = BytesMut::new();
        buf.put_slice(&[0, 0, 0, 0]);
        buf.put_u32(0);
        buf.put_u32(7);
        peer.write_all(&buf).await.unwrap();

        let raw = read_raw(&mut ch, &cols, PROTOCOL_VERSION16).await.unwrap();
        assert_eq!(raw, vec![Some(Bytes::new())]);
        // next word is untouched
        assert_eq!(ch.read_u32().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn varying_longer_than_declared() {
        let cols = columns(1);
        let (mut ch, mut peer) = pair();

        let mut buf = BytesMut::new();
        buf.put_slice(&[0, 0, 0, 0]);
        buf.put_u32(11);
        peer.write_all(&buf).await.unwrap();

        assert!(read_raw(&mut ch, &cols, PROTOCOL_VERSION16).await.is_err());
    }
}
