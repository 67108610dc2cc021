//! Server responses.
//!
//! Responses are decoded straight from the [`Channel`], since most layouts
//! are only known after reading part of them.
use bytes::Bytes;

use super::{
    DatabaseError, consts::arg, op,
    status::StatusBuilder,
};
use crate::{Result, channel::Channel, common::verbose};

/// A type that can be decoded from a server response body.
pub trait BackendProtocol: Sized {
    /// Response opcode.
    const OPCODE: u32;

    /// Read the response body, the opcode already consumed.
    fn decode(ch: &mut Channel) -> impl Future<Output = Result<Self>>;
}

/// Generic response, `op_response`.
#[derive(Debug)]
pub struct Response {
    /// Object handle, the meaning depends on the request.
    pub handle: u32,
    /// Object id, blob id for `create_blob2`.
    pub oid: u64,
    pub buffer: Bytes,
    pub status: Option<DatabaseError>,
}

impl Response {
    /// Turn a non empty status vector into an error.
    ///
    /// The buffer may still carry data when the status reports an error, it is
    /// discarded.
    pub fn into_result(self) -> Result<Response, DatabaseError> {
        match self.status {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

impl BackendProtocol for Response {
    const OPCODE: u32 = op::RESPONSE;

    async fn decode(ch: &mut Channel) -> Result<Self> {
        let handle = ch.read_u32().await?;
        let oid = ch.read_u64().await?;
        let buffer = ch.read_xdr_bytes().await?;
        let status = read_status(ch).await?;
        Ok(Response { handle, oid, buffer, status })
    }
}

/// Read a status vector, returns [`None`] when it carries no error.
pub async fn read_status(ch: &mut Channel) -> Result<Option<DatabaseError>> {
    let mut status = StatusBuilder::new();
    loop {
        match ch.read_u32().await? {
            arg::END => break,
            arg::GDS => status.gds(ch.read_u32().await?),
            arg::WARNING => status.warning(ch.read_u32().await?),
            arg::NUMBER => status.number(ch.read_i32().await?),
            arg::STRING | arg::CSTRING => status.string(&ch.read_xdr_string().await?),
            arg::INTERPRETED => status.interpreted(&ch.read_xdr_string().await?),
            arg::SQL_STATE => status.sql_state(&ch.read_xdr_string().await?),
            // unknown argument still carries a word
            _ => {
                ch.read_u32().await?;
            },
        }
    }
    Ok(status.finish())
}

/// Protocol accepted by the server, `op_accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accept {
    /// Masked with [`FB_PROTOCOL_MASK`][super::consts::FB_PROTOCOL_MASK] flag kept.
    pub version: u32,
    pub architecture: u32,
    /// Accepted connection type and flags.
    pub ptype: u32,
}

impl BackendProtocol for Accept {
    const OPCODE: u32 = op::ACCEPT;

    async fn decode(ch: &mut Channel) -> Result<Self> {
        let version = ch.read_u32().await? & 0xFFFF;
        let architecture = ch.read_u32().await?;
        let ptype = ch.read_u32().await?;
        verbose!(version, architecture, ptype, "accept");
        Ok(Accept { version, architecture, ptype })
    }
}

/// Accept carrying authentication data, `op_accept_data` and `op_cond_accept`.
#[derive(Debug)]
pub struct AcceptData {
    pub accept: Accept,
    /// Plugin specific challenge.
    pub data: Bytes,
    pub plugin: String,
    pub authenticated: bool,
    /// Wire crypt key list.
    pub keys: Bytes,
}

impl AcceptData {
    /// Read the body of either accept variant.
    pub async fn decode(ch: &mut Channel) -> Result<Self> {
        let accept = Accept::decode(ch).await?;
        let data = ch.read_xdr_bytes().await?;
        let plugin = ch.read_xdr_string().await?;
        let authenticated = ch.read_u32().await? != 0;
        let keys = ch.read_xdr_bytes().await?;
        Ok(AcceptData { accept, data, plugin, authenticated, keys })
    }
}

/// Continued authentication challenge, `op_cont_auth`.
#[derive(Debug)]
pub struct ContAuth {
    pub data: Bytes,
    pub plugin: String,
    pub plugin_list: String,
    pub keys: Bytes,
}

impl BackendProtocol for ContAuth {
    const OPCODE: u32 = op::CONT_AUTH;

    async fn decode(ch: &mut Channel) -> Result<Self> {
        let data = ch.read_xdr_bytes().await?;
        let plugin = ch.read_xdr_string().await?;
        let plugin_list = ch.read_xdr_string().await?;
        let keys = ch.read_xdr_bytes().await?;
        Ok(ContAuth { data, plugin, plugin_list, keys })
    }
}

/// Row count of a singleton result, `op_sql_response`.
///
/// The row message follows when `count` is not zero.
#[derive(Debug)]
pub struct SqlResponse {
    pub count: u32,
}

impl BackendProtocol for SqlResponse {
    const OPCODE: u32 = op::SQL_RESPONSE;

    async fn decode(ch: &mut Channel) -> Result<Self> {
        Ok(SqlResponse { count: ch.read_u32().await? })
    }
}

/// Fetch batch header, `op_fetch_response`.
///
/// A row message follows when `count` is not zero.
#[derive(Debug)]
pub struct FetchResponse {
    pub status: u32,
    pub count: u32,
}

impl BackendProtocol for FetchResponse {
    const OPCODE: u32 = op::FETCH_RESPONSE;

    async fn decode(ch: &mut Channel) -> Result<Self> {
        let status = ch.read_u32().await?;
        let count = ch.read_u32().await?;
        Ok(FetchResponse { status, count })
    }
}

/// Event counts pushed on the auxiliary connection, `op_event`.
#[derive(Debug)]
pub struct Event {
    pub db: u32,
    /// Event parameter block with the current counts.
    pub epb: Bytes,
    pub ast: u64,
    pub event_id: u32,
}

impl BackendProtocol for Event {
    const OPCODE: u32 = op::EVENT;

    async fn decode(ch: &mut Channel) -> Result<Self> {
        let db = ch.read_u32().await?;
        let epb = ch.read_xdr_bytes().await?;
        let ast = ch.read_u64().await?;
        let event_id = ch.read_u32().await?;
        Ok(Event { db, epb, ast, event_id })
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::{channel::test::pair, ext::BufMutExt};

    #[tokio::test]
    async fn response_with_error() {
        let (mut ch, mut peer) = pair();
        let mut buf = BytesMut::new();
        buf.put_u32(op::RESPONSE);
        buf.put_u32(0);
        buf.put_u64(0);
        buf.put_xdr_bytes(b"");
        buf.put_u32(arg::GDS);
        buf.put_u32(335544569);
        buf.put_u32(arg::GDS);
        buf.put_u32(335544436);
        buf.put_u32(arg::NUMBER);
        buf.put_i32(-204);
        buf.put_u32(arg::GDS);
        buf.put_u32(335544580);
        buf.put_u32(arg::SQL_STATE);
        buf.put_xdr_str("42S02");
        buf.put_u32(arg::END);
        peer.write_all(&buf).await.unwrap();

        let res = ch.recv::<Response>().await.unwrap();
        let err = res.into_result().unwrap_err();
        assert_eq!(err.sql_code(), -204);
        assert_eq!(err.sql_state(), Some("42S02"));
        assert_eq!(err.message(), "Dynamic SQL Error\nSQL error code = -204\nTable unknown");
    }

    #[tokio::test]
    async fn dummy_is_skipped() {
        let (mut ch, mut peer) = pair();
        let mut buf = BytesMut::new();
        buf.put_u32(op::DUMMY);
        buf.put_u32(op::RESPONSE);
        buf.put_u32(7);
        buf.put_u64(42);
        buf.put_xdr_bytes(b"abcde");
        buf.put_u32(arg::GDS);
        buf.put_u32(0);
        buf.put_u32(arg::END);
        peer.write_all(&buf).await.unwrap();

        let res = ch.recv::<Response>().await.unwrap().into_result().unwrap();
        assert_eq!(res.handle, 7);
        assert_eq!(res.oid, 42);
        assert_eq!(&res.buffer[..], b"abcde");
    }

    #[tokio::test]
    async fn error_response_instead_of_expected() {
        let (mut ch, mut peer) = pair();
        let mut buf = BytesMut::new();
        buf.put_u32(op::RESPONSE);
        buf.put_u32(0);
        buf.put_u64(0);
        buf.put_xdr_bytes(b"");
        buf.put_u32(arg::GDS);
        buf.put_u32(335544345);
        buf.put_u32(arg::END);
        peer.write_all(&buf).await.unwrap();

        let err = ch.recv::<FetchResponse>().await.unwrap_err();
        assert!(err.as_database().is_some());
    }

    #[tokio::test]
    async fn event_layout() {
        let (mut ch, mut peer) = pair();
        let mut buf = BytesMut::new();
        buf.put_u32(op::EVENT);
        buf.put_u32(1);
        buf.put_xdr_bytes(&[1, 3, b'f', b'o', b'o', 5, 0, 0, 0]);
        buf.put_u64(0);
        buf.put_u32(9);
        peer.write_all(&buf).await.unwrap();

        let ev = ch.recv::<Event>().await.unwrap();
        assert_eq!(ev.event_id, 9);
        assert_eq!(ev.epb.len(), 9);
    }
}
