//! Prepared statements.
//!
//! A statement is allocated and prepared in one round trip when the server
//! accepts lazy responses. The describe buffer returned by prepare may be
//! truncated, the remaining columns are then requested with info requests
//! until the whole descriptor array is filled.
use bytes::Bytes;
use std::sync::Arc;

use crate::{
    Result, Row,
    common::verbose,
    connection::Connection,
    encode::Params,
    fetch,
    firebird::{
        ProtocolError,
        backend::{FetchResponse, SqlResponse},
        blr,
        consts::{DSQL_CLOSE, DSQL_DROP, FETCH_EXHAUSTED, INVALID_OBJECT, info},
        describe::{self, Descriptor, StatementKind},
        frontend,
        pb::ParamReader,
    },
};

/// A prepared statement.
#[derive(Debug)]
pub struct Statement {
    handle: u32,
    kind: StatementKind,
    columns: Arc<[Descriptor]>,
    output_blr: Bytes,
}

impl Statement {
    /// Allocate and prepare `sql` in transaction `tr`.
    pub(crate) async fn prepare(conn: &mut Connection, tr: u32, sql: &str) -> Result<Statement> {
        let sql = conn.charset().encode(sql).into_owned();
        let items = describe::prepare_items();
        let buffer_length = conn.config().buffer_length;

        conn.send(frontend::AllocateStatement { handle: conn.db_handle() });
        let handle = if conn.is_lazy() {
            // the server substitutes the statement allocated just before
            conn.send(frontend::PrepareStatement {
                tr,
                stmt: INVALID_OBJECT,
                sql: &sql,
                items: &items,
                buffer_length,
            });
            match conn.recv_response().await {
                Ok(res) => res.handle,
                Err(err) => {
                    // prepare response is still pending
                    conn.forget_response();
                    return Err(err);
                },
            }
        } else {
            let handle = conn.recv_response().await?.handle;
            conn.send(frontend::PrepareStatement { tr, stmt: handle, sql: &sql, items: &items, buffer_length });
            handle
        };

        let described = match conn.recv_response().await {
            Ok(res) => describe(conn, handle, res.buffer, buffer_length).await,
            Err(err) => Err(err),
        };
        let (kind, columns) = match described {
            Ok(ok) => ok,
            Err(err) => {
                conn.send(frontend::FreeStatement { stmt: handle, mode: DSQL_DROP });
                conn.forget_response();
                return Err(err);
            },
        };

        let output_blr = blr::output_blr(&columns)?;
        verbose!(handle, ?kind, columns = columns.len(), "prepared");

        Ok(Statement { handle, kind, columns: columns.into(), output_blr })
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Output column descriptors.
    pub fn columns(&self) -> &[Descriptor] {
        &self.columns
    }

    pub(crate) fn has_cursor(&self) -> bool {
        self.kind.has_cursor()
    }

    /// Execute with encoded `params`.
    ///
    /// Procedure calls with output columns return their single row here
    /// instead of through a cursor.
    pub(crate) async fn execute(&self, conn: &mut Connection, tr: u32, params: &Params) -> Result<Option<Row>> {
        let protocol = conn.protocol();
        let input = frontend::Params { blr: &params.blr, values: &params.values };

        if self.kind != StatementKind::ExecProcedure || self.columns.is_empty() {
            conn.send(frontend::Execute { stmt: self.handle, tr, params: input, protocol });
            conn.recv_response().await?;
            return Ok(None);
        }

        conn.send(frontend::Execute2 {
            stmt: self.handle,
            tr,
            params: input,
            output_blr: &self.output_blr,
            protocol,
        });
        let res = conn.recv::<SqlResponse>().await?;
        let raw = match res.count {
            0 => None,
            _ => Some(fetch::read_raw(conn.channel(), &self.columns, protocol).await?),
        };
        conn.recv_response().await?;

        match raw {
            Some(raw) => Ok(Some(fetch::decode_row(&self.columns, raw, conn.charset())?)),
            None => Ok(None),
        }
    }

    /// Fetch up to `count` rows.
    ///
    /// The flag is `false` when the cursor is exhausted.
    pub(crate) async fn fetch(&self, conn: &mut Connection, count: u32) -> Result<(Vec<Row>, bool)> {
        let protocol = conn.protocol();
        conn.send(frontend::Fetch { stmt: self.handle, blr: &self.output_blr, count });

        let mut batch = Vec::new();
        let mut res = conn.recv::<FetchResponse>().await?;
        while res.count > 0 {
            batch.push(fetch::read_raw(conn.channel(), &self.columns, protocol).await?);
            res = conn.channel().recv::<FetchResponse>().await?;
        }
        verbose!(rows = batch.len(), status = res.status, "fetched");

        // the batch is read in full before decoding, the wire stays in sync
        let charset = conn.charset();
        let rows = batch
            .into_iter()
            .map(|raw| fetch::decode_row(&self.columns, raw, charset))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, res.status != FETCH_EXHAUSTED))
    }

    /// Rows changed by the last execution.
    pub(crate) async fn rows_affected(&self, conn: &mut Connection) -> Result<u64> {
        conn.send(frontend::InfoSql {
            handle: self.handle,
            items: &[info::SQL_RECORDS, info::END],
            buffer_length: conn.config().buffer_length,
        });
        let buffer = conn.recv_response().await?.buffer;
        Ok(parse_records(buffer)?)
    }

    /// Close the open cursor, the statement stays prepared.
    pub(crate) async fn close_cursor(&self, conn: &mut Connection) -> Result<()> {
        conn.send(frontend::FreeStatement { stmt: self.handle, mode: DSQL_CLOSE });
        conn.defer_response().await
    }

    /// Close the open cursor where awaiting is impossible.
    pub(crate) fn forget_cursor(&self, conn: &mut Connection) {
        conn.send(frontend::FreeStatement { stmt: self.handle, mode: DSQL_CLOSE });
        conn.forget_response();
    }

    /// Release the statement on the server, the response is read with the
    /// next request.
    pub(crate) fn release(self, conn: &mut Connection) {
        verbose!(handle = self.handle, "release statement");
        conn.send(frontend::FreeStatement { stmt: self.handle, mode: DSQL_DROP });
        conn.forget_response();
    }
}

/// Parse a prepare buffer, requesting the columns the server truncated.
async fn describe(
    conn: &mut Connection,
    handle: u32,
    buffer: Bytes,
    buffer_length: u32,
) -> Result<(StatementKind, Vec<Descriptor>)> {
    let described = describe::parse_prepare(buffer)?;
    let mut columns = described.columns;
    let mut truncated = described.truncated_at;

    while let Some(index) = truncated {
        verbose!(index, "describe continuation");
        conn.send(frontend::InfoSql {
            handle,
            items: &describe::continuation_items(index),
            buffer_length,
        });
        let buffer = conn.recv_response().await?.buffer;
        truncated = describe::parse_continuation(buffer, &mut columns)?;
        if truncated.is_some_and(|next| next <= index) {
            return Err(ProtocolError::malformed("describe continuation made no progress").into());
        }
    }

    Ok((described.kind, columns))
}

/// Sum of inserted, updated and deleted rows of a records info buffer.
fn parse_records(buffer: Bytes) -> Result<u64, ProtocolError> {
    let mut r = ParamReader::new(buffer);
    if r.next_tag() != Some(info::SQL_RECORDS) {
        return Ok(0);
    }

    let mut items = ParamReader::new(r.get_bytes()?);
    let mut count = 0;
    while let Some(tag) = items.next_tag() {
        match tag {
            info::REQ_INSERT_COUNT | info::REQ_UPDATE_COUNT | info::REQ_DELETE_COUNT => {
                count += items.get_int()? as u64;
            },
            info::REQ_SELECT_COUNT => {
                items.get_int()?;
            },
            info::END => break,
            tag => return Err(ProtocolError::malformed(format!("unknown records item {tag}"))),
        }
    }
    Ok(count)
}

#[cfg(test)]
pub(crate) mod test {
    use bytes::{BufMut, BytesMut};
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::{
        connection::test::{mock, ok_response, sent},
        ext::BufMutExt,
        firebird::{
            consts::{PROTOCOL_VERSION13, PROTOCOL_VERSION16, sql_type},
            describe::test::DescribeWriter,
            op,
        },
        value::Value,
    };

    /// Server side records info buffer.
    pub(crate) fn records(insert: i32, update: i32) -> Vec<u8> {
        let mut inner = DescribeWriter::new();
        inner
            .int(info::REQ_SELECT_COUNT, 9)
            .int(info::REQ_INSERT_COUNT, insert)
            .int(info::REQ_UPDATE_COUNT, update)
            .int(info::REQ_DELETE_COUNT, 0)
            .tag(info::END);
        let inner = inner.freeze();
        let mut buf = vec![info::SQL_RECORDS];
        buf.extend((inner.len() as u16).to_le_bytes());
        buf.extend(&inner[..]);
        buf.push(info::END);
        buf
    }

    /// Prepare response of `select a, b from t`.
    pub(crate) fn select_ab() -> Bytes {
        DescribeWriter::new()
            .int(info::SQL_STMT_TYPE, 1)
            .select(2)
            .column(1, sql_type::LONG, 4, "A")
            .column(2, sql_type::VARYING, 4, "B")
            .tag(info::END)
            .freeze()
    }

    /// Fetch batch of `(i, s)` rows for [`select_ab`] on protocol 13 and later.
    pub(crate) fn ab_rows(buf: &mut BytesMut, rows: &[(i32, &str)], status: u32) {
        for (i, s) in rows {
            buf.put_u32(op::FETCH_RESPONSE);
            buf.put_u32(0);
            buf.put_u32(1);
            buf.put_slice(&[0, 0, 0, 0]);
            buf.put_i32(*i);
            buf.put_xdr_str(s);
        }
        buf.put_u32(op::FETCH_RESPONSE);
        buf.put_u32(status);
        buf.put_u32(0);
    }

    #[tokio::test]
    async fn lazy_prepare_is_pipelined() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, true);
        let mut buf = BytesMut::new();
        ok_response(&mut buf, 21, b"");
        ok_response(&mut buf, 0, &select_ab());
        peer.write_all(&buf).await.unwrap();

        let stmt = Statement::prepare(&mut conn, 4, "select a, b from t").await.unwrap();
        assert_eq!(stmt.handle(), 21);
        assert_eq!(stmt.kind(), StatementKind::Select);
        assert_eq!(stmt.columns()[1].name(), "B");

        let out = sent(&mut peer).await;
        assert_eq!(&out[..4], &op::ALLOCATE_STATEMENT.to_be_bytes());
        assert_eq!(&out[8..12], &op::PREPARE_STATEMENT.to_be_bytes());
        assert_eq!(&out[16..20], &INVALID_OBJECT.to_be_bytes());
    }

    #[tokio::test]
    async fn truncated_describe_continues() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, false);

        let first = DescribeWriter::new()
            .int(info::SQL_STMT_TYPE, 1)
            .select(3)
            .column(1, sql_type::LONG, 4, "A")
            .int(info::SQL_SQLDA_SEQ, 2)
            .int(info::SQL_TYPE, sql_type::VARYING)
            .tag(info::TRUNCATED)
            .freeze();
        let rest = DescribeWriter::new()
            .select(3)
            .column(2, sql_type::VARYING, 8, "B")
            .column(3, sql_type::INT64, 8, "C")
            .tag(info::END)
            .freeze();

        let mut buf = BytesMut::new();
        ok_response(&mut buf, 8, b"");
        ok_response(&mut buf, 0, &first);
        ok_response(&mut buf, 0, &rest);
        peer.write_all(&buf).await.unwrap();

        let stmt = Statement::prepare(&mut conn, 4, "select a, b, c from t").await.unwrap();
        let names: Vec<_> = stmt.columns().iter().map(Descriptor::name).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(stmt.columns()[1].length, 8);
        assert_eq!(stmt.columns()[2].sql_type, sql_type::INT64);
    }

    fn error_response(buf: &mut BytesMut) {
        buf.put_u32(op::RESPONSE);
        buf.put_u32(0);
        buf.put_u64(0);
        buf.put_xdr_bytes(b"");
        buf.put_u32(crate::firebird::consts::arg::GDS);
        buf.put_u32(335544569);
        buf.put_u32(crate::firebird::consts::arg::END);
    }

    /// Assert the last request sent dropped statement `handle`.
    async fn assert_dropped(conn: &mut Connection, peer: &mut tokio::io::DuplexStream, handle: u32) {
        conn.channel().flush().await.unwrap();
        let out = sent(peer).await;
        let tail = &out[out.len() - 12..];
        assert_eq!(&tail[..4], &op::FREE_STATEMENT.to_be_bytes());
        assert_eq!(&tail[4..8], &handle.to_be_bytes());
        assert_eq!(&tail[8..], &DSQL_DROP.to_be_bytes());
    }

    #[tokio::test]
    async fn failed_prepare_frees_statement() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, false);
        let mut buf = BytesMut::new();
        ok_response(&mut buf, 8, b"");
        error_response(&mut buf);
        peer.write_all(&buf).await.unwrap();

        let err = Statement::prepare(&mut conn, 4, "selec").await.unwrap_err();
        assert!(err.as_database().is_some());
        assert_dropped(&mut conn, &mut peer, 8).await;
    }

    #[tokio::test]
    async fn failed_lazy_allocate_skips_the_prepare_response() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, true);
        let mut buf = BytesMut::new();
        error_response(&mut buf);
        error_response(&mut buf);
        ok_response(&mut buf, 0, b"");
        peer.write_all(&buf).await.unwrap();

        let err = Statement::prepare(&mut conn, 4, "selec").await.unwrap_err();
        assert!(err.as_database().is_some());
        // the stale prepare error is drained before the ping response
        conn.ping().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_describe_frees_statement() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, false);
        let mut buf = BytesMut::new();
        ok_response(&mut buf, 8, b"");
        ok_response(&mut buf, 0, &[200]);
        peer.write_all(&buf).await.unwrap();

        let err = Statement::prepare(&mut conn, 4, "select a from t").await.unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::Protocol(_)));
        assert_dropped(&mut conn, &mut peer, 8).await;
    }

    #[tokio::test]
    async fn failed_describe_continuation_frees_statement() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, false);
        let first = DescribeWriter::new()
            .int(info::SQL_STMT_TYPE, 1)
            .select(2)
            .column(1, sql_type::LONG, 4, "A")
            .int(info::SQL_SQLDA_SEQ, 2)
            .tag(info::TRUNCATED)
            .freeze();

        let mut buf = BytesMut::new();
        ok_response(&mut buf, 8, b"");
        ok_response(&mut buf, 0, &first);
        error_response(&mut buf);
        peer.write_all(&buf).await.unwrap();

        let err = Statement::prepare(&mut conn, 4, "select a, b from t").await.unwrap_err();
        assert!(err.as_database().is_some());
        assert_dropped(&mut conn, &mut peer, 8).await;
    }

    #[tokio::test]
    async fn fetch_batches() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, false);
        let stmt = Statement {
            handle: 1,
            kind: StatementKind::Select,
            columns: describe::parse_prepare(select_ab()).unwrap().columns.into(),
            output_blr: Bytes::new(),
        };

        let mut buf = BytesMut::new();
        ab_rows(&mut buf, &[(1, "x"), (2, "y")], 0);
        ab_rows(&mut buf, &[], FETCH_EXHAUSTED);
        peer.write_all(&buf).await.unwrap();

        let (rows, more) = stmt.fetch(&mut conn, 2).await.unwrap();
        assert!(more);
        let (empty, more) = stmt.fetch(&mut conn, 2).await.unwrap();
        assert!(!more);
        assert!(empty.is_empty());
        let values: Vec<_> = rows.iter().map(|r| r.values().to_vec()).collect();
        assert_eq!(values, [
            [Value::Integer(1), Value::Text("x".into())],
            [Value::Integer(2), Value::Text("y".into())],
        ]);
    }

    #[tokio::test]
    async fn procedure_row_is_inline() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION13, false);
        let mut columns = describe::parse_prepare(select_ab()).unwrap().columns;
        columns.truncate(1);
        let stmt = Statement {
            handle: 1,
            kind: StatementKind::ExecProcedure,
            columns: columns.into(),
            output_blr: Bytes::new(),
        };

        let mut buf = BytesMut::new();
        buf.put_u32(op::SQL_RESPONSE);
        buf.put_u32(1);
        buf.put_slice(&[0, 0, 0, 0]);
        buf.put_i32(42);
        ok_response(&mut buf, 0, b"");
        peer.write_all(&buf).await.unwrap();

        let row = stmt.execute(&mut conn, 3, &Params::default()).await.unwrap().unwrap();
        assert_eq!(row.values(), &[Value::Integer(42)]);
    }

    #[test]
    fn records_sum() {
        assert_eq!(parse_records(records(2, 3).into()).unwrap(), 5);
        assert_eq!(parse_records(Bytes::from_static(&[info::END])).unwrap(), 0);
    }
}
