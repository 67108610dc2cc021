//! Query API types.
use std::{collections::VecDeque, fmt, marker::PhantomData};

use crate::{
    Result, Row,
    blob,
    connection::Connection,
    encode::encode_params,
    error::Closed,
    executor::Executor,
    row::{FromRow, RowNotFound, RowResult},
    sql::Sql,
    statement::Statement,
    value::{Encode, Value},
};

/// Entrypoint of the query API.
///
/// # Example
///
/// ```no_run
/// # async fn test(mut conn: firo::Connection) -> firo::Result<()> {
/// let posts: Vec<(i32, String)> = firo::query("select id, name from post where id > ?", &mut conn)
///     .bind(10)
///     .fetch_all()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub fn query<SQL, Exe, R>(sql: SQL, exe: Exe) -> Query<SQL, Exe, R> {
    Query { sql, exe, params: Vec::new(), _p: PhantomData }
}

/// Same as [`query`] with [`Row`] as the output.
pub fn query_row<SQL, Exe>(sql: SQL, exe: Exe) -> Query<SQL, Exe, Row> {
    Query { sql, exe, params: Vec::new(), _p: PhantomData }
}

/// Statement run for its effect, finish with [`Query::execute`] to get the
/// [`RowResult`] counts.
pub fn execute<SQL, Exe>(sql: SQL, exe: Exe) -> Query<SQL, Exe, Row> {
    Query { sql, exe, params: Vec::new(), _p: PhantomData }
}

/// The query API.
#[derive(Debug)]
#[must_use = "query does nothing unless it is fetched or executed"]
pub struct Query<SQL, Exe, R> {
    sql: SQL,
    exe: Exe,
    params: Vec<Value>,
    _p: PhantomData<R>,
}

impl<SQL, Exe, R> Query<SQL, Exe, R> {
    /// Bind query parameter.
    pub fn bind<V: Encode>(mut self, value: V) -> Self {
        self.params.push(value.encode());
        self
    }
}

impl<SQL: Sql, Exe: Executor, R: FromRow> Query<SQL, Exe, R> {
    /// Execute and open a [`Cursor`] over the result.
    ///
    /// Rows are fetched in batches of [`Config::fetch_size`][crate::Config::fetch_size].
    pub async fn fetch(self) -> Result<Cursor<Exe, R>> {
        Cursor::open(self.sql, self.exe, self.params, None).await
    }

    /// Fetch all rows into [`Vec`].
    pub async fn fetch_all(self) -> Result<Vec<R>> {
        let mut cursor = self.fetch().await?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next().await? {
            rows.push(row);
        }
        cursor.close().await?;
        Ok(rows)
    }

    /// Fetch one row, returns error if no row is found.
    pub async fn fetch_one(self) -> Result<R> {
        match self.fetch_optional().await? {
            Some(row) => Ok(row),
            None => Err(RowNotFound.into()),
        }
    }

    /// Optionally fetch one row.
    pub async fn fetch_optional(self) -> Result<Option<R>> {
        let mut cursor = Cursor::open(self.sql, self.exe, self.params, Some(1)).await?;
        let row = cursor.next().await?;
        cursor.close().await?;
        Ok(row)
    }

    /// Execute statement and return number of rows affected.
    pub async fn execute(self) -> Result<RowResult> {
        let mut cursor = Cursor::<Exe, Row>::open(self.sql, self.exe, self.params, None).await?;
        let rows_affected = cursor.rows_affected().await?;
        cursor.close().await?;
        Ok(RowResult { rows_affected })
    }
}

/// Rows of an executed statement, fetched in batches.
///
/// A cursor should be [closed][Cursor::close] after use. A dropped cursor
/// frees its server resources with the next request, and the autocommit
/// transaction is then committed by the next statement instead.
pub struct Cursor<Exe: Executor, R> {
    exe: Exe,
    /// [`None`] once closed.
    stmt: Option<Statement>,
    cache_key: Option<String>,
    rows: VecDeque<Row>,
    open: bool,
    more: bool,
    batch: u32,
    _p: PhantomData<R>,
}

impl<Exe: Executor, R: FromRow> Cursor<Exe, R> {
    async fn open<SQL: Sql>(sql: SQL, mut exe: Exe, params: Vec<Value>, limit: Option<u32>) -> Result<Self> {
        let mut scope = exe.scope();
        let tr = scope.tx_handle().await?;
        let conn = &mut *scope.conn;

        let text = sql.sql();
        let cache_key = sql.persistent().then(|| text.to_owned());
        let cached = match cache_key {
            Some(_) => conn.take_statement(text),
            None => None,
        };
        let stmt = match cached {
            Some(stmt) => stmt,
            None => Statement::prepare(conn, tr, text).await?,
        };

        let single = match start(conn, &stmt, tr, params).await {
            Ok(single) => single,
            Err(err) => {
                conn.release_statement(cache_key, stmt);
                return Err(err);
            },
        };

        // procedure rows arrive with the execute response
        let open = stmt.has_cursor() && single.is_none();
        let batch = limit.unwrap_or(conn.config().fetch_size);

        Ok(Self {
            exe,
            stmt: Some(stmt),
            cache_key,
            rows: single.into_iter().collect(),
            open,
            more: open,
            batch,
            _p: PhantomData,
        })
    }

    /// Fetch the next row, [`None`] when the result is exhausted.
    pub async fn next(&mut self) -> Result<Option<R>> {
        loop {
            if let Some(row) = self.rows.pop_front() {
                return Ok(Some(row.decode()?));
            }
            if !self.more {
                return Ok(None);
            }
            let Some(stmt) = &self.stmt else {
                return Err(Closed.into());
            };
            let conn = self.exe.scope().conn;
            let (rows, more) = stmt.fetch(conn, self.batch).await?;
            self.rows.extend(rows);
            self.more = more;
        }
    }

    /// Rows inserted, updated or deleted by the statement.
    pub async fn rows_affected(&mut self) -> Result<u64> {
        let Some(stmt) = &self.stmt else {
            return Err(Closed.into());
        };
        stmt.rows_affected(self.exe.scope().conn).await
    }

    /// Output column names.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.stmt.iter().flat_map(|stmt| stmt.columns().iter().map(|col| col.name()))
    }

    /// Close the server cursor and release the statement.
    ///
    /// Statements of the autocommit transaction are committed here. Closing
    /// a closed cursor does nothing.
    pub async fn close(&mut self) -> Result<()> {
        let Some(stmt) = self.stmt.take() else {
            return Ok(());
        };
        self.rows.clear();
        self.more = false;

        let mut scope = self.exe.scope();
        if std::mem::take(&mut self.open) {
            if let Err(err) = stmt.close_cursor(scope.conn).await {
                scope.conn.release_statement(None, stmt);
                return Err(err);
            }
        }
        scope.conn.release_statement(self.cache_key.take(), stmt);
        scope.statement_closed().await
    }
}

/// Send parameters too long to be inline as blobs, then execute.
async fn start(conn: &mut Connection, stmt: &Statement, tr: u32, mut params: Vec<Value>) -> Result<Option<Row>> {
    let limit = conn.config().inline_limit;
    let charset = conn.charset();

    for param in &mut params {
        let long = match param {
            Value::Text(text) => {
                let bytes = charset.encode(text);
                (bytes.len() >= limit).then(|| bytes.into_owned())
            },
            Value::Bytes(bytes) => (bytes.len() >= limit).then(|| bytes.to_vec()),
            _ => None,
        };
        if let Some(data) = long {
            *param = Value::Blob(blob::put_segments(conn, tr, &data).await?);
        }
    }

    let params = encode_params(&params, conn.protocol(), charset)?;
    stmt.execute(conn, tr, &params).await
}

impl<Exe: Executor, R> Drop for Cursor<Exe, R> {
    fn drop(&mut self) {
        if let Some(stmt) = self.stmt.take() {
            let conn = self.exe.scope().conn;
            if self.open {
                stmt.forget_cursor(conn);
            }
            conn.release_statement(self.cache_key.take(), stmt);
        }
    }
}

impl<Exe: Executor, R> fmt::Debug for Cursor<Exe, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("stmt", &self.stmt)
            .field("buffered", &self.rows.len())
            .field("more", &self.more)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::{
        Isolation,
        connection::{
            Config,
            test::{mock, mock_with, ok_response, sent},
        },
        firebird::{
            consts::{FETCH_EXHAUSTED, PROTOCOL_VERSION16, info},
            describe::test::DescribeWriter,
            op,
        },
        sql::SqlExt,
        statement::test::{ab_rows, records, select_ab},
    };

    fn words(bytes: &[u8]) -> Vec<u32> {
        bytes.chunks(4).map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]])).collect()
    }

    fn count(out: &[u8], opcode: u32) -> usize {
        words(out).into_iter().filter(|w| *w == opcode).count()
    }

    fn insert_prepared() -> bytes::Bytes {
        DescribeWriter::new().int(info::SQL_STMT_TYPE, 2).tag(info::END).freeze()
    }

    #[tokio::test]
    async fn serializable_select_in_transaction() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, false);

        let mut buf = BytesMut::new();
        ok_response(&mut buf, 9, b"");
        ok_response(&mut buf, 21, b"");
        ok_response(&mut buf, 0, &select_ab());
        ok_response(&mut buf, 0, b"");
        ab_rows(&mut buf, &[(1, "x"), (2, "y")], FETCH_EXHAUSTED);
        ok_response(&mut buf, 0, b"");
        ok_response(&mut buf, 0, b"");
        peer.write_all(&buf).await.unwrap();

        let mut tx = conn.begin(Isolation::Serializable).await.unwrap();
        let rows = query::<_, _, (i32, String)>("select a, b from t", &mut tx)
            .fetch_all()
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(rows, [(1, "x".to_owned()), (2, "y".to_owned())]);

        let out = sent(&mut peer).await;
        let w = words(&out);
        assert_eq!(w[0], op::TRANSACTION);
        assert_eq!(&out[12..16], &[3, 9, 6, 1]);
        assert_eq!(w[4], op::ALLOCATE_STATEMENT);
        assert_eq!(count(&out, op::EXECUTE), 1);
        assert_eq!(count(&out, op::FETCH), 1);
        assert_eq!(count(&out, op::FREE_STATEMENT), 1);
        assert_eq!(&out[out.len() - 8..out.len() - 4], &op::COMMIT.to_be_bytes());
        // explicit transactions are never committed retaining
        assert_eq!(count(&out, op::COMMIT_RETAINING), 0);
    }

    #[tokio::test]
    async fn autocommit_execute_commits_retaining() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, false);

        let mut buf = BytesMut::new();
        ok_response(&mut buf, 3, b"");
        ok_response(&mut buf, 4, b"");
        ok_response(&mut buf, 0, &insert_prepared());
        ok_response(&mut buf, 0, b"");
        ok_response(&mut buf, 0, &records(1, 0));
        ok_response(&mut buf, 0, b"");
        peer.write_all(&buf).await.unwrap();

        let res = execute("insert into t values (?)", &mut conn)
            .bind(1)
            .execute()
            .await
            .unwrap();
        assert_eq!(res.rows_affected, 1);

        let out = sent(&mut peer).await;
        assert_eq!(count(&out, op::COMMIT_RETAINING), 1);
        assert_eq!(count(&out, op::FREE_STATEMENT), 0);
    }

    #[tokio::test]
    async fn cached_statement_is_reused() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, false);

        let mut buf = BytesMut::new();
        ok_response(&mut buf, 3, b"");
        ok_response(&mut buf, 4, b"");
        ok_response(&mut buf, 0, &insert_prepared());
        for _ in 0..2 {
            ok_response(&mut buf, 0, b"");
            ok_response(&mut buf, 0, &records(0, 1));
            ok_response(&mut buf, 0, b"");
        }
        peer.write_all(&buf).await.unwrap();

        for _ in 0..2 {
            execute("update t set a = 1", &mut conn).execute().await.unwrap();
        }

        let out = sent(&mut peer).await;
        assert_eq!(count(&out, op::ALLOCATE_STATEMENT), 1);
        assert_eq!(count(&out, op::EXECUTE), 2);
    }

    #[tokio::test]
    async fn once_statement_is_released() {
        let config = Config::default().statement_cache(0);
        let (mut conn, mut peer) = mock_with(PROTOCOL_VERSION16, true, config);

        let mut buf = BytesMut::new();
        ok_response(&mut buf, 3, b"");
        ok_response(&mut buf, 4, b"");
        ok_response(&mut buf, 0, &insert_prepared());
        ok_response(&mut buf, 0, b"");
        ok_response(&mut buf, 0, &records(0, 0));
        // free statement, read before commit retaining
        ok_response(&mut buf, 0, b"");
        ok_response(&mut buf, 0, b"");
        peer.write_all(&buf).await.unwrap();

        execute("delete from t".once(), &mut conn).execute().await.unwrap();

        let out = sent(&mut peer).await;
        let w = words(&out);
        let free = w.iter().position(|w| *w == op::FREE_STATEMENT).unwrap();
        let commit = w.iter().position(|w| *w == op::COMMIT_RETAINING).unwrap();
        assert!(free < commit);
    }

    #[tokio::test]
    async fn fetch_one_of_empty_result() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, false);

        let mut buf = BytesMut::new();
        ok_response(&mut buf, 3, b"");
        ok_response(&mut buf, 4, b"");
        ok_response(&mut buf, 0, &select_ab());
        ok_response(&mut buf, 0, b"");
        ab_rows(&mut buf, &[], FETCH_EXHAUSTED);
        ok_response(&mut buf, 0, b"");
        ok_response(&mut buf, 0, b"");
        peer.write_all(&buf).await.unwrap();

        let err = query_row("select a, b from t", &mut conn).fetch_one().await.unwrap_err();
        assert!(matches!(err.kind(), crate::ErrorKind::RowNotFound(_)));

        // one row per batch: opcode, statement, blr, message number, count
        let w = words(&sent(&mut peer).await);
        let fetch = w.iter().position(|w| *w == op::FETCH).unwrap();
        let blr_words = (w[fetch + 2] as usize).div_ceil(4);
        assert_eq!(w[fetch + 3 + blr_words + 1], 1);
    }

    /// Insert `text` with an inline limit of 4 bytes, returns what was sent.
    async fn insert_text(text: &str, as_blob: bool) -> Vec<u8> {
        let config = Config::default().inline_limit(4);
        let (mut conn, mut peer) = mock_with(PROTOCOL_VERSION16, false, config);

        let mut buf = BytesMut::new();
        ok_response(&mut buf, 3, b"");
        ok_response(&mut buf, 4, b"");
        ok_response(&mut buf, 0, &insert_prepared());
        if as_blob {
            // create, one segment, close
            ok_response(&mut buf, 6, b"");
            ok_response(&mut buf, 0, b"");
            ok_response(&mut buf, 0, b"");
        }
        ok_response(&mut buf, 0, b"");
        ok_response(&mut buf, 0, &records(1, 0));
        ok_response(&mut buf, 0, b"");
        peer.write_all(&buf).await.unwrap();

        execute("insert into t values (?)", &mut conn)
            .bind(text)
            .execute()
            .await
            .unwrap();

        sent(&mut peer).await
    }

    #[tokio::test]
    async fn long_text_is_sent_as_blob() {
        let out = insert_text("longer than four", true).await;
        assert_eq!(count(&out, op::CREATE_BLOB2), 1);
        assert_eq!(count(&out, op::PUT_SEGMENT), 1);
    }

    #[tokio::test]
    async fn text_at_the_limit_is_sent_as_blob() {
        let out = insert_text("four", true).await;
        assert_eq!(count(&out, op::CREATE_BLOB2), 1);
        assert_eq!(count(&out, op::PUT_SEGMENT), 1);
    }

    #[tokio::test]
    async fn short_text_stays_inline() {
        let out = insert_text("abc", false).await;
        assert_eq!(count(&out, op::CREATE_BLOB2), 0);
    }

    #[tokio::test]
    async fn dropped_cursor_is_freed_with_next_request() {
        let (mut conn, mut peer) = mock(PROTOCOL_VERSION16, true);

        let mut buf = BytesMut::new();
        ok_response(&mut buf, 3, b"");
        ok_response(&mut buf, 4, b"");
        ok_response(&mut buf, 0, &select_ab());
        ok_response(&mut buf, 0, b"");
        peer.write_all(&buf).await.unwrap();

        let cursor = query_row("select a, b from t", &mut conn).fetch().await.unwrap();
        drop(cursor);

        let mut buf = BytesMut::new();
        ok_response(&mut buf, 0, b"");
        ok_response(&mut buf, 0, b"");
        peer.write_all(&buf).await.unwrap();
        conn.ping().await.unwrap();

        let out = sent(&mut peer).await;
        let w = words(&out);
        let close = w.iter().position(|w| *w == op::FREE_STATEMENT).unwrap();
        assert!(w[close..].contains(&op::PING));
    }
}
