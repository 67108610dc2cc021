use firo::{Connection, DecodeError, ErrorKind, FromRow, Result, Row, query};

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;

    let err = query::<_, _, (i32,)>("SELECT foo FROM RDB$DATABASE", &mut conn)
        .fetch_one()
        .await
        .unwrap_err();
    let db = err.as_database().unwrap();
    tracing::info!(gds = ?db.codes().first(), sqlcode = db.sql_code(), "{db}");

    let err = query::<_, _, FailRow>("SELECT 1 FROM RDB$DATABASE", &mut conn)
        .fetch_all()
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Decode(_)));

    // the connection stays usable
    query::<_, _, (i32,)>("SELECT 1 FROM RDB$DATABASE", &mut conn).fetch_one().await?;
    conn.close().await?;
    Ok(())
}

#[derive(Debug)]
struct FailRow;

impl FromRow for FailRow {
    fn from_row(_: Row) -> Result<Self, DecodeError> {
        Err(DecodeError::IndexOutOfBounds(69))
    }
}
