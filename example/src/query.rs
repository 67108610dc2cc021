use firo::{BlobId, Connection, Isolation, Result, blob, execute, query, query_row};
use time::{Date, Month};

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;

    execute("RECREATE TABLE firo_note(id INTEGER, title VARCHAR(32), body BLOB SUB_TYPE TEXT, created DATE)", &mut conn)
        .execute()
        .await?;
    conn.commit().await?;

    let created = Date::from_calendar_date(2024, Month::March, 1).unwrap();
    let mut tx = conn.begin(Isolation::Serializable).await?;
    for id in 0..4 {
        execute("INSERT INTO firo_note(id, title, body, created) VALUES(?, ?, ?, ?)", &mut tx)
            .bind(id)
            .bind(format!("note {id}"))
            .bind("lorem ipsum ".repeat(id as usize * 1000))
            .bind(created)
            .execute()
            .await?;
    }
    tx.commit().await?;

    let notes = query::<_, _, (i32, String, Date)>("SELECT id, title, created FROM firo_note ORDER BY id", &mut conn)
        .fetch_all()
        .await?;
    assert_eq!(notes.len(), 4);
    assert_eq!(notes[3].1, "note 3");
    assert_eq!(notes[0].2, created);

    let mut cursor = query_row("SELECT id, body FROM firo_note", &mut conn).fetch().await?;
    while let Some(row) = cursor.next().await? {
        let id: i32 = row.try_get(0)?;
        let body: BlobId = row.try_get("BODY")?;
        tracing::info!(id, ?body, "note");
    }
    cursor.close().await?;
    drop(cursor);

    let (body,) = query::<_, _, (BlobId,)>("SELECT body FROM firo_note WHERE id = 2", &mut conn)
        .fetch_one()
        .await?;
    let text = blob::read_blob(&mut conn, body).await?;
    assert_eq!(text.len(), 12 * 2000);

    let (missing,) = query::<_, _, (Option<String>,)>("SELECT NULL FROM RDB$DATABASE", &mut conn)
        .fetch_one()
        .await?;
    assert!(missing.is_none());

    execute("DROP TABLE firo_note", &mut conn).execute().await?;
    conn.close().await?;
    Ok(())
}
