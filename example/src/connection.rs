use std::env::var;
use firo::{Config, Connection, Result, query};

const PING: &str = "SELECT 1 FROM RDB$DATABASE";

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect(&var("DATABASE_URL").unwrap()).await?;
    query::<_, _, (i32,)>(PING, &mut conn).fetch_all().await?;
    conn.close().await?;

    let mut conn = Connection::connect_env().await?;
    query::<_, _, (i32,)>(PING, &mut conn).fetch_all().await?;
    tracing::info!(
        protocol = conn.protocol_version(),
        wire_crypt = conn.wire_crypt(),
        compressed = conn.is_compressed(),
        "attached"
    );
    let version = conn.server_version().await?;
    tracing::info!(%version, "server");
    conn.close().await?;

    let config = Config::from_env().wire_compress(true);
    let mut conn = Connection::connect_with(config).await?;
    query::<_, _, (i32,)>(PING, &mut conn).fetch_all().await?;
    conn.close().await?;

    Ok(())
}
