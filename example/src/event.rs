use std::time::Duration;
use firo::{Config, Result, event::EventManager};

pub async fn main() -> Result<()> {
    let manager = EventManager::connect(Config::from_env()).await?;
    let (sub, mut events) = manager.subscribe_queue(["firo_created", "firo_deleted"]).await?;

    for _ in 0..3 {
        manager.post_event("firo_created").await?;
    }

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event timeout")
        .expect("subscription closed");
    tracing::info!(name = %event.name, count = event.count, "event");

    sub.close().await?;
    manager.close().await?;
    Ok(())
}
