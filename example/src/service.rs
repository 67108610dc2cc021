use firo::{Config, Result, service::Service};

pub async fn main() -> Result<()> {
    let mut svc = Service::attach(Config::from_env()).await?;
    let version = svc.server_version().await?;
    tracing::info!(%version, implementation = %svc.implementation().await?, "service");
    assert!(version.at_least(3, 0));
    svc.close().await?;
    Ok(())
}
