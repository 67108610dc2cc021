use tracing::{Instrument, trace_span};
use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use firo::Result;

mod connection;
mod query;
mod error;
mod event;
mod service;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::Registry::default()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    connection::main().instrument(trace_span!("connection")).await?;
    query::main().instrument(trace_span!("query")).await?;
    error::main().instrument(trace_span!("error")).await?;
    event::main().instrument(trace_span!("event")).await?;
    service::main().instrument(trace_span!("service")).await?;

    Ok(())
}
