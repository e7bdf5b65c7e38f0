//! Binary crate for the `weather-server` HTTP service.
//!
//! This crate focuses on:
//! - Parsing process settings
//! - Wiring the cache store, credentials and upstream provider into the resolver
//! - Serving the weather endpoint

use clap::Parser;
use tracing_subscriber::EnvFilter;
use weather_server::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Settings::parse();
    settings.run().await
}
