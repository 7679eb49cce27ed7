//! Calltrack - inbound call routing and marketing source attribution
//!
//! Answers the telephony provider's webhooks for tracking numbers, ties each
//! caller to the web visit that showed them the number and records the call.

mod models;
mod server;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("calltrack=info".parse()?))
        .init();

    let config = server::config::AppConfig::from_env()?;
    tracing::info!("Starting calltrack on port {}", config.port);

    server::run_server(config).await
}
