//! V2X data manager binary
//!
//! Listens for SPaT and BSM datagrams and publishes reconciled state.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use v2x_manager::{ManagerConfig, ManagerNode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "v2x_manager=info,v2x_spat=info,v2x_sink=info".into());
    let json = std::env::var("V2X_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    tracing::info!("Starting V2X data manager");

    let config = ManagerConfig::from_env()?;
    let node = ManagerNode::start(config).await?;
    node.run().await?;

    Ok(())
}
