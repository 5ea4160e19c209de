//! HealthArchive — preservation, indexing, and search for archived
//! Canadian government health web pages.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let default_filter = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("healtharchive={default_filter}").into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    healtharchive::cli::run().await
}
