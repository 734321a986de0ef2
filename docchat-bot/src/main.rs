//! Docchat Bot - Main entry point.

use anyhow::Result;
use docchat_bot::start_bot;
use docchat_common::config::Config;
use docchat_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env, config file and environment; missing credentials are fatal
    let config = Config::load_with_env()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Docchat Bot v{}", env!("CARGO_PKG_VERSION"));
    config.log_sources();

    start_bot(&config).await
}
