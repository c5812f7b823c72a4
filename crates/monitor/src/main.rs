//! Telemetry Monitor - Main Entry Point

use monitor::{init_logging, run, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let config = AppConfig::load(config_path.as_deref().map(std::path::Path::new))?;
    init_logging(&config.log_level);

    info!("=== Telemetry Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    run(config).await
}
