//! Wind Farm Telemetry Acquisition - Main Entry Point

use std::path::PathBuf;
use tracing::info;
use windfarm_daq::{init_logging, run, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = Settings::load(settings_path.as_deref())?;
    init_logging(&settings.logging)?;

    info!("=== Wind Farm DAQ v{} ===", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &settings_path {
        info!("Settings loaded from {}", path.display());
    }

    run(settings).await
}
