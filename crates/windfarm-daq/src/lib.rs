//! Wind Farm Telemetry Service
//!
//! Wires a serial-attached turbine monitoring device to the acquisition
//! controller, logs every batch and optionally records it to disk.

mod settings;
mod sinks;

pub use settings::{LoggingSettings, SerialSettings, Settings, SettingsError, ENV_PREFIX};
pub use sinks::{summarize, DaqSink, TsvRecorder};

use acquisition::{AcquisitionController, AcquisitionWorker};
use anyhow::{anyhow, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use turbine_protocol::open_serial;

/// Initialize logging
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level)
            .with_context(|| format!("invalid log level {:?}", settings.level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let result = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow!("failed to set tracing subscriber: {}", e))
}

/// Run the service until Ctrl-C
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let config = &settings.acquisition;
    let (reader, commands) = open_serial(
        &settings.serial.port,
        settings.serial.baud_rate,
        config.command_timeout(),
    )
    .with_context(|| format!("failed to open {}", settings.serial.port))?;

    let mut worker = AcquisitionWorker::from_config(config)?;
    worker.attach(reader).await;
    info!(
        "Device {:?}: channels {}",
        config.variant,
        config.layout().channel_names().join(", ")
    );

    let (sink, recorder) = DaqSink::new(settings.logging.record_path.as_deref())
        .context("failed to open the recording file")?;
    let controller = AcquisitionController::spawn(config, worker, commands, sink).await?;
    if !controller.is_enabled() {
        controller.enable().await?;
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut stats = controller.subscribe_stats();
    let mut alive = true;

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("Shutdown requested");
                break;
            }
            changed = stats.changed() => {
                if changed.is_err() {
                    warn!("Acquisition task ended unexpectedly");
                    break;
                }
                let now_alive = controller.is_alive();
                if alive && !now_alive {
                    let streak = stats.borrow().not_alive_streak;
                    warn!("Device not alive: {} consecutive cycles without data", streak);
                } else if !alive && now_alive {
                    info!("Device alive again");
                }
                alive = now_alive;
            }
        }
    }

    if let Err(e) = controller.disable().await {
        warn!("Failed to turn the device off: {}", e);
    }
    controller.shutdown().await?;
    if let Some(recorder) = recorder {
        recorder.await.context("recorder task failed")?;
    }

    let totals = controller.stats();
    info!(
        "Acquired {} rows in {} batches over {} cycles ({} errors)",
        totals.rows, totals.batches, totals.cycles, totals.error_count
    );
    Ok(())
}
