//! Turbine Telemetry Acquisition
//!
//! Continuous batch acquisition from a turbine monitoring device:
//!
//! - [`AcquisitionWorker`] reads, decodes and appends one batch per call
//! - [`AcquisitionController`] runs the worker on its own task, toggles the
//!   device and hands finished batches to a [`BatchSink`]
//! - [`AcquisitionStats`] tracks cycles, errors and device liveness

mod config;
mod controller;
mod sink;
mod stats;
mod worker;

pub use config::{AcquisitionConfig, ConfigError};
pub use controller::AcquisitionController;
pub use sink::{Batch, BatchSink};
pub use stats::AcquisitionStats;
pub use worker::{AcquisitionWorker, BatchEnd, ListenReport, SharedStore, WorkerState};

use ring_buffer::StoreError;
use thiserror::Error;
use turbine_protocol::TransportError;

/// Acquisition errors
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Acquisition has been shut down")]
    ShutDown,

    #[error("Acquisition task failed: {0}")]
    TaskFailed(String),
}
