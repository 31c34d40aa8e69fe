//! Acquisition Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use turbine_protocol::{
    DeviceVariant, FrameLayout, LineDecoder, PowerMode, DEFAULT_COMMAND_TIMEOUT_MS,
};

/// Invalid configuration value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Configuration for one acquisition controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Device firmware
    pub variant: DeviceVariant,
    /// Override the turbine count of a triple layout
    pub turbines: Option<usize>,
    /// Ring buffer capacity per channel
    pub capacity: usize,
    /// Rows per batch (default: capacity)
    pub batch_size: Option<usize>,
    /// Per-line read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Bound on a single command write in milliseconds
    pub command_timeout_ms: u64,
    /// Power derivation
    pub power_mode: PowerMode,
    /// Consecutive empty cycles before the device counts as not alive
    pub critical_not_alive_count: u32,
    /// Also hand partial batches to the sink
    pub deliver_partial_batches: bool,
    /// Enable acquisition (and power on the device) right after spawning
    pub start_enabled: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            variant: DeviceVariant::default(),
            turbines: None,
            capacity: 100,
            batch_size: None,
            read_timeout_ms: 2000,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            power_mode: PowerMode::default(),
            critical_not_alive_count: 3,
            deliver_partial_batches: false,
            start_enabled: true,
        }
    }
}

impl AcquisitionConfig {
    /// Check every value, returning the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::new("capacity", "must be at least 1"));
        }
        match self.batch_size {
            Some(0) => return Err(ConfigError::new("batch_size", "must be at least 1")),
            Some(n) if n > self.capacity => {
                return Err(ConfigError::new(
                    "batch_size",
                    format!("{} exceeds ring buffer capacity {}", n, self.capacity),
                ))
            }
            _ => {}
        }
        match (self.variant, self.turbines) {
            (_, Some(0)) => return Err(ConfigError::new("turbines", "must be at least 1")),
            (DeviceVariant::SingleTurbine, Some(n)) if n != 1 => {
                return Err(ConfigError::new(
                    "turbines",
                    "the single-turbine layout has exactly one turbine",
                ))
            }
            _ => {}
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::new("read_timeout_ms", "must be positive"));
        }
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::new("command_timeout_ms", "must be positive"));
        }
        if self.critical_not_alive_count == 0 {
            return Err(ConfigError::new("critical_not_alive_count", "must be at least 1"));
        }
        Ok(())
    }

    /// Frame layout for the configured device
    pub fn layout(&self) -> FrameLayout {
        match (self.variant, self.turbines) {
            (DeviceVariant::SingleTurbine, _) | (_, None) => self.variant.layout(),
            (_, Some(n)) => FrameLayout::triples(n),
        }
    }

    /// Decoder for the configured device
    pub fn decoder(&self) -> LineDecoder {
        LineDecoder::new(self.layout()).with_power_mode(self.power_mode)
    }

    /// Effective rows per batch
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(self.capacity)
    }

    /// Per-line read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Command write timeout
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
