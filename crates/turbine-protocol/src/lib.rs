//! Wind Turbine Telemetry Protocol
//!
//! This crate decodes the tab-separated ASCII records broadcast by wind
//! turbine power-measurement boards and writes host commands back to them.
//! Records are newline terminated with a fixed field count per firmware:
//!
//! - wind farm: `time_ms  time_us  (I V E) × 6` (20 fields)
//! - triple turbine: `time_ms  time_us  (I V E) × 3` (11 fields)
//! - single turbine: `time_ms  time_us  I  V  V_shunt  E` (6 fields)
//!
//! Units are mA, mV and J; power is derived in mW.

mod command;
mod decoder;
mod error;
mod layout;
mod serial;
mod transport;

pub use command::{Command, CommandPort, DynCommandSink, DEFAULT_COMMAND_TIMEOUT_MS};
pub use decoder::{power_mw, DecodeError, DecodedSample, LineDecoder, PowerMode, TurbineReading};
pub use error::{MalformedRecord, TransportError};
pub use layout::{DeviceVariant, FieldRole, FrameLayout};
pub use serial::{open_serial, DEFAULT_BAUD_RATE};
pub use transport::{DynLineSource, LineReader, MAX_LINE_LENGTH};
