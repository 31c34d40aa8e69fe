//! Serial Port Wiring

use crate::command::CommandPort;
use crate::error::TransportError;
use crate::transport::LineReader;
use std::time::Duration;
use tokio::io::BufReader;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tracing::info;

/// Baud rate the firmware is built with
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Open a serial device (8N1, no flow control) and split it into a line
/// reader for the acquisition worker and a command port for everyone else
///
/// Must be called from within a Tokio runtime.
pub fn open_serial(
    device: &str,
    baud_rate: u32,
    command_timeout: Duration,
) -> Result<(LineReader, CommandPort), TransportError> {
    info!("Opening serial device {} at {} baud", device, baud_rate);

    let stream = tokio_serial::new(device, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()?;

    let (read_half, write_half) = tokio::io::split(stream);
    Ok((
        LineReader::new(BufReader::new(read_half)),
        CommandPort::new(write_half, command_timeout),
    ))
}
