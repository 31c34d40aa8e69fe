//! Protocol Error Types

use thiserror::Error;

/// A telemetry line that could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    /// Wrong number of tab-separated fields
    #[error("Expected {expected} fields, received {actual}")]
    FieldCountMismatch { expected: usize, actual: usize },

    /// A field did not parse as its declared numeric type
    #[error("Field {index} is not a valid number: {value:?}")]
    NumericParseError { index: usize, value: String },
}

/// Errors that can occur on the device transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// No complete line arrived within the read timeout
    #[error("Timeout waiting for device data after {0}ms")]
    CommunicationTimeout(u64),

    /// Received bytes that are not ASCII text
    #[error("Received non-textual data from the device")]
    NonTextualData,

    /// A line grew past the maximum record length without a terminator
    #[error("Line exceeded {0} bytes without a newline")]
    LineTooLong(usize),

    /// The port reported end of stream
    #[error("Device disconnected")]
    Disconnected,

    /// A command could not be written to the device
    #[error("Failed to write command {command:?}: {reason}")]
    TransportWriteFailure { command: String, reason: String },

    /// Serial port error
    #[error("Serial port error: {0}")]
    SerialError(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::SerialError(err.to_string())
    }
}

impl From<tokio_serial::Error> for TransportError {
    fn from(err: tokio_serial::Error) -> Self {
        TransportError::SerialError(err.to_string())
    }
}
