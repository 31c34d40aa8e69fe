//! Telemetry Ring Buffers
//!
//! Provides a fixed-capacity overwrite-oldest ring buffer and a named,
//! lock-step collection of them holding one device's rolling window.

mod buffer;
mod store;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};
pub use store::{ChannelSnapshot, ChannelStore};

use thiserror::Error;

/// Errors raised by ring buffers and channel stores
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Index outside `[-len, len)`
    #[error("Index {index} out of range for ring buffer of length {len}")]
    IndexOutOfRange { index: isize, len: usize },

    /// A row did not carry exactly one value per channel
    #[error("Row has {actual} values but the store has {expected} channels")]
    RowWidthMismatch { expected: usize, actual: usize },

    /// Store built without any channel
    #[error("A channel store needs at least one channel")]
    NoChannels,

    /// Store built with room for no rows
    #[error("A channel store needs a capacity of at least 1")]
    ZeroCapacity,

    /// Two channels share a name
    #[error("Duplicate channel name: {0}")]
    DuplicateChannel(String),
}
