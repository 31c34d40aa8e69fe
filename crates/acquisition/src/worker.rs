//! Acquisition Worker
//!
//! Owns the device read path and the channel store, and runs one bounded
//! read-decode-append batch per [`AcquisitionWorker::listen`] call.

use crate::config::AcquisitionConfig;
use crate::AcquisitionError;
use ring_buffer::{ChannelStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use turbine_protocol::{DecodeError, LineDecoder, LineReader, MalformedRecord, TransportError};

/// Channel store shared between the worker and its readers
pub type SharedStore = Arc<Mutex<ChannelStore>>;

/// Worker state after the most recent operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No transport attached
    Idle,
    /// Reading lines
    Listening,
    /// Last call filled its batch
    BatchComplete,
    /// Last call ended on a read timeout
    TimedOut,
    /// Last call ended on bad data or a transport fault
    ProtocolError,
}

/// Why a listen cycle stopped
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEnd {
    /// `batch_size` rows appended
    Complete,
    /// No line within the read timeout
    CommunicationTimeout,
    /// The transport delivered bytes that are not ASCII text
    NonTextualData,
    /// A line failed to decode; rows before it are kept
    MalformedRecord(MalformedRecord),
    /// A line exceeded the maximum record length and was dropped
    LineTooLong,
    /// The transport reached end of stream; the worker is Idle again
    Disconnected,
    /// `listen` was called with no transport attached
    NotAttached,
    /// Serial I/O failure; the transport is detached as on a disconnect
    Transport(String),
    /// The store does not match the decoder layout
    Store(StoreError),
}

/// Outcome of one listen cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ListenReport {
    /// Rows appended during this call
    pub new_rows: usize,
    /// Why the call returned
    pub end: BatchEnd,
}

impl ListenReport {
    /// Whether the batch was filled
    pub fn is_complete(&self) -> bool {
        self.end == BatchEnd::Complete
    }

    /// Whether the call ended on an error condition
    pub fn is_error(&self) -> bool {
        !matches!(self.end, BatchEnd::Complete | BatchEnd::NotAttached)
    }
}

/// Continuous read-decode-append worker for one device
pub struct AcquisitionWorker {
    reader: Option<LineReader>,
    decoder: LineDecoder,
    store: SharedStore,
    read_timeout: Duration,
    state: WorkerState,
}

impl AcquisitionWorker {
    /// Create an idle worker with an empty store of `capacity` rows
    pub fn new(
        decoder: LineDecoder,
        capacity: usize,
        read_timeout: Duration,
    ) -> Result<Self, AcquisitionError> {
        let store = decoder.new_store(capacity)?;
        info!(
            "Creating acquisition worker: {} channels, capacity={}, timeout={}ms",
            store.width(),
            capacity,
            read_timeout.as_millis()
        );
        Ok(Self {
            reader: None,
            decoder,
            store: Arc::new(Mutex::new(store)),
            read_timeout,
            state: WorkerState::Idle,
        })
    }

    /// Create an idle worker from validated configuration
    pub fn from_config(config: &AcquisitionConfig) -> Result<Self, AcquisitionError> {
        config.validate()?;
        Self::new(config.decoder(), config.capacity, config.read_timeout())
    }

    /// Attach a transport, clearing the store as on a device reconnect
    pub async fn attach(&mut self, reader: LineReader) {
        self.store.lock().await.clear();
        self.reader = Some(reader);
        self.state = WorkerState::Listening;
        info!("Device transport attached");
    }

    /// Detach the transport, returning to Idle
    pub fn detach(&mut self) -> Option<LineReader> {
        self.state = WorkerState::Idle;
        self.reader.take()
    }

    /// Check if a transport is attached
    pub fn is_attached(&self) -> bool {
        self.reader.is_some()
    }

    /// Get the current state
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Get the decoder
    pub fn decoder(&self) -> &LineDecoder {
        &self.decoder
    }

    /// Get a handle on the shared store
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Read lines until `batch_size` rows were appended, a read times out, or
    /// a line is rejected
    ///
    /// The store lock is held only while one decoded row is appended. A
    /// rejected line ends the batch; lines after it stay unread.
    pub async fn listen(&mut self, batch_size: usize) -> ListenReport {
        let batch_size = batch_size.max(1);

        let Some(reader) = self.reader.as_mut() else {
            self.state = WorkerState::Idle;
            return ListenReport {
                new_rows: 0,
                end: BatchEnd::NotAttached,
            };
        };
        self.state = WorkerState::Listening;

        let mut new_rows = 0;
        let end = loop {
            let line = match reader.read_line(self.read_timeout).await {
                Ok(line) => line,
                Err(TransportError::CommunicationTimeout(ms)) => {
                    if new_rows == 0 {
                        warn!("Communication timed out after {}ms. No new data was appended", ms);
                    } else {
                        debug!("Communication timed out after {}ms. {} new rows appended", ms, new_rows);
                    }
                    break BatchEnd::CommunicationTimeout;
                }
                Err(TransportError::NonTextualData) => {
                    warn!("Data received from the device was not ASCII text");
                    break BatchEnd::NonTextualData;
                }
                Err(TransportError::Disconnected) => {
                    warn!("Device closed the connection");
                    break BatchEnd::Disconnected;
                }
                Err(TransportError::LineTooLong(max)) => {
                    warn!("Device sent a line longer than {} bytes", max);
                    break BatchEnd::LineTooLong;
                }
                Err(e) => {
                    warn!("Transport error, detaching device: {}", e);
                    break BatchEnd::Transport(e.to_string());
                }
            };

            let decoded = {
                let mut store = self.store.lock().await;
                self.decoder.decode_into(&line, &mut store)
            };

            match decoded {
                Ok(_) => {
                    new_rows += 1;
                    if new_rows == batch_size {
                        break BatchEnd::Complete;
                    }
                }
                Err(DecodeError::Malformed(e)) => {
                    warn!("Malformed record {:?}: {}", line.trim_end(), e);
                    break BatchEnd::MalformedRecord(e);
                }
                Err(DecodeError::Store(e)) => {
                    warn!("Store rejected decoded row: {}", e);
                    break BatchEnd::Store(e);
                }
            }
        };

        self.state = match end {
            BatchEnd::Complete => WorkerState::BatchComplete,
            BatchEnd::CommunicationTimeout => WorkerState::TimedOut,
            BatchEnd::Disconnected | BatchEnd::Transport(_) => {
                self.reader = None;
                WorkerState::Idle
            }
            _ => WorkerState::ProtocolError,
        };

        ListenReport { new_rows, end }
    }
}
