//! Line-Oriented Device Transport

use crate::error::TransportError;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{trace, warn};

/// Type-erased buffered read half of a device connection
pub type DynLineSource = Box<dyn AsyncBufRead + Unpin + Send>;

/// Longest line held before it is dropped, far above a 20-field frame
pub const MAX_LINE_LENGTH: usize = 4096;

/// Reads newline-terminated ASCII records with a per-line timeout
///
/// Bytes of a line that was still incomplete when a read timed out are kept
/// and completed by the next call, up to [`MAX_LINE_LENGTH`] bytes. A longer
/// line is discarded through its terminator.
pub struct LineReader {
    inner: DynLineSource,
    pending: Vec<u8>,
    max_line: usize,
    discarding: bool,
}

impl LineReader {
    /// Wrap any buffered async reader (serial read half, duplex pipe, byte slice)
    pub fn new<R>(inner: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        Self {
            inner: Box::new(inner),
            pending: Vec::with_capacity(256),
            max_line: MAX_LINE_LENGTH,
            discarding: false,
        }
    }

    /// Override the maximum line length
    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line.max(1);
        self
    }

    /// Read one line, including its terminator when one was received
    pub async fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError> {
        let read = tokio::time::timeout(timeout, self.fill_line()).await;

        match read {
            Err(_) => Err(TransportError::CommunicationTimeout(timeout.as_millis() as u64)),
            Ok(Err(e)) => Err(e),
            Ok(Ok(false)) => {
                self.pending.clear();
                Err(TransportError::Disconnected)
            }
            Ok(Ok(true)) => {
                let bytes = std::mem::take(&mut self.pending);
                if !bytes.is_ascii() {
                    return Err(TransportError::NonTextualData);
                }
                let line = String::from_utf8(bytes).map_err(|_| TransportError::NonTextualData)?;
                trace!("Received line: {:?}", line);
                Ok(line)
            }
        }
    }

    /// Move bytes into `pending` until a newline; false at end of stream
    ///
    /// No bytes are lost if this future is dropped at its await point.
    async fn fill_line(&mut self) -> Result<bool, TransportError> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(false);
            }

            let (used, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };

            if self.discarding {
                self.inner.consume(used);
                if complete {
                    self.discarding = false;
                }
                continue;
            }

            self.pending.extend_from_slice(&available[..used]);
            self.inner.consume(used);

            if self.pending.len() > self.max_line {
                warn!("Dropping line longer than {} bytes", self.max_line);
                self.pending.clear();
                self.discarding = !complete;
                return Err(TransportError::LineTooLong(self.max_line));
            }
            if complete {
                return Ok(true);
            }
        }
    }

    /// Number of bytes of an incomplete line held over from a timed-out read
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }
}
