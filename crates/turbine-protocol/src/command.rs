//! Host-to-Device Commands
//!
//! Writes short ASCII command tokens to the device. The protocol has no
//! acknowledgement, so success only means the bytes were written and flushed.

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default bound on lock acquisition plus write for one command
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 1000;

/// Terminator appended to every token, expected by the firmware's command parser
pub const DEFAULT_TERMINATOR: &str = "\n";

/// Type-erased write half of a device connection
pub type DynCommandSink = Box<dyn AsyncWrite + Unpin + Send>;

/// Commands understood by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Start broadcasting readings
    TurnOn,
    /// Stop broadcasting readings
    TurnOff,
    /// Reset the device-side energy accumulators
    ResetAccumulators,
}

impl Command {
    /// Get the wire token for this command
    pub fn token(&self) -> &'static str {
        match self {
            Command::TurnOn => "on",
            Command::TurnOff => "off",
            Command::ResetAccumulators => "r",
        }
    }
}

/// Cloneable handle on the device's write path
///
/// The write half is guarded by its own lock, separate from the read half
/// owned by the acquisition worker.
#[derive(Clone)]
pub struct CommandPort {
    sink: Arc<Mutex<DynCommandSink>>,
    timeout: Duration,
    terminator: &'static str,
}

impl CommandPort {
    /// Wrap any async writer (serial write half, duplex pipe)
    pub fn new<W>(writer: W, timeout: Duration) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
            timeout,
            terminator: DEFAULT_TERMINATOR,
        }
    }

    /// Replace the token terminator (empty for none)
    pub fn with_terminator(mut self, terminator: &'static str) -> Self {
        self.terminator = terminator;
        self
    }

    /// Get the command timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a command to the device
    pub async fn send(&self, command: Command) -> Result<(), TransportError> {
        debug!("Sending command {:?} ({:?})", command, command.token());
        self.send_token(command.token()).await
    }

    /// Write a raw token followed by the terminator
    pub async fn send_token(&self, token: &str) -> Result<(), TransportError> {
        let mut frame = String::with_capacity(token.len() + self.terminator.len());
        frame.push_str(token);
        frame.push_str(self.terminator);

        let write = async {
            let mut sink = self.sink.lock().await;
            sink.write_all(frame.as_bytes()).await?;
            sink.flush().await
        };

        let reason = match tokio::time::timeout(self.timeout, write).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}ms", self.timeout.as_millis()),
        };

        warn!("Command {:?} failed: {}", token, reason);
        Err(TransportError::TransportWriteFailure {
            command: token.to_string(),
            reason,
        })
    }
}
