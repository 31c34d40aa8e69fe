//! Batch Sinks
//!
//! Consumers installed by the service: a status line per batch and an
//! optional TSV recording.

use acquisition::{Batch, BatchSink};
use ring_buffer::ChannelSnapshot;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One-line summary of the newest row: timestamp and per-turbine power
pub fn summarize(data: &ChannelSnapshot) -> Option<String> {
    let last = data.len().checked_sub(1)?;
    let mut line = format!("t={:.3}s", data.column("time")?[last]);
    for (name, column) in data.names.iter().zip(&data.columns) {
        if name.starts_with("P_") {
            line.push_str(&format!(" {}={:.1}mW", name, column[last]));
        }
    }
    Some(line)
}

/// Appends batches to a tab-separated file, header first
pub struct TsvRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
    header_written: bool,
}

impl TsvRecorder {
    /// Create (or truncate) the recording file
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        info!("Recording batches to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            header_written: false,
        })
    }

    /// Write the rows of one batch and flush
    pub fn write(&mut self, data: &ChannelSnapshot) -> std::io::Result<()> {
        if !self.header_written {
            writeln!(self.writer, "{}", data.tsv_header())?;
            self.header_written = true;
        }
        for row in data.to_tsv_rows() {
            writeln!(self.writer, "{}", row)?;
        }
        self.writer.flush()
    }

    /// Write every snapshot received on `rx` until the channel closes
    pub fn spawn(mut self, mut rx: mpsc::UnboundedReceiver<ChannelSnapshot>) -> JoinHandle<()> {
        tokio::task::spawn_blocking(move || {
            while let Some(data) = rx.blocking_recv() {
                if let Err(e) = self.write(&data) {
                    warn!("Stopping recording to {}: {}", self.path.display(), e);
                    break;
                }
            }
        })
    }
}

/// Sink installed by the service
///
/// Logs a summary of each batch on the acquisition task and hands the rows
/// to the recorder, which writes them on the blocking pool.
pub struct DaqSink {
    records: Option<mpsc::UnboundedSender<ChannelSnapshot>>,
}

impl DaqSink {
    /// Build the sink, starting a recorder when a path is given
    ///
    /// Must be called from within a Tokio runtime. The recorder handle
    /// finishes once the sink is dropped and every batch is written.
    pub fn new(record_path: Option<&Path>) -> std::io::Result<(Self, Option<JoinHandle<()>>)> {
        let Some(path) = record_path else {
            return Ok((Self { records: None }, None));
        };

        let recorder = TsvRecorder::create(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok((Self { records: Some(tx) }, Some(recorder.spawn(rx))))
    }
}

impl BatchSink for DaqSink {
    fn deliver(&mut self, batch: Batch) {
        if let Some(summary) = summarize(&batch.data) {
            info!("Batch {}: {} rows, {}", batch.sequence, batch.data.len(), summary);
        }

        if let Some(records) = self.records.as_ref() {
            if records.send(batch.data).is_err() {
                warn!("Recorder stopped, batches are no longer recorded");
                self.records = None;
            }
        }
    }
}
