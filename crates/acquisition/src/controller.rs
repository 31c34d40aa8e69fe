//! Acquisition Controller
//!
//! Runs an [`AcquisitionWorker`] on its own task, batch after batch, while
//! operators toggle acquisition, send device commands and read snapshots
//! from other tasks.

use crate::config::{AcquisitionConfig, ConfigError};
use crate::sink::{Batch, BatchSink};
use crate::stats::{AcquisitionStats, StatsRecorder};
use crate::worker::{AcquisitionWorker, ListenReport, SharedStore};
use crate::AcquisitionError;
use ring_buffer::ChannelSnapshot;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use turbine_protocol::{Command, CommandPort, LineReader};

/// Scheduling state shared with the acquisition task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Enabled,
    Disabled,
    Shutdown,
}

/// Handle through which consumers and operators reach a running acquisition
pub struct AcquisitionController {
    commands: CommandPort,
    store: SharedStore,
    run_tx: watch::Sender<RunState>,
    stats_rx: watch::Receiver<AcquisitionStats>,
    attach_tx: mpsc::UnboundedSender<LineReader>,
    task: Mutex<Option<JoinHandle<()>>>,
    critical_not_alive_count: u32,
}

impl AcquisitionController {
    /// Spawn the acquisition task
    ///
    /// The task starts disabled. With `start_enabled` set, acquisition is
    /// enabled (and `on` sent) before this returns.
    pub async fn spawn<S: BatchSink>(
        config: &AcquisitionConfig,
        worker: AcquisitionWorker,
        commands: CommandPort,
        sink: S,
    ) -> Result<Self, AcquisitionError> {
        config.validate()?;
        let store = worker.store();
        let capacity = store.lock().await.capacity();
        if capacity < config.batch_size() {
            return Err(ConfigError::new(
                "batch_size",
                format!(
                    "{} exceeds the worker's store capacity {}",
                    config.batch_size(),
                    capacity
                ),
            )
            .into());
        }

        let (run_tx, run_rx) = watch::channel(RunState::Disabled);
        let (stats_tx, stats_rx) = watch::channel(AcquisitionStats::default());
        let (attach_tx, attach_rx) = mpsc::unbounded_channel();

        info!(
            "Spawning acquisition task: batch_size={}, partial batches {}",
            config.batch_size(),
            if config.deliver_partial_batches { "delivered" } else { "not delivered" }
        );

        let task = AcquisitionTask {
            worker,
            store: store.clone(),
            sink,
            run_rx,
            attach_rx,
            stats_tx,
            recorder: StatsRecorder::new(tokio::time::Instant::now().into_std()),
            batch_size: config.batch_size(),
            deliver_partial: config.deliver_partial_batches,
            sequence: 0,
        };
        let handle = tokio::spawn(task.run());

        let controller = Self {
            commands,
            store,
            run_tx,
            stats_rx,
            attach_tx,
            task: Mutex::new(Some(handle)),
            critical_not_alive_count: config.critical_not_alive_count,
        };

        if config.start_enabled {
            controller.enable().await?;
        }
        Ok(controller)
    }

    /// Schedule listen cycles and tell the device to start broadcasting
    pub async fn enable(&self) -> Result<(), AcquisitionError> {
        self.set_run_state(RunState::Enabled)?;
        info!("Acquisition enabled");
        self.commands.send(Command::TurnOn).await?;
        Ok(())
    }

    /// Stop scheduling new listen cycles and tell the device to stop
    ///
    /// A cycle already in flight runs to completion.
    pub async fn disable(&self) -> Result<(), AcquisitionError> {
        self.set_run_state(RunState::Disabled)?;
        info!("Acquisition disabled");
        self.commands.send(Command::TurnOff).await?;
        Ok(())
    }

    /// Reset the device-side energy accumulators; local history is kept
    pub async fn reset_accumulators(&self) -> Result<(), AcquisitionError> {
        self.ensure_running()?;
        info!("Resetting device energy accumulators");
        self.commands.send(Command::ResetAccumulators).await?;
        Ok(())
    }

    /// Clear the local ring buffers
    pub async fn clear_history(&self) -> Result<(), AcquisitionError> {
        self.ensure_running()?;
        self.store.lock().await.clear();
        info!("Cleared local telemetry history");
        Ok(())
    }

    /// Hand a fresh transport to the worker, clearing local history
    pub fn reattach(&self, reader: LineReader) -> Result<(), AcquisitionError> {
        self.ensure_running()?;
        self.attach_tx
            .send(reader)
            .map_err(|_| AcquisitionError::ShutDown)
    }

    /// Consistent copy of every channel
    pub async fn snapshot(&self) -> ChannelSnapshot {
        self.store.lock().await.snapshot()
    }

    /// Newest row as `(channel, value)` pairs
    pub async fn latest(&self) -> Option<Vec<(String, f64)>> {
        let store = self.store.lock().await;
        store
            .latest()
            .map(|row| row.into_iter().map(|(name, v)| (name.to_string(), v)).collect())
    }

    /// Statistics as of the last finished cycle
    pub fn stats(&self) -> AcquisitionStats {
        self.stats_rx.borrow().clone()
    }

    /// Receiver notified after every finished cycle
    pub fn subscribe_stats(&self) -> watch::Receiver<AcquisitionStats> {
        self.stats_rx.clone()
    }

    /// Check if listen cycles are being scheduled
    pub fn is_enabled(&self) -> bool {
        *self.run_tx.borrow() == RunState::Enabled
    }

    /// False once `critical_not_alive_count` consecutive cycles appended nothing
    pub fn is_alive(&self) -> bool {
        self.stats_rx.borrow().not_alive_streak < self.critical_not_alive_count
    }

    /// Stop the acquisition task and wait for it to finish
    ///
    /// The in-flight cycle is not interrupted; it ends at its batch boundary
    /// or read timeout. Calling this more than once is harmless.
    pub async fn shutdown(&self) -> Result<(), AcquisitionError> {
        self.run_tx.send_replace(RunState::Shutdown);
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            info!("Waiting for acquisition task to stop");
            handle
                .await
                .map_err(|e| AcquisitionError::TaskFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), AcquisitionError> {
        if *self.run_tx.borrow() == RunState::Shutdown {
            return Err(AcquisitionError::ShutDown);
        }
        Ok(())
    }

    fn set_run_state(&self, next: RunState) -> Result<(), AcquisitionError> {
        let mut shut_down = false;
        self.run_tx.send_if_modified(|state| {
            if *state == RunState::Shutdown {
                shut_down = true;
                return false;
            }
            let changed = *state != next;
            *state = next;
            changed
        });

        if shut_down {
            Err(AcquisitionError::ShutDown)
        } else {
            Ok(())
        }
    }
}

/// State owned by the spawned acquisition task
struct AcquisitionTask<S> {
    worker: AcquisitionWorker,
    store: SharedStore,
    sink: S,
    run_rx: watch::Receiver<RunState>,
    attach_rx: mpsc::UnboundedReceiver<LineReader>,
    stats_tx: watch::Sender<AcquisitionStats>,
    recorder: StatsRecorder,
    batch_size: usize,
    deliver_partial: bool,
    sequence: u64,
}

impl<S: BatchSink> AcquisitionTask<S> {
    async fn run(mut self) {
        info!("Acquisition task started");

        loop {
            while let Ok(reader) = self.attach_rx.try_recv() {
                self.worker.attach(reader).await;
            }

            // Controller dropped without shutdown
            if self.run_rx.has_changed().is_err() {
                break;
            }

            let state = *self.run_rx.borrow_and_update();
            match state {
                RunState::Shutdown => break,
                RunState::Enabled if self.worker.is_attached() => {}
                RunState::Enabled | RunState::Disabled => {
                    if !self.wait_for_change().await {
                        break;
                    }
                    continue;
                }
            }

            let report = self.worker.listen(self.batch_size).await;
            self.recorder
                .record(&report, tokio::time::Instant::now().into_std());
            self.stats_tx.send_replace(self.recorder.stats().clone());
            self.deliver(&report).await;

            // A cycle may end without ever waiting on the wire
            tokio::task::yield_now().await;
        }

        info!("Acquisition task stopped");
    }

    /// Park until the run state changes or a transport arrives; false once
    /// the controller is gone
    async fn wait_for_change(&mut self) -> bool {
        tokio::select! {
            changed = self.run_rx.changed() => changed.is_ok(),
            reader = self.attach_rx.recv() => match reader {
                Some(reader) => {
                    self.worker.attach(reader).await;
                    true
                }
                None => false,
            },
        }
    }

    async fn deliver(&mut self, report: &ListenReport) {
        let wanted = report.is_complete() || (self.deliver_partial && report.new_rows > 0);
        if !wanted {
            return;
        }

        let data = self.store.lock().await.snapshot_tail(report.new_rows);
        if data.len() != report.new_rows {
            warn!(
                "History cleared before delivery: batch holds {} of {} new rows",
                data.len(),
                report.new_rows
            );
        }
        self.sequence += 1;
        debug!(
            "Delivering batch {} ({} rows, complete={})",
            self.sequence,
            data.len(),
            report.is_complete()
        );
        self.sink.deliver(Batch {
            sequence: self.sequence,
            complete: report.is_complete(),
            data,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::BatchEnd;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{
        AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadBuf,
    };
    use tokio::time::{sleep, timeout};

    /// Read half that fails every read with EIO
    struct FailingLink;

    impl AsyncRead for FailingLink {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::from_raw_os_error(5)))
        }
    }

    impl AsyncBufRead for FailingLink {
        fn poll_fill_buf(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<&[u8]>> {
            Poll::Ready(Err(std::io::Error::from_raw_os_error(5)))
        }

        fn consume(self: Pin<&mut Self>, _amt: usize) {}
    }

    struct Rig {
        controller: AcquisitionController,
        device_out: DuplexStream,
        device_cmd: DuplexStream,
        batches: mpsc::UnboundedReceiver<Batch>,
    }

    fn config(capacity: usize, batch_size: usize) -> AcquisitionConfig {
        AcquisitionConfig {
            capacity,
            batch_size: Some(batch_size),
            read_timeout_ms: 1000,
            command_timeout_ms: 500,
            ..Default::default()
        }
    }

    async fn rig(config: AcquisitionConfig) -> Rig {
        let (device_out, host_in) = tokio::io::duplex(64 * 1024);
        let (host_cmd, device_cmd) = tokio::io::duplex(1024);

        let mut worker = AcquisitionWorker::from_config(&config).unwrap();
        worker.attach(LineReader::new(BufReader::new(host_in))).await;
        let commands = CommandPort::new(host_cmd, config.command_timeout());
        let (tx, batches) = mpsc::unbounded_channel();

        let controller = AcquisitionController::spawn(&config, worker, commands, tx)
            .await
            .unwrap();
        Rig {
            controller,
            device_out,
            device_cmd,
            batches,
        }
    }

    fn line(time_ms: u32) -> String {
        format!("{}\t0\t{}\t5000.0\t0.15\t0.5\n", time_ms, time_ms)
    }

    async fn emit(device: &mut DuplexStream, times: std::ops::RangeInclusive<u32>) {
        for t in times {
            device.write_all(line(t).as_bytes()).await.unwrap();
        }
    }

    async fn commands_received(device_cmd: &mut DuplexStream, len: usize) -> String {
        let mut buf = vec![0u8; len];
        device_cmd.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    async fn next_batch(batches: &mut mpsc::UnboundedReceiver<Batch>) -> Batch {
        timeout(Duration::from_secs(5), batches.recv())
            .await
            .expect("batch not delivered")
            .expect("sink closed")
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_delivered_in_order() {
        let mut rig = rig(config(3, 3)).await;
        assert_eq!(commands_received(&mut rig.device_cmd, 3).await, "on\n");

        emit(&mut rig.device_out, 1..=6).await;

        let first = next_batch(&mut rig.batches).await;
        let second = next_batch(&mut rig.batches).await;
        assert_eq!(first.sequence, 1);
        assert!(first.complete);
        assert_eq!(first.data.column("time").unwrap(), &[0.001, 0.002, 0.003]);
        assert_eq!(second.sequence, 2);
        assert_eq!(second.data.column("I_1").unwrap(), &[4.0, 5.0, 6.0]);

        let stats = rig.controller.stats();
        assert!(stats.batches >= 2);
        assert!(stats.rows >= 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_lets_in_flight_batch_finish() {
        let mut rig = rig(config(10, 3)).await;

        emit(&mut rig.device_out, 1..=1).await;
        sleep(Duration::from_millis(10)).await;

        rig.controller.disable().await.unwrap();
        assert!(!rig.controller.is_enabled());

        // The cycle that already holds row 1 still completes
        emit(&mut rig.device_out, 2..=3).await;
        let batch = next_batch(&mut rig.batches).await;
        assert_eq!(batch.data.column("time").unwrap(), &[0.001, 0.002, 0.003]);

        // No new cycle starts while disabled
        emit(&mut rig.device_out, 4..=6).await;
        assert!(timeout(Duration::from_secs(30), rig.batches.recv()).await.is_err());
        assert_eq!(rig.controller.stats().cycles, 1);
        assert_eq!(rig.controller.snapshot().await.len(), 3);

        rig.controller.enable().await.unwrap();
        let batch = next_batch(&mut rig.batches).await;
        assert_eq!(batch.sequence, 2);
        assert_eq!(batch.data.column("time").unwrap(), &[0.004, 0.005, 0.006]);

        assert_eq!(commands_received(&mut rig.device_cmd, 10).await, "on\noff\non\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_during_batch_keeps_rows() {
        let mut rig = rig(config(10, 3)).await;

        emit(&mut rig.device_out, 1..=1).await;
        sleep(Duration::from_millis(10)).await;
        rig.controller.reset_accumulators().await.unwrap();
        emit(&mut rig.device_out, 2..=3).await;

        let batch = next_batch(&mut rig.batches).await;
        assert_eq!(batch.data.len(), 3);

        let snapshot = rig.controller.snapshot().await;
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.columns.iter().all(|c| c.len() == 3));
        assert_eq!(snapshot.column("I_1").unwrap(), &[1.0, 2.0, 3.0]);

        assert_eq!(commands_received(&mut rig.device_cmd, 5).await, "on\nr\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_from_empty_cycles() {
        let mut config = config(10, 3);
        config.read_timeout_ms = 100;
        config.critical_not_alive_count = 2;
        let mut rig = rig(config).await;
        assert!(rig.controller.is_alive());

        sleep(Duration::from_millis(350)).await;
        assert!(!rig.controller.is_alive());
        assert!(rig.controller.stats().error_count >= 2);

        emit(&mut rig.device_out, 1..=1).await;
        sleep(Duration::from_millis(250)).await;
        assert!(rig.controller.is_alive());
        assert_eq!(rig.controller.latest().await.unwrap()[0], ("time".to_string(), 0.001));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batches_delivered_when_configured() {
        let mut config = config(10, 5);
        config.deliver_partial_batches = true;
        let mut rig = rig(config).await;

        emit(&mut rig.device_out, 1..=2).await;
        let batch = next_batch(&mut rig.batches).await;
        assert!(!batch.complete);
        assert_eq!(batch.data.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batches_not_delivered_by_default() {
        let mut rig = rig(config(10, 5)).await;

        emit(&mut rig.device_out, 1..=2).await;
        assert!(timeout(Duration::from_secs(5), rig.batches.recv()).await.is_err());
        // Still visible to snapshot readers
        assert_eq!(rig.controller.snapshot().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_disabled() {
        let mut config = config(10, 2);
        config.start_enabled = false;
        let mut rig = rig(config).await;
        assert!(!rig.controller.is_enabled());

        emit(&mut rig.device_out, 1..=2).await;
        assert!(timeout(Duration::from_secs(10), rig.batches.recv()).await.is_err());

        rig.controller.enable().await.unwrap();
        assert_eq!(next_batch(&mut rig.batches).await.data.len(), 2);
        assert_eq!(commands_received(&mut rig.device_cmd, 3).await, "on\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reattach_after_disconnect() {
        let mut rig = rig(config(10, 2)).await;

        emit(&mut rig.device_out, 1..=2).await;
        next_batch(&mut rig.batches).await;
        drop(rig.device_out);
        sleep(Duration::from_millis(10)).await;

        let (mut device_out, host_in) = tokio::io::duplex(1024);
        rig.controller
            .reattach(LineReader::new(BufReader::new(host_in)))
            .unwrap();
        emit(&mut device_out, 7..=8).await;

        let batch = next_batch(&mut rig.batches).await;
        assert_eq!(batch.sequence, 2);
        assert_eq!(
            rig.controller.snapshot().await.column("time").unwrap(),
            &[0.007, 0.008]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_history() {
        let mut rig = rig(config(10, 2)).await;

        emit(&mut rig.device_out, 1..=2).await;
        next_batch(&mut rig.batches).await;
        rig.controller.clear_history().await.unwrap();

        assert!(rig.controller.snapshot().await.is_empty());
        assert!(rig.controller.latest().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_commands() {
        let rig = rig(config(10, 2)).await;

        rig.controller.shutdown().await.unwrap();
        assert!(matches!(
            rig.controller.enable().await,
            Err(AcquisitionError::ShutDown)
        ));
        assert!(matches!(
            rig.controller.reset_accumulators().await,
            Err(AcquisitionError::ShutDown)
        ));
        assert!(rig.controller.shutdown().await.is_ok());
        assert!(rig.controller.snapshot().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_surfaces() {
        let rig = rig(config(10, 2)).await;
        drop(rig.device_cmd);

        let result = rig.controller.reset_accumulators().await;
        assert!(matches!(
            result,
            Err(AcquisitionError::Transport(
                turbine_protocol::TransportError::TransportWriteFailure { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_io_error_parks_until_reattach() {
        let config = config(10, 2);
        let mut worker = AcquisitionWorker::from_config(&config).unwrap();
        worker.attach(LineReader::new(FailingLink)).await;
        let (host_cmd, _device_cmd) = tokio::io::duplex(1024);
        let (tx, mut batches) = mpsc::unbounded_channel();
        let commands = CommandPort::new(host_cmd, config.command_timeout());

        let controller = AcquisitionController::spawn(&config, worker, commands, tx)
            .await
            .unwrap();
        sleep(Duration::from_millis(100)).await;

        let stats = controller.stats();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.error_count, 1);
        assert!(matches!(stats.last_end, Some(BatchEnd::Transport(_))));
        assert!(controller.is_enabled());
        assert!(controller.snapshot().await.is_empty());

        let (mut device_out, host_in) = tokio::io::duplex(1024);
        controller
            .reattach(LineReader::new(BufReader::new(host_in)))
            .unwrap();
        emit(&mut device_out, 1..=2).await;
        assert_eq!(next_batch(&mut batches).await.data.len(), 2);
    }

    #[tokio::test]
    async fn test_spawn_rejects_worker_smaller_than_batch() {
        let config = config(10, 5);
        let worker = AcquisitionWorker::new(config.decoder(), 3, config.read_timeout()).unwrap();
        let (host_cmd, _device_cmd) = tokio::io::duplex(64);
        let commands = CommandPort::new(host_cmd, config.command_timeout());

        let result = AcquisitionController::spawn(&config, worker, commands, ()).await;
        assert!(matches!(
            result,
            Err(AcquisitionError::Config(e)) if e.field == "batch_size"
        ));
    }

    #[tokio::test]
    async fn test_batch_shortened_by_cleared_history() {
        let config = config(10, 3);
        let worker = AcquisitionWorker::from_config(&config).unwrap();
        let store = worker.store();
        let (_run_tx, run_rx) = watch::channel(RunState::Enabled);
        let (stats_tx, _stats_rx) = watch::channel(AcquisitionStats::default());
        let (_attach_tx, attach_rx) = mpsc::unbounded_channel();
        let (tx, mut batches) = mpsc::unbounded_channel();
        let mut task = AcquisitionTask {
            worker,
            store: store.clone(),
            sink: tx,
            run_rx,
            attach_rx,
            stats_tx,
            recorder: StatsRecorder::new(std::time::Instant::now()),
            batch_size: 3,
            deliver_partial: false,
            sequence: 0,
        };

        // Two of the three rows were cleared before delivery
        store
            .lock()
            .await
            .append_row(&[0.003, 3.0, 5000.0, 0.15, 0.5, 15.0])
            .unwrap();
        task.deliver(&ListenReport {
            new_rows: 3,
            end: BatchEnd::Complete,
        })
        .await;

        let batch = batches.recv().await.unwrap();
        assert_eq!(batch.sequence, 1);
        assert_eq!(batch.data.len(), 1);
        assert_eq!(batch.data.column("time").unwrap(), &[0.003]);
    }
}
