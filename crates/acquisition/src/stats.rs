//! Acquisition Statistics

use crate::worker::{BatchEnd, ListenReport};
use std::time::{Duration, Instant};

/// Interval over which the row rate is averaged
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Counters published by the acquisition task after every listen cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionStats {
    /// Listen cycles run
    pub cycles: u64,
    /// Cycles that filled their batch
    pub batches: u64,
    /// Rows appended in total
    pub rows: u64,
    /// Cycles ended by a timeout, bad data or a transport fault
    pub error_count: u64,
    /// Consecutive cycles that appended nothing
    pub not_alive_streak: u32,
    /// When the last full batch completed
    pub last_batch_at: Option<Instant>,
    /// Why the last cycle ended
    pub last_end: Option<BatchEnd>,
    /// Rows per second over the last rate window
    pub obtained_rate_hz: f64,
}

/// Accumulates [`AcquisitionStats`] and the rate window
#[derive(Debug)]
pub(crate) struct StatsRecorder {
    stats: AcquisitionStats,
    window_start: Instant,
    window_rows: u64,
}

impl StatsRecorder {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            stats: AcquisitionStats::default(),
            window_start: now,
            window_rows: 0,
        }
    }

    /// Fold one listen cycle into the counters
    pub(crate) fn record(&mut self, report: &ListenReport, now: Instant) {
        let rows = report.new_rows as u64;
        self.stats.cycles += 1;
        self.stats.rows += rows;

        if report.is_complete() {
            self.stats.batches += 1;
            self.stats.last_batch_at = Some(now);
        }
        if report.is_error() {
            self.stats.error_count += 1;
        }
        if rows == 0 {
            self.stats.not_alive_streak = self.stats.not_alive_streak.saturating_add(1);
        } else {
            self.stats.not_alive_streak = 0;
        }
        self.stats.last_end = Some(report.end.clone());

        self.window_rows += rows;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= RATE_WINDOW {
            self.stats.obtained_rate_hz = self.window_rows as f64 / elapsed.as_secs_f64();
            self.window_start = now;
            self.window_rows = 0;
        }
    }

    pub(crate) fn stats(&self) -> &AcquisitionStats {
        &self.stats
    }
}
