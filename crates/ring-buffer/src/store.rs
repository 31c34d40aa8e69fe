//! Lock-Step Channel Store

use crate::buffer::RingBuffer;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Named collection of equally sized ring buffers, one per channel
///
/// The only way to add data is [`ChannelStore::append_row`], which appends
/// exactly one value to every channel, so all channels always share the same
/// length.
#[derive(Debug, Clone)]
pub struct ChannelStore {
    names: Vec<String>,
    buffers: Vec<RingBuffer<f64>>,
}

impl ChannelStore {
    /// Create a store with one ring buffer of `capacity` per channel name
    pub fn new<I, S>(names: I, capacity: usize) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(StoreError::NoChannels);
        }
        if capacity == 0 {
            return Err(StoreError::ZeroCapacity);
        }

        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(StoreError::DuplicateChannel(name.clone()));
            }
        }

        let buffers = names.iter().map(|_| RingBuffer::new(capacity)).collect();
        Ok(Self { names, buffers })
    }

    /// Append one value to every channel, in channel order
    pub fn append_row(&mut self, row: &[f64]) -> Result<(), StoreError> {
        if row.len() != self.buffers.len() {
            return Err(StoreError::RowWidthMismatch {
                expected: self.buffers.len(),
                actual: row.len(),
            });
        }

        for (buffer, &value) in self.buffers.iter_mut().zip(row) {
            buffer.append(value);
        }
        Ok(())
    }

    /// Look up a channel by name
    pub fn channel(&self, name: &str) -> Option<&RingBuffer<f64>> {
        self.index_of(name).map(|i| &self.buffers[i])
    }

    /// Channel names in storage order
    pub fn channel_names(&self) -> &[String] {
        &self.names
    }

    /// Number of channels
    pub fn width(&self) -> usize {
        self.names.len()
    }

    /// Number of rows currently retained (identical for every channel)
    pub fn len(&self) -> usize {
        self.buffers[0].len()
    }

    /// Check if the store holds no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-channel capacity
    pub fn capacity(&self) -> usize {
        self.buffers[0].capacity()
    }

    /// Check if every channel is at capacity
    pub fn is_full(&self) -> bool {
        self.buffers[0].is_full()
    }

    /// Total rows ever appended
    pub fn total_written(&self) -> usize {
        self.buffers[0].total_written()
    }

    /// Clear every channel
    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
    }

    /// The newest row as `(channel, value)` pairs
    pub fn latest(&self) -> Option<Vec<(&str, f64)>> {
        if self.is_empty() {
            return None;
        }
        Some(
            self.names
                .iter()
                .zip(&self.buffers)
                .filter_map(|(name, buffer)| buffer.last().map(|v| (name.as_str(), *v)))
                .collect(),
        )
    }

    /// Copy the whole window
    pub fn snapshot(&self) -> ChannelSnapshot {
        self.snapshot_tail(self.len())
    }

    /// Copy the newest `rows` rows, oldest first
    pub fn snapshot_tail(&self, rows: usize) -> ChannelSnapshot {
        ChannelSnapshot {
            names: self.names.clone(),
            columns: self.buffers.iter().map(|b| b.tail(rows)).collect(),
        }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Point-in-time copy of a [`ChannelStore`] window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    /// Channel names in storage order
    pub names: Vec<String>,
    /// One column per channel, oldest row first
    pub columns: Vec<Vec<f64>>,
}

impl ChannelSnapshot {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Check if the snapshot holds no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column values for a channel
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Row `index` across all channels
    pub fn row(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.len() {
            return None;
        }
        Some(self.columns.iter().map(|c| c[index]).collect())
    }

    /// Tab-separated channel names
    pub fn tsv_header(&self) -> String {
        self.names.join("\t")
    }

    /// Tab-separated rows, four decimals per value
    pub fn to_tsv_rows(&self) -> Vec<String> {
        (0..self.len())
            .map(|i| {
                self.columns
                    .iter()
                    .map(|c| format!("{:.4}", c[i]))
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect()
    }
}
