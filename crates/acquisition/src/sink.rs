//! Batch Delivery

use ring_buffer::ChannelSnapshot;
use tokio::sync::mpsc;
use tracing::debug;

/// Rows appended by one listen cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 1-based delivery sequence number
    pub sequence: u64,
    /// Whether the cycle filled its batch
    pub complete: bool,
    /// The newly appended rows, oldest first
    pub data: ChannelSnapshot,
}

/// Consumer of batches, called on the acquisition task in batch order
///
/// Implementations must not block for long: the next listen cycle starts only
/// after `deliver` returns.
pub trait BatchSink: Send + 'static {
    /// Take one batch
    fn deliver(&mut self, batch: Batch);
}

impl<F> BatchSink for F
where
    F: FnMut(Batch) + Send + 'static,
{
    fn deliver(&mut self, batch: Batch) {
        self(batch)
    }
}

/// Unbounded so that nothing is dropped on the consumer's behalf
impl BatchSink for mpsc::UnboundedSender<Batch> {
    fn deliver(&mut self, batch: Batch) {
        if self.send(batch).is_err() {
            debug!("Batch receiver dropped");
        }
    }
}

/// Discard every batch
impl BatchSink for () {
    fn deliver(&mut self, _batch: Batch) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn batch(sequence: u64) -> Batch {
        Batch {
            sequence,
            complete: true,
            data: ChannelSnapshot {
                names: vec!["time".to_string()],
                columns: vec![vec![sequence as f64]],
            },
        }
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_sink = Arc::clone(&seen);
        let mut sink = move |b: Batch| seen_in_sink.lock().unwrap().push(b.sequence);

        sink.deliver(batch(1));
        sink.deliver(batch(2));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_channel_sink_keeps_order() {
        let (mut tx, mut rx) = mpsc::unbounded_channel();
        for i in 1..=3 {
            tx.deliver(batch(i));
        }
        drop(tx);

        let mut received = Vec::new();
        while let Some(b) = rx.recv().await {
            received.push(b.sequence);
        }
        assert_eq!(received, vec![1, 2, 3]);
    }
}
