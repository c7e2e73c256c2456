use common::domain::Envelope;
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatcherState {
    Idle,
    Accumulating,
    Flushing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueOutcome {
    /// Oldest envelopes evicted to stay within capacity
    pub dropped: usize,
    /// The queue reached the batch size
    pub flush_due: bool,
}

/// FIFO of envelopes awaiting delivery, bounded by `max_len`
///
/// A flush drains the whole queue. While it is in flight new envelopes
/// accumulate behind it; a failed batch goes back in front of them.
#[derive(Debug, Clone)]
pub struct PendingQueue {
    items: VecDeque<Envelope>,
    max_len: usize,
    batch_size: usize,
    flushing: bool,
}

impl PendingQueue {
    pub fn new(max_len: usize, batch_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_len,
            batch_size: batch_size.max(1),
            flushing: false,
        }
    }

    pub fn state(&self) -> BatcherState {
        if self.flushing {
            BatcherState::Flushing
        } else if self.items.is_empty() {
            BatcherState::Idle
        } else {
            BatcherState::Accumulating
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn enqueue(&mut self, envelope: Envelope) -> EnqueueOutcome {
        self.items.push_back(envelope);
        let dropped = self.enforce_capacity();
        EnqueueOutcome {
            dropped,
            flush_due: self.items.len() >= self.batch_size,
        }
    }

    /// Drains the queue for delivery. `None` when empty or a flush is
    /// already in flight.
    pub fn take_batch(&mut self) -> Option<Vec<Envelope>> {
        if self.flushing || self.items.is_empty() {
            return None;
        }
        self.flushing = true;
        Some(self.items.drain(..).collect())
    }

    pub fn complete_flush(&mut self) {
        self.flushing = false;
    }

    /// Puts a failed batch back ahead of anything enqueued meanwhile,
    /// then trims to capacity. Returns the number of envelopes dropped.
    pub fn requeue_front(&mut self, batch: Vec<Envelope>) -> usize {
        self.flushing = false;
        for envelope in batch.into_iter().rev() {
            self.items.push_front(envelope);
        }
        self.enforce_capacity()
    }

    /// Appends restored envelopes, keeping the most recent ones
    pub fn restore(&mut self, envelopes: Vec<Envelope>) -> usize {
        self.items.extend(envelopes);
        self.enforce_capacity()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Envelope> {
        self.items.iter()
    }

    fn enforce_capacity(&mut self) -> usize {
        let overflow = self.items.len().saturating_sub(self.max_len);
        if overflow > 0 {
            self.items.drain(..overflow);
            warn!(
                dropped = overflow,
                max_queue_size = self.max_len,
                "pending queue full, dropped oldest envelopes"
            );
        }
        overflow
    }
}
