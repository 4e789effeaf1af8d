//! Broker interface
//!
//! The broker fragments and reassembles frames and owns the TX/RX queues
//! backed by the bus DMA. The node only sees this non-blocking surface:
//! `task` services the queues, `try_receive` pops one reassembled frame,
//! `send` enqueues and reports backpressure. [`MemoryBroker`] is the
//! in-memory implementation used on the host and in tests.

use crate::frame::Frame;
use thiserror::Error;

/// TX queue full; the caller drops the frame and retries later
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("broker TX queue full")]
pub struct TxFull;

/// Non-blocking frame transport
pub trait Broker {
    /// Service TX/RX machinery; called liberally from the run loop
    fn task(&mut self);

    /// Pop one received frame, if any
    fn try_receive(&mut self) -> Option<Frame>;

    /// Enqueue a frame for transmission
    fn send(&mut self, frame: Frame) -> Result<(), TxFull>;
}

/// In-memory broker backed by plain queues
#[derive(Debug, Default)]
pub struct MemoryBroker {
    rx: std::collections::VecDeque<Frame>,
    tx: std::collections::VecDeque<Frame>,
    tx_capacity: Option<usize>,
    /// Number of `task` invocations observed
    pub task_count: u32,
}

impl MemoryBroker {
    /// Create a broker with unbounded TX
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broker whose TX queue rejects frames beyond `capacity`
    pub fn with_tx_capacity(capacity: usize) -> Self {
        Self {
            tx_capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Feed a frame into the RX side
    pub fn push_rx(&mut self, frame: Frame) {
        self.rx.push_back(frame);
    }

    /// Drain everything the node transmitted
    pub fn take_sent(&mut self) -> Vec<Frame> {
        self.tx.drain(..).collect()
    }

    /// Frames currently queued for transmission
    pub fn tx_len(&self) -> usize {
        self.tx.len()
    }
}

impl Broker for MemoryBroker {
    fn task(&mut self) {
        self.task_count += 1;
    }

    fn try_receive(&mut self) -> Option<Frame> {
        self.rx.pop_front()
    }

    fn send(&mut self, frame: Frame) -> Result<(), TxFull> {
        if let Some(capacity) = self.tx_capacity {
            if self.tx.len() >= capacity {
                return Err(TxFull);
            }
        }
        self.tx.push_back(frame);
        Ok(())
    }
}
