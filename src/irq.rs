//! Interrupt-to-task handoff.
//!
//! Interrupt handlers never touch the work queue.  They post a one-byte
//! [`IrqToken`] into a lock-free ring and signal the producer task that
//! owns the channel; that task does the allocation and the locked
//! enqueue.
//!
//! ```text
//! ┌─────────────┐  post_from_isr  ┌─────────────┐  recv   ┌──────────────┐
//! │ Radio DIO0  │────────────────▶│ MpMcQueue   │────────▶│ producer task│──▶ submit_event
//! │ Button edge │────────────────▶│ (lock-free) │         │ (alloc+lock) │
//! └─────────────┘                 └─────────────┘         └──────────────┘
//! ```

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use heapless::mpmc::MpMcQueue;

use crate::app::ports::{Notify, WaitOutcome};
use crate::error::SubmitError;

/// Ring capacity.  Must be a power of two.
pub const IRQ_RING_CAPACITY: usize = 16;

/// Minimal record an interrupt handler is allowed to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqToken {
    /// RX-done: a packet is waiting in the modem FIFO.
    RadioReadPacket,
    /// Frequency-hop-period IRQ.
    RadioHop,
    /// Shut the radio producer task down.
    RadioStop,
    /// Button edge, stamped with the scheduler tick it fired on.
    ButtonEdge { tick: u32 },
}

/// Bounded ISR-safe channel with an attached wakeup.
pub struct IrqChannel {
    ring: MpMcQueue<IrqToken, IRQ_RING_CAPACITY>,
    notify: Arc<dyn Notify>,
    overflows: AtomicU32,
}

impl IrqChannel {
    pub fn new(notify: Arc<dyn Notify>) -> Self {
        Self {
            ring: MpMcQueue::new(),
            notify,
            overflows: AtomicU32::new(0),
        }
    }

    /// Post a token.  Never blocks and never allocates.
    ///
    /// A full ring drops the token and bumps the overflow counter; the
    /// consumer reports it since logging is not allowed here.
    pub fn post_from_isr(&self, token: IrqToken) -> Result<(), SubmitError> {
        let res = match self.ring.enqueue(token) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.overflows.fetch_add(1, Ordering::Relaxed);
                Err(SubmitError::IrqRingFull)
            }
        };
        self.notify.signal();
        res
    }

    /// Pop the oldest token without waiting.
    pub fn try_recv(&self) -> Option<IrqToken> {
        self.ring.dequeue()
    }

    /// Pop the oldest token, waiting up to `timeout_ticks` (`None` = forever).
    pub fn recv(&self, timeout_ticks: Option<u32>) -> Option<IrqToken> {
        loop {
            if let Some(token) = self.ring.dequeue() {
                return Some(token);
            }
            if self.notify.wait(timeout_ticks) == WaitOutcome::TimedOut {
                return self.ring.dequeue();
            }
        }
    }

    /// Tokens dropped because the ring was full, cleared on read.
    pub fn take_overflows(&self) -> u32 {
        self.overflows.swap(0, Ordering::Relaxed)
    }
}
