//! Outbound UI [`Sender`] implementations.
//!
//! | Sender        | Transport | Delivery                                   |
//! |---------------|-----------|--------------------------------------------|
//! | `BleSender`   | BLE GATT  | record-framed indications, inline          |
//! | `LaneSender`  | WebSocket | queued on the send lane, written by a task |

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use log::debug;

use super::record;
use crate::app::ports::{Notify, Sender};
use crate::error::SendError;
use crate::events::{Event, EventKind};
use crate::queue::WorkQueue;

/// GATT overhead subtracted from the negotiated MTU per indication.
pub const GATT_OVERHEAD: usize = 5;

/// Low-level BLE indication channel to the connected central.
pub trait IndicationLink: Send {
    fn is_connected(&self) -> bool;
    /// Negotiated ATT MTU.
    fn mtu(&self) -> usize;
    fn indicate(&mut self, record: &[u8]) -> Result<(), SendError>;
}

/// Sends UI messages as length-prefixed records over BLE indications.
pub struct BleSender<L: IndicationLink> {
    link: L,
}

impl<L: IndicationLink> BleSender<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }
}

impl<L: IndicationLink> Sender for BleSender<L> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        if !self.link.is_connected() {
            return Err(SendError::NotConnected);
        }
        let record_size = self.link.mtu().saturating_sub(GATT_OVERHEAD);
        record::send_records(bytes, record_size, |r| self.link.indicate(r))
    }
}

/// Queues UI messages on the send lane for the WebSocket task.
pub struct LaneSender {
    queue: Arc<WorkQueue<Event>>,
    transport: Arc<dyn Notify>,
}

impl LaneSender {
    /// `transport` wakes the task that drains the send lane.
    pub fn new(queue: Arc<WorkQueue<Event>>, transport: Arc<dyn Notify>) -> Self {
        Self { queue, transport }
    }
}

impl Sender for LaneSender {
    fn send(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        self.queue
            .send()
            .enqueue_tail(Event::outgoing(EventKind::UiMessage, bytes.to_vec()));
        self.transport.signal();
        Ok(())
    }
}

/// Write everything currently on the send lane through `write`.
///
/// Runs on the transport task.  A failed write drops that message only.
pub fn pump_send_lane<W>(queue: &WorkQueue<Event>, mut write: W) -> usize
where
    W: FnMut(&[u8]) -> Result<(), SendError>,
{
    let mut written = 0;
    while let Some(event) = queue.send().dequeue_head() {
        let payload = event.into_payload().unwrap_or_default();
        match write(&payload) {
            Ok(()) => written += 1,
            Err(e) => debug!("UI frame ({} bytes) dropped: {}", payload.len(), e),
        }
    }
    written
}

/// Task that drains the send lane onto a transport.
///
/// Each transport start spawns a new pump with its own wakeup; the pump's
/// [`LaneSender`] signals that wakeup and nothing else, so a stopped pump
/// is never signalled again.
pub struct SendPump {
    queue: Arc<WorkQueue<Event>>,
    wake: Arc<dyn Notify>,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl SendPump {
    /// Spawn the pump thread.  `write` puts one frame on the wire.
    pub fn spawn<W>(
        name: &str,
        stack_size: usize,
        queue: Arc<WorkQueue<Event>>,
        wake: Arc<dyn Notify>,
        mut write: W,
    ) -> io::Result<Self>
    where
        W: FnMut(&[u8]) -> Result<(), SendError> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let task_queue = Arc::clone(&queue);
        let task_wake = Arc::clone(&wake);
        let task_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(name.into())
            .stack_size(stack_size)
            .spawn(move || {
                while task_running.load(Ordering::Acquire) {
                    task_wake.wait(None);
                    pump_send_lane(&task_queue, &mut write);
                }
                debug!("send pump exiting");
            })?;
        Ok(Self {
            queue,
            wake,
            running,
            handle,
        })
    }

    /// Sender that feeds this pump.
    pub fn sender(&self) -> LaneSender {
        LaneSender::new(Arc::clone(&self.queue), Arc::clone(&self.wake))
    }

    /// Wake the pump and join it.  `false` if the thread panicked.
    pub fn stop(self) -> bool {
        self.running.store(false, Ordering::Release);
        self.wake.signal();
        self.handle.join().is_ok()
    }
}
