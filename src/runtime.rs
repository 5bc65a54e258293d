//! Shared runtime state and the handle every task uses to reach it.
//!
//! The scheduler owns the script engine, the wake timer and the load
//! rotation outright.  Everything other tasks are allowed to touch lives
//! here, behind a cloneable [`RuntimeHandle`]:
//!
//! | Field              | Written by                     | Read / cleared by |
//! |--------------------|--------------------------------|-------------------|
//! | work queue         | producers, scripts             | scheduler         |
//! | `reset_requested`  | scripts, control surface       | scheduler         |
//! | pinned load path   | scripts, control surface       | scheduler         |
//! | timer request      | scripts (`setTimer`)           | scheduler         |
//! | sender             | connectivity switch            | scheduler         |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::app::commands::ControlCommand;
use crate::app::ports::{Notify, Sender, SystemPort};
use crate::error::{SendError, SubmitError};
use crate::events::{Direction, Event, EventKind, PayloadLength};
use crate::queue::WorkQueue;

struct Shared {
    queue: Arc<WorkQueue<Event>>,
    notify: Arc<dyn Notify>,
    reset_requested: AtomicBool,
    pinned_load_path: Mutex<Option<String>>,
    timer_request: Mutex<Option<u32>>,
    sender: Mutex<Option<Box<dyn Sender>>>,
}

/// Cloneable handle to the runtime's shared state.
#[derive(Clone)]
pub struct RuntimeHandle {
    shared: Arc<Shared>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RuntimeHandle {
    /// Create the shared state.  `notify` wakes the scheduler task.
    pub fn new(notify: Arc<dyn Notify>) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Arc::new(WorkQueue::new()),
                notify,
                reset_requested: AtomicBool::new(false),
                pinned_load_path: Mutex::new(None),
                timer_request: Mutex::new(None),
                sender: Mutex::new(None),
            }),
        }
    }

    // ── Producer side ─────────────────────────────────────────

    /// Build an event from raw producer data, queue it and wake the scheduler.
    ///
    /// Must not be called from interrupt context.
    pub fn submit_event(
        &self,
        kind: EventKind,
        direction: Direction,
        payload: Option<Vec<u8>>,
        len: PayloadLength,
        signal_strength: Option<i16>,
        timestamp: Option<u64>,
    ) -> Result<(), SubmitError> {
        let event = Event::new(kind, direction, payload, len, signal_strength, timestamp)
            .inspect_err(|e| warn!("Dropping {:?} event: {}", kind, e))?;
        self.submit(event);
        Ok(())
    }

    /// Queue an already built event and wake the scheduler.
    pub fn submit(&self, event: Event) {
        self.shared.queue.recv().enqueue_tail(event);
        self.shared.notify.signal();
    }

    /// Number of events waiting for the scheduler.
    pub fn pending_events(&self) -> usize {
        self.shared.queue.recv().len()
    }

    /// The work queue itself (scheduler and outbound transport task).
    pub fn queue(&self) -> &WorkQueue<Event> {
        &self.shared.queue
    }

    /// Owned reference to the work queue, for tasks that outlive a borrow.
    pub fn shared_queue(&self) -> Arc<WorkQueue<Event>> {
        Arc::clone(&self.shared.queue)
    }

    pub fn notifier(&self) -> &Arc<dyn Notify> {
        &self.shared.notify
    }

    // ── Control surface ───────────────────────────────────────

    /// Ask the scheduler to tear down the script and reload.
    pub fn request_reset(&self) {
        self.shared.reset_requested.store(true, Ordering::Release);
        self.shared.notify.signal();
    }

    /// Override the next load attempt.  An empty path clears the override.
    pub fn set_pinned_load_path(&self, path: &str) {
        let pinned = if path.is_empty() {
            None
        } else {
            Some(path.to_owned())
        };
        debug!("Pinned load path: {:?}", pinned);
        *lock(&self.shared.pinned_load_path) = pinned;
    }

    /// Apply a command from the management surface.
    pub fn handle_command(&self, cmd: ControlCommand, system: &dyn SystemPort) {
        match cmd {
            ControlCommand::RequestReset => {
                info!("Control: reset requested");
                self.request_reset();
            }
            ControlCommand::SetPinnedLoadPath(path) => {
                info!("Control: next load pinned to '{}'", path);
                self.set_pinned_load_path(&path);
            }
            ControlCommand::RequestReboot => {
                info!("Control: reboot requested");
                system.restart();
            }
        }
    }

    // ── Script side ───────────────────────────────────────────

    /// Request the script timer be (re)armed; `0` disarms it.
    ///
    /// Applied by the scheduler as soon as the current script call returns.
    pub fn set_timer(&self, duration_ms: u32) {
        *lock(&self.shared.timer_request) = Some(duration_ms);
    }

    // ── Outbound transport ────────────────────────────────────

    /// Replace the active Sender.  `None` disconnects outgoing UI traffic.
    pub fn set_sender(&self, sender: Option<Box<dyn Sender>>) {
        *lock(&self.shared.sender) = sender;
    }

    pub fn has_sender(&self) -> bool {
        lock(&self.shared.sender).is_some()
    }

    /// Deliver bytes through the active Sender.
    pub fn send_outgoing(&self, bytes: &[u8]) -> Result<(), SendError> {
        match lock(&self.shared.sender).as_mut() {
            Some(sender) => sender.send(bytes),
            None => Err(SendError::NotConnected),
        }
    }

    // ── Scheduler-only accessors ──────────────────────────────

    pub(crate) fn take_reset_request(&self) -> bool {
        self.shared.reset_requested.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn take_pinned_load_path(&self) -> Option<String> {
        lock(&self.shared.pinned_load_path).take()
    }

    pub(crate) fn take_timer_request(&self) -> Option<u32> {
        lock(&self.shared.timer_request).take()
    }

    pub fn reset_pending(&self) -> bool {
        self.shared.reset_requested.load(Ordering::Acquire)
    }

    pub fn pinned_load_path(&self) -> Option<String> {
        lock(&self.shared.pinned_load_path).clone()
    }
}
