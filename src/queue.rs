//! Mutex-guarded work queue between producer tasks and the scheduler.
//!
//! Each direction is an independent [`Lane`]: a FIFO of heap nodes behind
//! its own critical-section mutex.  The lock is only ever held for a
//! pointer splice; node allocation happens before the lock is taken and
//! node deallocation after it is released.
//!
//! ```text
//!  producer task                  lock held            scheduler task
//!  ─────────────                  ─────────            ──────────────
//!  alloc node ──▶ enqueue_tail:   append(node)
//!                 dequeue_head:   split_off(1)  ──▶ handle + free node
//!                 drain_all:      take(list)    ──▶ free whole list
//!                 reinsert_head:  append(tail)
//! ```
//!
//! Lane operations must not be called from a true interrupt handler.
//! ISRs post an [`IrqToken`](crate::irq::IrqToken) instead.

use core::cell::RefCell;
use std::collections::LinkedList;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Detached run of items, as returned by [`Lane::drain_all`].
pub type Batch<T> = LinkedList<T>;

/// One direction of the work queue.
pub struct Lane<T> {
    list: Mutex<CriticalSectionRawMutex, RefCell<LinkedList<T>>>,
}

impl<T> Default for Lane<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Lane<T> {
    pub const fn new() -> Self {
        Self {
            list: Mutex::new(RefCell::new(LinkedList::new())),
        }
    }

    /// Append `item` at the tail.
    pub fn enqueue_tail(&self, item: T) {
        let mut node = LinkedList::new();
        node.push_back(item);
        self.list.lock(|list| list.borrow_mut().append(&mut node));
    }

    /// Remove and return the oldest item, or `None` when empty.
    pub fn dequeue_head(&self) -> Option<T> {
        let mut head = self.list.lock(|list| {
            let mut list = list.borrow_mut();
            if list.is_empty() {
                return LinkedList::new();
            }
            let rest = list.split_off(1);
            core::mem::replace(&mut *list, rest)
        });
        head.pop_front()
    }

    /// Atomically detach everything currently queued.
    ///
    /// Items enqueued after this call stay in the lane.
    pub fn drain_all(&self) -> Batch<T> {
        self.list.lock(|list| core::mem::take(&mut *list.borrow_mut()))
    }

    /// Put a previously detached batch back in front of the current items.
    pub fn reinsert_head(&self, mut batch: Batch<T>) {
        if batch.is_empty() {
            return;
        }
        self.list.lock(|list| {
            let mut list = list.borrow_mut();
            batch.append(&mut list);
            core::mem::swap(&mut *list, &mut batch);
        });
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.list.lock(|list| list.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receive and send lanes, each with its own lock.
///
/// The scheduler consumes `recv`; a transport task that cannot be written
/// from the scheduler directly drains `send`.
pub struct WorkQueue<T> {
    recv: Lane<T>,
    send: Lane<T>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub const fn new() -> Self {
        Self {
            recv: Lane::new(),
            send: Lane::new(),
        }
    }

    /// Producers → scheduler.
    pub fn recv(&self) -> &Lane<T> {
        &self.recv
    }

    /// Scheduler → outbound transport task.
    pub fn send(&self) -> &Lane<T> {
        &self.send
    }
}
