//! `critical-section` provider for the work queue lanes on ESP-IDF.
//!
//! The lanes use embassy-sync's `CriticalSectionMutex`.  They are only
//! touched from task context (ISRs post to the lock-free [`IrqChannel`]
//! instead), so the section is a reentrant task lock rather than an
//! interrupt mask: the owning thread may nest, everyone else blocks until
//! the outermost release.
//!
//! [`IrqChannel`]: crate::irq::IrqChannel

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

struct Owner {
    thread: Option<ThreadId>,
    depth: u8,
}

/// Reentrant lock keyed on the calling thread.
pub(crate) struct Section {
    owner: Mutex<Owner>,
    released: Condvar,
}

impl Section {
    pub(crate) const fn new() -> Self {
        Self {
            owner: Mutex::new(Owner {
                thread: None,
                depth: 0,
            }),
            released: Condvar::new(),
        }
    }

    fn owner(&self) -> MutexGuard<'_, Owner> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter; returns the nesting depth.
    pub(crate) fn enter(&self) -> u8 {
        let me = thread::current().id();
        let mut state = self.owner();
        while state.thread.is_some_and(|t| t != me) {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.thread = Some(me);
        state.depth = state.depth.saturating_add(1);
        state.depth
    }

    /// Leave; the outermost exit hands the section to the next waiter.
    /// A thread that does not hold the section changes nothing.
    pub(crate) fn leave(&self) {
        let mut state = self.owner();
        if state.thread != Some(thread::current().id()) {
            return;
        }
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.thread = None;
            self.released.notify_one();
        }
    }
}

#[cfg(target_os = "espidf")]
static SECTION: Section = Section::new();

#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_acquire() -> u8 {
    SECTION.enter()
}

#[cfg(target_os = "espidf")]
#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_release(_token: u8) {
    SECTION.leave();
}
