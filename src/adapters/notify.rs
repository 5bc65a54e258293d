//! Task wakeup adapters implementing [`Notify`].
//!
//! - [`CondvarNotify`]: `Mutex<bool>` + `Condvar`.  Host tests and
//!   simulation; never used from interrupt context.
//! - [`TaskNotify`] (`target_os = "espidf"`): FreeRTOS direct-to-task
//!   notification.  The task blocked in `wait` is the waiter for the
//!   duration of that call only; `signal` is safe from ISRs.
//!
//! Both keep a pending flag so a signal raised before the waiter blocks is
//! not lost, and any number of signals coalesce into one wake.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::app::ports::{Notify, WaitOutcome};

/// Condition-variable notifier.
pub struct CondvarNotify {
    pending: Mutex<bool>,
    cond: Condvar,
    ms_per_tick: u32,
}

impl CondvarNotify {
    pub fn new(ms_per_tick: u32) -> Self {
        Self {
            pending: Mutex::new(false),
            cond: Condvar::new(),
            ms_per_tick: ms_per_tick.max(1),
        }
    }
}

impl Notify for CondvarNotify {
    fn signal(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = true;
        self.cond.notify_one();
    }

    fn wait(&self, timeout_ticks: Option<u32>) -> WaitOutcome {
        let guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let mut guard = match timeout_ticks {
            None => self
                .cond
                .wait_while(guard, |pending| !*pending)
                .unwrap_or_else(PoisonError::into_inner),
            Some(ticks) => {
                let timeout =
                    Duration::from_millis(u64::from(ticks) * u64::from(self.ms_per_tick));
                self.cond
                    .wait_timeout_while(guard, timeout, |pending| !*pending)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        if core::mem::take(&mut *guard) {
            WaitOutcome::Signaled
        } else {
            WaitOutcome::TimedOut
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::TaskNotify;

#[cfg(target_os = "espidf")]
mod esp {
    use core::num::NonZeroU32;
    use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

    use esp_idf_hal::delay::BLOCK;
    use esp_idf_hal::task;

    use crate::app::ports::{Notify, WaitOutcome};

    /// FreeRTOS task notification for one waiting task at a time.
    pub struct TaskNotify {
        waiter: AtomicPtr<esp_idf_svc::sys::tskTaskControlBlock>,
        pending: AtomicBool,
    }

    impl Default for TaskNotify {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TaskNotify {
        pub const fn new() -> Self {
            Self {
                waiter: AtomicPtr::new(core::ptr::null_mut()),
                pending: AtomicBool::new(false),
            }
        }
    }

    // The raw task handle is only ever passed back to FreeRTOS.
    unsafe impl Send for TaskNotify {}
    unsafe impl Sync for TaskNotify {}

    impl Notify for TaskNotify {
        fn signal(&self) {
            self.pending.store(true, Ordering::Release);
            let waiter = self.waiter.load(Ordering::Acquire);
            if !waiter.is_null() {
                // SAFETY: `waiter` is registered by a task currently inside
                // `wait`, which clears it before returning;
                // `notify_and_yield` picks the ISR variant when needed.
                unsafe {
                    task::notify_and_yield(waiter, NonZeroU32::MIN);
                }
            }
        }

        fn wait(&self, timeout_ticks: Option<u32>) -> WaitOutcome {
            let me = task::current().unwrap_or(core::ptr::null_mut());
            self.waiter.store(me, Ordering::Release);
            let outcome = if self.pending.swap(false, Ordering::AcqRel) {
                WaitOutcome::Signaled
            } else {
                let _ = task::wait_notification(timeout_ticks.unwrap_or(BLOCK));
                if self.pending.swap(false, Ordering::AcqRel) {
                    WaitOutcome::Signaled
                } else {
                    WaitOutcome::TimedOut
                }
            };
            // Leave the slot alone if another task took it over meanwhile.
            let _ = self.waiter.compare_exchange(
                me,
                core::ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            outcome
        }
    }
}
