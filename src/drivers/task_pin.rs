//! Core-pinned task spawning for the runtime's FreeRTOS tasks.
//!
//! ESP-IDF implements `std::thread` via pthreads.  `esp_pthread_set_cfg()`
//! sets thread-local configuration that applies to the *next*
//! `pthread_create()` from the calling thread, so the config→spawn pair
//! must not be interleaved with other thread creation on the same thread.
//!
//! | Task        | Core | Prio | Stack |
//! |-------------|------|------|-------|
//! | `scheduler` | App  | 5    | 16 KB |
//! | `radio-rx`  | App  | 10   | 4 KB  |
//! | `button`    | App  | 6    | 3 KB  |

use std::io;
use std::thread::JoinHandle;

/// CPU core identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// PRO_CPU: protocol stacks (WiFi, BLE, lwIP).
    Pro = 0,
    /// APP_CPU: script runtime and its producers.
    App = 1,
}

/// Placement of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// NUL-terminated for the pthread config.
    pub name: &'static str,
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
}

impl TaskSpec {
    fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

/// The script engine needs the deep stack.
pub const SCHEDULER_TASK: TaskSpec = TaskSpec {
    name: "scheduler\0",
    core: Core::App,
    priority: 5,
    stack_kb: 16,
};

/// Drains radio IRQ tokens; above the scheduler so the FIFO is read promptly.
pub const RADIO_TASK: TaskSpec = TaskSpec {
    name: "radio-rx\0",
    core: Core::App,
    priority: 10,
    stack_kb: 4,
};

pub const BUTTON_TASK: TaskSpec = TaskSpec {
    name: "button\0",
    core: Core::App,
    priority: 6,
    stack_kb: 3,
};

/// Spawn a thread pinned to `spec.core` with its priority and stack.
#[cfg(target_os = "espidf")]
pub fn spawn_task(
    spec: TaskSpec,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    use esp_idf_svc::sys;

    // SAFETY: `cfg` is fully initialised by the default constructor and
    // `spec.name` is a NUL-terminated static string.
    let ret = unsafe {
        let mut cfg = sys::esp_create_default_pthread_config();
        cfg.pin_to_core = spec.core as i32;
        cfg.prio = i32::from(spec.priority);
        cfg.stack_size = (spec.stack_kb * 1024) as i32;
        cfg.thread_name = spec.name.as_ptr() as *const _;
        sys::esp_pthread_set_cfg(&cfg)
    };
    if ret != sys::ESP_OK as i32 {
        return Err(io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
    }

    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        spec.display_name(),
        spec.core,
        spec.priority,
        spec.stack_kb
    );
    std::thread::Builder::new()
        .name(spec.display_name().into())
        .stack_size(spec.stack_kb * 1024)
        .spawn(f)
}

/// Simulation fallback: ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_task(
    spec: TaskSpec,
    f: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    log::info!(
        "Spawning '{}' (sim, no core pinning, stack={}KB)",
        spec.display_name(),
        spec.stack_kb
    );
    std::thread::Builder::new()
        .name(spec.display_name().into())
        .stack_size(spec.stack_kb.max(64) * 1024)
        .spawn(f)
}
