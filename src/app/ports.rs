//! Port traits — the hexagonal boundary between the runtime core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Scheduler (core)
//! ```
//!
//! Driven adapters (script engine, filesystem, clock, notification,
//! transports, radio) implement these traits.  The
//! [`Scheduler`](crate::scheduler::Scheduler) consumes them via generics,
//! so the core never touches ESP-IDF or the script VM directly.
//!
//! ## Threading notes
//!
//! - **ScriptEngine** instances are only ever touched by the scheduler task.
//! - **Notify::signal** must be callable from any task and, on device,
//!   from interrupt context.
//! - **Sender** implementations are shared behind a mutex and must be `Send`.

use crate::error::{RadioError, ScriptError, SendError, StoreError};
use crate::events::Event;
use crate::runtime::RuntimeHandle;

// ───────────────────────────────────────────────────────────────
// Script engine port
// ───────────────────────────────────────────────────────────────

/// Script functions the runtime calls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entrypoint {
    /// Called once after the top-level code of a freshly loaded script ran.
    OnStart,
    /// Called for every Incoming event.
    OnEvent,
    /// Called when the script timer expires.
    OnTimer,
}

impl Entrypoint {
    pub const fn name(self) -> &'static str {
        match self {
            Self::OnStart => "OnStart",
            Self::OnEvent => "OnEvent",
            Self::OnTimer => "OnTimer",
        }
    }
}

/// Arguments for an [`Entrypoint`] call.
///
/// Engines turn an event into their own object representation with
/// [`script_object::event_properties`](crate::adapters::script_object::event_properties).
#[derive(Debug, Clone, Copy)]
pub enum ScriptArgs<'a> {
    None,
    Event(&'a Event),
}

/// A native module exposed to scripts as a global object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityModule {
    /// Global name scripts see (`Platform`, `LoRa`, ...).
    pub name: &'static str,
    /// Functions installed on the global.  Engines refuse calls that no
    /// registered module lists.
    pub functions: &'static [&'static str],
}

impl CapabilityModule {
    pub fn provides(&self, function: &str) -> bool {
        self.functions.contains(&function)
    }
}

/// Modules registered on every fresh engine, in registration order.
///
/// `FileSystem`, `LoRa` and `Crypto` are installed as globals but carry no
/// functions yet.
pub const NATIVE_MODULES: [CapabilityModule; 5] = [
    CapabilityModule {
        name: "Util",
        functions: &["print", "throw"],
    },
    CapabilityModule {
        name: "Platform",
        functions: &[
            "reset",
            "reboot",
            "setLoadFileName",
            "setTimer",
            "sendEvent",
            "echo",
            "setConnectivity",
        ],
    },
    CapabilityModule {
        name: "FileSystem",
        functions: &[],
    },
    CapabilityModule {
        name: "LoRa",
        functions: &[],
    },
    CapabilityModule {
        name: "Crypto",
        functions: &[],
    },
];

/// Module that owns `function` in [`NATIVE_MODULES`].
pub fn native_owner(function: &str) -> Option<&'static CapabilityModule> {
    NATIVE_MODULES.iter().find(|m| m.provides(function))
}

/// One live script VM instance.  Dropping it destroys the VM.
pub trait ScriptEngine {
    /// Install a native module's global object.
    fn register_capability(&mut self, module: &CapabilityModule) -> Result<(), ScriptError>;

    /// Evaluate a script's top-level code.
    fn load_and_run(&mut self, source: &str) -> Result<(), ScriptError>;

    /// Call a global entrypoint function.
    fn invoke(&mut self, entrypoint: Entrypoint, args: ScriptArgs<'_>) -> Result<(), ScriptError>;
}

/// Creates fresh engine instances on every reset cycle.
pub trait EngineFactory {
    type Engine: ScriptEngine;

    /// Create a new VM.  Native functions reach runtime state through `runtime`.
    fn create(&mut self, runtime: &RuntimeHandle) -> Result<Self::Engine, ScriptError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: core → log / status surface)
// ───────────────────────────────────────────────────────────────

/// Receives lifecycle events emitted by the scheduler.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::RuntimeEvent);
}

// ───────────────────────────────────────────────────────────────
// Script store port (driven adapter: domain ← SPIFFS)
// ───────────────────────────────────────────────────────────────

/// Read-only access to script files.
pub trait ScriptStore {
    /// Return the full contents of the file at `path`.
    fn read(&self, path: &str) -> Result<String, StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Time and wakeup ports
// ───────────────────────────────────────────────────────────────

/// Monotonic tick source plus wall clock.
pub trait Clock {
    /// Current scheduler tick count (wraps at `u32::MAX`).
    fn now_ticks(&self) -> u32;

    /// Fixed length of one tick.
    fn ms_per_tick(&self) -> u32;

    /// Wall-clock time in epoch seconds, `None` until the clock was set.
    fn epoch_secs(&self) -> Option<u64>;
}

/// Why [`Notify::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

/// Task wakeup primitive.  Multiple pending signals coalesce into one wake.
pub trait Notify: Send + Sync {
    /// Wake the waiting task.
    fn signal(&self);

    /// Block for at most `timeout_ticks`, or forever when `None`.
    fn wait(&self, timeout_ticks: Option<u32>) -> WaitOutcome;
}

// ───────────────────────────────────────────────────────────────
// Outbound UI transport port
// ───────────────────────────────────────────────────────────────

/// The active UI transport (WebSocket or BLE).
pub trait Sender: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<(), SendError>;
}

// ───────────────────────────────────────────────────────────────
// Radio port (driven adapter: LoRa modem over SPI)
// ───────────────────────────────────────────────────────────────

/// Task-side access to the LoRa modem after an IRQ was handed off.
pub trait RadioPort {
    /// Copy the last received packet into `buf`, returning its length.
    fn receive_packet(&mut self, buf: &mut [u8]) -> Result<usize, RadioError>;

    /// RSSI of the last received packet in dBm.
    fn packet_rssi(&mut self) -> i16;

    /// Put the modem back into continuous receive.
    fn rearm_receive(&mut self);

    /// Service a frequency-hopping IRQ.  Returns `true` if it was one.
    fn handle_hop(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// System port
// ───────────────────────────────────────────────────────────────

/// Device-level controls reachable from the management surface.
pub trait SystemPort: Send + Sync {
    /// Restart the chip.  Does not return on hardware.
    fn restart(&self);
}

// ───────────────────────────────────────────────────────────────
// Connectivity port
// ───────────────────────────────────────────────────────────────

/// Which UI transport is active.  Numeric values are the ones scripts pass
/// to `Platform.setConnectivity()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectivityMode {
    #[default]
    Off = 0,
    Wifi = 1,
    Ble = 2,
}

impl ConnectivityMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::Wifi),
            2 => Some(Self::Ble),
            _ => None,
        }
    }
}

/// Switches the UI transport and, with it, the registered Sender.
pub trait ConnectivityControl: Send {
    fn set_mode(&mut self, mode: ConnectivityMode) -> Result<(), SendError>;
    fn mode(&self) -> ConnectivityMode;
}
