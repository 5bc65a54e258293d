//! Outbound runtime lifecycle events.
//!
//! The [`Scheduler`](crate::scheduler::Scheduler) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them (serial log, status page, ...).

use crate::app::ports::Entrypoint;
use crate::error::{ScriptError, SendError};

/// Structured events emitted by the scheduler core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// Reset processing discarded the queued events and tore down the engine.
    ResetCompleted { discarded: usize },

    /// A load attempt failed; the rotation moves on.
    LoadFailed { path: String, error: String },

    /// A script is loaded and its `OnStart()` returned normally.
    ScriptLoaded { path: String, attempts: u32 },

    /// Every candidate failed; the runtime idles until commanded.
    AwaitingCommand { attempts: u32 },

    /// The script timer expired and `OnTimer()` is about to run.
    TimerFired,

    /// A script entrypoint raised an uncaught error.
    DispatchFailed {
        entrypoint: Entrypoint,
        error: ScriptError,
    },

    /// An Outgoing event could not be delivered to the UI.
    SendFailed(SendError),
}
