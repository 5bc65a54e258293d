//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing runtime lifecycle events to the
//! ESP-IDF logger (UART / USB-CDC in production).

use log::{error, info, warn};

use crate::app::events::RuntimeEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`RuntimeEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &RuntimeEvent) {
        match event {
            RuntimeEvent::ResetCompleted { discarded } => {
                info!("RESET | discarded={}", discarded);
            }
            RuntimeEvent::LoadFailed { path, error } => {
                warn!("LOAD  | {} failed: {}", path, error);
            }
            RuntimeEvent::ScriptLoaded { path, attempts } => {
                info!("LOAD  | {} running (attempts={})", path, attempts);
            }
            RuntimeEvent::AwaitingCommand { attempts } => {
                error!(
                    "LOAD  | rotation exhausted after {} attempt(s), awaiting command",
                    attempts
                );
            }
            RuntimeEvent::TimerFired => {
                info!("TIMER | fired");
            }
            RuntimeEvent::DispatchFailed { entrypoint, error } => {
                warn!("SCRIPT| {}() failed: {}", entrypoint.name(), error);
            }
            RuntimeEvent::SendFailed(e) => {
                warn!("UI    | send failed: {}", e);
            }
        }
    }
}
