//! UI link: inbound event plumbing and the connectivity switch.
//!
//! ```text
//!   WebSocket frame ─┐
//!   BLE records ─────┼──▶ UiInbound ──▶ recv lane (UiMessage / UiConnected / UiDisconnected)
//!   conn state ──────┘
//!
//!   setConnectivity(n) ──▶ Connectivity ──▶ stop old transport
//!                                        ──▶ start new transport
//!                                        ──▶ RuntimeHandle::set_sender
//! ```

use log::{info, warn};

use super::record::RecordAssembler;
use crate::app::ports::{ConnectivityControl, ConnectivityMode, Sender};
use crate::error::SendError;
use crate::events::{Event, EventKind};
use crate::runtime::RuntimeHandle;

// ───────────────────────────────────────────────────────────────
// Inbound
// ───────────────────────────────────────────────────────────────

/// Turns transport callbacks into runtime events.
pub struct UiInbound {
    runtime: RuntimeHandle,
    assembler: RecordAssembler,
}

impl UiInbound {
    pub fn new(runtime: RuntimeHandle) -> Self {
        Self {
            runtime,
            assembler: RecordAssembler::new(),
        }
    }

    /// Client connected or went away.
    pub fn on_conninfo(&mut self, connected: bool) {
        let kind = if connected {
            EventKind::UiConnected
        } else {
            self.assembler.clear();
            EventKind::UiDisconnected
        };
        self.runtime.submit(Event::status(kind));
    }

    /// A complete message arrived (WebSocket frame).
    pub fn on_message(&mut self, bytes: &[u8]) {
        self.runtime.submit(Event::ui_message(bytes.to_vec()));
    }

    /// One BLE record arrived.  Queues the message once it is complete.
    pub fn on_record(&mut self, record: &[u8]) {
        if let Some(msg) = self.assembler.push(record) {
            self.runtime.submit(Event::ui_message(msg));
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Transports
// ───────────────────────────────────────────────────────────────

/// A UI transport that can be brought up and down at runtime.
pub trait UiTransport: Send {
    fn start(&mut self) -> Result<(), SendError>;
    fn stop(&mut self);
    /// Sender to register while this transport is active.
    fn sender(&self) -> Box<dyn Sender>;
}

/// Owns both UI transports and keeps the registered Sender in sync with
/// whichever one is active.
pub struct Connectivity<W: UiTransport, B: UiTransport> {
    runtime: RuntimeHandle,
    wifi: W,
    ble: B,
    mode: ConnectivityMode,
}

impl<W: UiTransport, B: UiTransport> Connectivity<W, B> {
    pub fn new(runtime: RuntimeHandle, wifi: W, ble: B) -> Self {
        Self {
            runtime,
            wifi,
            ble,
            mode: ConnectivityMode::Off,
        }
    }

    fn transport(&mut self, mode: ConnectivityMode) -> Option<&mut dyn UiTransport> {
        match mode {
            ConnectivityMode::Off => None,
            ConnectivityMode::Wifi => Some(&mut self.wifi),
            ConnectivityMode::Ble => Some(&mut self.ble),
        }
    }
}

impl<W: UiTransport, B: UiTransport> ConnectivityControl for Connectivity<W, B> {
    fn set_mode(&mut self, mode: ConnectivityMode) -> Result<(), SendError> {
        if mode == self.mode {
            return Ok(());
        }
        let old = self.mode;
        self.runtime.set_sender(None);
        if let Some(t) = self.transport(old) {
            t.stop();
        }
        self.mode = ConnectivityMode::Off;

        let Some(t) = self.transport(mode) else {
            info!("Connectivity off");
            return Ok(());
        };
        if let Err(e) = t.start() {
            warn!("Connectivity {:?} failed to start: {}", mode, e);
            return Err(e);
        }
        let sender = t.sender();
        self.runtime.set_sender(Some(sender));
        self.mode = mode;
        info!("Connectivity {:?} -> {:?}", old, mode);
        Ok(())
    }

    fn mode(&self) -> ConnectivityMode {
        self.mode
    }
}
