//! Runtime event model.
//!
//! Events are produced by:
//! - The LoRa receive task (packets, after the radio IRQ handoff)
//! - UI transports (WebSocket frames, BLE writes, connect/disconnect)
//! - The button task (press bursts, after the GPIO IRQ handoff)
//! - Scripts themselves (`sendEvent` → Outgoing UI messages)
//!
//! Events are consumed by the [`Scheduler`](crate::scheduler::Scheduler),
//! which is the only place they are destroyed.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Radio task  │────▶│              │     │              │──▶ OnEvent()
//! │ UI tasks    │────▶│  Work Queue  │────▶│  Scheduler   │
//! │ Button task │────▶│  (recv lane) │     │  (consumer)  │──▶ Sender
//! │ Scripts     │────▶│              │     │              │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use crate::error::SubmitError;

/// Kind of occurrence an [`Event`] describes.
///
/// The discriminant is the `EventType` number scripts see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    /// LoRa packet received.
    RadioReceived = 0,
    /// Message to or from the UI client.
    UiMessage = 1,
    /// UI client connected.
    UiConnected = 2,
    /// UI client disconnected.
    UiDisconnected = 3,
    /// Burst of button presses finished.
    ButtonPressed = 4,

    // ── Reserved (no producer yet) ────────────────────────
    UsbConnected = 5,
    UsbDisconnected = 6,
    BatteryCharging = 7,
    BatteryDraining = 8,
}

impl EventKind {
    /// Numeric code as exposed to scripts.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Reverse of [`code`](Self::code).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::RadioReceived),
            1 => Some(Self::UiMessage),
            2 => Some(Self::UiConnected),
            3 => Some(Self::UiDisconnected),
            4 => Some(Self::ButtonPressed),
            5 => Some(Self::UsbConnected),
            6 => Some(Self::UsbDisconnected),
            7 => Some(Self::BatteryCharging),
            8 => Some(Self::BatteryDraining),
            _ => None,
        }
    }
}

/// Which way an event travels relative to the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Delivered to the script's `OnEvent`.
    Incoming,
    /// Produced by the script, delivered to the active Sender.
    Outgoing,
}

/// How a producer describes the length of the buffer it hands over.
///
/// Resolved exactly once, in [`Event::new`]; nothing downstream sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLength {
    /// The first `n` bytes of the buffer are the payload.
    Explicit(usize),
    /// The payload ends at the first NUL byte (or the end of the buffer).
    NullTerminated,
}

/// Per-kind data attached to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventData {
    /// Packet bytes plus link metadata.
    Radio {
        payload: Vec<u8>,
        signal_strength: Option<i16>,
        timestamp: Option<u64>,
    },
    /// Number of presses counted in the burst.
    Button { presses: u32 },
    /// Opaque bytes (UI messages, reserved kinds).
    Bytes(Option<Vec<u8>>),
}

/// One occurrence travelling through the work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: EventKind,
    direction: Direction,
    data: EventData,
}

impl Event {
    /// Build an event from a producer-owned buffer.
    ///
    /// `signal_strength` and `timestamp` are only kept for
    /// [`EventKind::RadioReceived`]; a zero timestamp means "unset".
    pub fn new(
        kind: EventKind,
        direction: Direction,
        payload: Option<Vec<u8>>,
        len: PayloadLength,
        signal_strength: Option<i16>,
        timestamp: Option<u64>,
    ) -> Result<Self, SubmitError> {
        let payload = payload.map(|buf| resolve_payload(buf, len)).transpose()?;

        let data = match kind {
            EventKind::RadioReceived => EventData::Radio {
                payload: payload.unwrap_or_default(),
                signal_strength,
                timestamp: timestamp.filter(|ts| *ts != 0),
            },
            _ => EventData::Bytes(payload.filter(|p| !p.is_empty())),
        };

        Ok(Self {
            kind,
            direction,
            data,
        })
    }

    /// Incoming UI message carrying `bytes`.
    pub fn ui_message(bytes: Vec<u8>) -> Self {
        Self {
            kind: EventKind::UiMessage,
            direction: Direction::Incoming,
            data: EventData::Bytes(Some(bytes).filter(|b| !b.is_empty())),
        }
    }

    /// Outgoing UI message for the active Sender.
    pub fn outgoing(kind: EventKind, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            direction: Direction::Outgoing,
            data: EventData::Bytes(Some(bytes)),
        }
    }

    /// Payload-less status event (UI connect/disconnect, reserved kinds).
    pub fn status(kind: EventKind) -> Self {
        Self {
            kind,
            direction: Direction::Incoming,
            data: EventData::Bytes(None),
        }
    }

    /// A finished press burst.
    pub fn button(presses: u32) -> Self {
        Self {
            kind: EventKind::ButtonPressed,
            direction: Direction::Incoming,
            data: EventData::Button { presses },
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    /// Payload bytes, if this event carries any.
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.data {
            EventData::Radio { payload, .. } => Some(payload.as_slice()),
            EventData::Bytes(bytes) => bytes.as_deref(),
            EventData::Button { .. } => None,
        }
    }

    /// Radio RSSI in dBm.
    pub fn signal_strength(&self) -> Option<i16> {
        match &self.data {
            EventData::Radio {
                signal_strength, ..
            } => *signal_strength,
            _ => None,
        }
    }

    /// Receive time in epoch seconds.
    pub fn timestamp(&self) -> Option<u64> {
        match &self.data {
            EventData::Radio { timestamp, .. } => *timestamp,
            _ => None,
        }
    }

    /// Give up the payload buffer (used when handing it to a Sender).
    pub fn into_payload(self) -> Option<Vec<u8>> {
        match self.data {
            EventData::Radio { payload, .. } => Some(payload),
            EventData::Bytes(bytes) => bytes,
            EventData::Button { .. } => None,
        }
    }
}

fn resolve_payload(mut buf: Vec<u8>, len: PayloadLength) -> Result<Vec<u8>, SubmitError> {
    let n = match len {
        PayloadLength::Explicit(n) if n > buf.len() => {
            return Err(SubmitError::LengthOutOfBounds {
                declared: n,
                available: buf.len(),
            });
        }
        PayloadLength::Explicit(n) => n,
        PayloadLength::NullTerminated => buf.iter().position(|b| *b == 0).unwrap_or(buf.len()),
    };
    buf.truncate(n);
    Ok(buf)
}
