//! Event → script object conversion.
//!
//! The core hands engines a typed [`Event`]; this is the one place that
//! knows what the script-side event object looks like:
//!
//! | Property    | Type    | Present when                          |
//! |-------------|---------|---------------------------------------|
//! | `EventType` | uint    | always (see [`EventKind::code`])      |
//! | `EventData` | buffer  | the event carries a non-empty payload |
//! | `LoRaRSSI`  | int     | radio packets                         |
//! | `TimeStamp` | uint    | radio packets with a known time       |
//! | `NumPress`  | uint    | button events                         |
//!
//! [`EventKind::code`]: crate::events::EventKind::code

use crate::events::{Event, EventData};

/// A single property value on the script event object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue<'a> {
    Uint(u64),
    Int(i64),
    Buffer(&'a [u8]),
}

/// Flatten `event` into `(name, value)` pairs in a stable order.
pub fn event_properties(event: &Event) -> Vec<(&'static str, PropertyValue<'_>)> {
    let mut props = Vec::with_capacity(3);
    props.push((
        "EventType",
        PropertyValue::Uint(u64::from(event.kind().code())),
    ));

    match event.data() {
        EventData::Radio {
            payload,
            signal_strength,
            timestamp,
        } => {
            if !payload.is_empty() {
                props.push(("EventData", PropertyValue::Buffer(payload)));
            }
            if let Some(rssi) = signal_strength {
                props.push(("LoRaRSSI", PropertyValue::Int(i64::from(*rssi))));
            }
            if let Some(ts) = timestamp {
                props.push(("TimeStamp", PropertyValue::Uint(*ts)));
            }
        }
        EventData::Button { presses } => {
            props.push(("NumPress", PropertyValue::Uint(u64::from(*presses))));
        }
        EventData::Bytes(Some(bytes)) if !bytes.is_empty() => {
            props.push(("EventData", PropertyValue::Buffer(bytes)));
        }
        EventData::Bytes(_) => {}
    }
    props
}
