//! UDP event injection.
//!
//! Each datagram becomes one Incoming event:
//!
//! ```text
//!  byte 0      : 'A' + EventType   ('A' = RadioReceived, 'B' = UiMessage, ...)
//!  bytes 1..   : payload
//! ```
//!
//! A ButtonPressed datagram (`'E'`) carries no payload into the event; the
//! number of bytes after the tag becomes the press count (`"E..."` is three
//! presses).
//!
//! Used on the bench to feed LoRa packets, UI messages or button bursts
//! without the matching hardware.

use std::io;
use std::net::UdpSocket;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::events::{Direction, Event, EventKind, PayloadLength};
use crate::runtime::RuntimeHandle;

/// Receive buffer size; longer datagrams are truncated by the socket.
pub const DATAGRAM_BUF_LEN: usize = 2048;

/// Decode one datagram.  `None` for runts and unknown kinds.
pub fn datagram_to_event(buf: &[u8], epoch_secs: Option<u64>) -> Option<Event> {
    let [tag, payload @ ..] = buf else {
        return None;
    };
    if payload.is_empty() {
        debug!("UDP runt ({} bytes) dropped", buf.len());
        return None;
    }
    let Some(kind) = tag.checked_sub(b'A').and_then(EventKind::from_code) else {
        warn!("UDP datagram with unknown kind tag 0x{:02x} dropped", tag);
        return None;
    };
    if kind == EventKind::ButtonPressed {
        return Some(Event::button(payload.len() as u32));
    }
    Event::new(
        kind,
        Direction::Incoming,
        Some(payload.to_vec()),
        PayloadLength::Explicit(payload.len()),
        None,
        epoch_secs,
    )
    .ok()
}

/// Blocking receive loop on `socket`.  Returns only on a socket error.
pub fn serve(socket: &UdpSocket, runtime: &RuntimeHandle, epoch: fn() -> Option<u64>) -> io::Error {
    let mut buf = vec![0u8; DATAGRAM_BUF_LEN];
    loop {
        let (n, peer) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) => return e,
        };
        match datagram_to_event(&buf[..n], epoch()) {
            Some(event) => {
                debug!("UDP {:?} event ({} bytes) from {}", event.kind(), n - 1, peer);
                runtime.submit(event);
            }
            None => debug!("UDP datagram from {} ignored", peer),
        }
    }
}

/// Bind `0.0.0.0:port` and run [`serve`] on its own thread.
pub fn spawn(port: u16, runtime: RuntimeHandle, epoch: fn() -> Option<u64>) -> io::Result<JoinHandle<()>> {
    let socket = UdpSocket::bind(("0.0.0.0", port))?;
    info!("UDP event service listening on port {}", port);
    thread::Builder::new()
        .name("udp-events".into())
        .stack_size(6 * 1024)
        .spawn(move || {
            let e = serve(&socket, &runtime, epoch);
            error!("UDP event service stopped: {}", e);
        })
}
