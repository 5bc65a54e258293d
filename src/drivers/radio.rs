//! LoRa receive task.
//!
//! The DIO interrupts only post [`IrqToken`]s; this task owns the modem
//! and does the SPI work, allocation and queueing:
//!
//! | Token             | Action                                                   |
//! |-------------------|----------------------------------------------------------|
//! | `RadioHop`        | hand to the hop handler, nothing queued                  |
//! | `RadioReadPacket` | read ≤ 256 B + RSSI, re-arm RX, queue `RadioReceived`    |
//! | `RadioStop`       | end the task                                             |

use core::ops::ControlFlow;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::app::ports::{Clock, RadioPort};
use crate::events::{Direction, EventKind, PayloadLength};
use crate::irq::{IrqChannel, IrqToken};
use crate::runtime::RuntimeHandle;

/// Largest packet the modem FIFO can hold.
pub const MAX_PACKET_LEN: usize = 256;

pub struct RadioTask<R: RadioPort, C: Clock> {
    radio: R,
    channel: Arc<IrqChannel>,
    runtime: RuntimeHandle,
    clock: C,
}

impl<R: RadioPort, C: Clock> RadioTask<R, C> {
    pub fn new(radio: R, channel: Arc<IrqChannel>, runtime: RuntimeHandle, clock: C) -> Self {
        Self {
            radio,
            channel,
            runtime,
            clock,
        }
    }

    /// Process tokens until a `RadioStop` arrives.
    pub fn run(mut self) {
        while self.step().is_continue() {}
        info!("radio: task stopped");
    }

    /// Block for one token and handle it.
    pub fn step(&mut self) -> ControlFlow<()> {
        let Some(token) = self.channel.recv(None) else {
            return ControlFlow::Continue(());
        };
        let flow = self.handle(token);
        let overflows = self.channel.take_overflows();
        if overflows > 0 {
            warn!("radio: {} IRQ token(s) lost, ring full", overflows);
        }
        flow
    }

    fn handle(&mut self, token: IrqToken) -> ControlFlow<()> {
        match token {
            IrqToken::RadioStop => return ControlFlow::Break(()),
            IrqToken::RadioHop => {
                if !self.radio.handle_hop() {
                    debug!("radio: hop token without hop IRQ");
                }
            }
            IrqToken::RadioReadPacket => {
                // DIO0 can also carry the hop IRQ on some boards.
                if !self.radio.handle_hop() {
                    self.read_packet();
                }
            }
            IrqToken::ButtonEdge { .. } => warn!("radio: unexpected token {:?}", token),
        }
        ControlFlow::Continue(())
    }

    fn read_packet(&mut self) {
        let mut buf = Vec::new();
        if buf.try_reserve_exact(MAX_PACKET_LEN).is_err() {
            warn!("radio: no memory for packet buffer, packet dropped");
            self.radio.rearm_receive();
            return;
        }
        buf.resize(MAX_PACKET_LEN, 0);

        let n = match self.radio.receive_packet(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn!("radio: receive failed: {}", e);
                self.radio.rearm_receive();
                return;
            }
        };
        let rssi = self.radio.packet_rssi();
        self.radio.rearm_receive();
        if n == 0 {
            return;
        }

        debug!("radio: {} bytes, rssi {} dBm", n, rssi);
        let _ = self.runtime.submit_event(
            EventKind::RadioReceived,
            Direction::Incoming,
            Some(buf),
            PayloadLength::Explicit(n),
            Some(rssi),
            self.clock.epoch_secs(),
        );
    }
}
