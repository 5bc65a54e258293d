//! Button press-burst counter.
//!
//! ## Hardware
//!
//! Active-high momentary switch; the GPIO ISR fires on the rising edge and
//! posts a [`IrqToken::ButtonEdge`] stamped with the tick it fired on.
//! Everything below runs in the button task.
//!
//! ## Counting
//!
//! ```text
//!   edge  edge edge            edge
//!    │     │   │                │
//!    ├─────┴───┴── window ──────┼──▶ count presses, submit ButtonPressed
//!    first edge                 (ignored: after the window it starts a new burst)
//! ```
//!
//! The first press always counts.  A later edge counts when it is more
//! than `press_min` after the last counted one; closer edges are bounce.
//! At most [`MAX_PRESSES`] edges are recorded per burst.

use std::sync::Arc;

use log::{debug, warn};

use crate::app::ports::Clock;
use crate::config::RuntimeConfig;
use crate::events::Event;
use crate::irq::{IrqChannel, IrqToken};
use crate::runtime::RuntimeHandle;

/// Edges recorded per burst.
pub const MAX_PRESSES: usize = 10;

/// Collects edge ticks for one burst and counts them once the window closes.
#[derive(Debug, Clone)]
pub struct PressCounter {
    edges: heapless::Vec<u32, MAX_PRESSES>,
    window_ticks: u32,
    min_gap_ticks: u32,
}

impl PressCounter {
    pub fn new(window_ms: u32, press_min_ms: u32, ms_per_tick: u32) -> Self {
        let ms_per_tick = ms_per_tick.max(1);
        Self {
            edges: heapless::Vec::new(),
            window_ticks: (window_ms / ms_per_tick).max(1),
            min_gap_ticks: press_min_ms / ms_per_tick,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            config.button_window_ms,
            config.button_press_min_ms,
            config.ms_per_tick,
        )
    }

    /// Record an edge.  Edges past the burst capacity are dropped.
    pub fn record(&mut self, tick: u32) {
        if self.edges.push(tick).is_err() {
            debug!("button: burst full, edge at {} ignored", tick);
        }
    }

    pub fn in_burst(&self) -> bool {
        !self.edges.is_empty()
    }

    /// Ticks until the window closes, `None` when no burst is open.
    pub fn remaining(&self, now: u32) -> Option<u32> {
        let first = *self.edges.first()?;
        Some(self.window_ticks.saturating_sub(now.wrapping_sub(first)))
    }

    /// Finish the burst if its window has closed.  Returns the press count.
    pub fn poll(&mut self, now: u32) -> Option<u32> {
        if self.remaining(now)? > 0 {
            return None;
        }
        let count = self.count();
        self.edges.clear();
        Some(count)
    }

    fn count(&self) -> u32 {
        let mut edges = self.edges.iter();
        let Some(mut last) = edges.next().copied() else {
            return 0;
        };
        let mut count = 1;
        for &tick in edges {
            if tick.wrapping_sub(last) > self.min_gap_ticks {
                count += 1;
                last = tick;
            }
        }
        count
    }
}

/// Producer task: turns button edge tokens into ButtonPressed events.
pub struct ButtonTask<C: Clock> {
    channel: Arc<IrqChannel>,
    counter: PressCounter,
    runtime: RuntimeHandle,
    clock: C,
}

impl<C: Clock> ButtonTask<C> {
    pub fn new(
        channel: Arc<IrqChannel>,
        counter: PressCounter,
        runtime: RuntimeHandle,
        clock: C,
    ) -> Self {
        Self {
            channel,
            counter,
            runtime,
            clock,
        }
    }

    pub fn run(mut self) -> ! {
        loop {
            self.step();
        }
    }

    /// Wait for one edge or the window deadline.  Returns the count of a
    /// burst that finished during this step.
    pub fn step(&mut self) -> Option<u32> {
        let timeout = self.counter.remaining(self.clock.now_ticks());
        match self.channel.recv(timeout) {
            Some(IrqToken::ButtonEdge { tick }) => {
                // A stale edge that lands after the window starts the next burst.
                if let Some(n) = self.counter.poll(tick) {
                    self.submit(n);
                }
                self.counter.record(tick);
            }
            Some(other) => warn!("button: unexpected token {:?}", other),
            None => {}
        }
        let overflows = self.channel.take_overflows();
        if overflows > 0 {
            warn!("button: {} edge(s) lost, IRQ ring full", overflows);
        }
        let n = self.counter.poll(self.clock.now_ticks())?;
        self.submit(n);
        Some(n)
    }

    fn submit(&self, presses: u32) {
        debug!("button: {} press(es)", presses);
        self.runtime.submit(Event::button(presses));
    }
}
