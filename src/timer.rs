//! Script wake timer.
//!
//! One software timer per script, armed with `Platform.setTimer(ms)`.
//! The scheduler never sleeps the full remaining duration: it wakes after
//! 90% of it, subtracts what actually elapsed and re-arms, so scheduling
//! jitter can delay `OnTimer` slightly but never make it fire early.
//!
//! ```text
//!            arm(0)                    arm(d > 0)
//!   ┌──────────────────┐        ┌───────────────────────┐
//!   ▼                  │        │                       ▼
//! Disarmed ◀───────────┴────────┴──────────────────── Armed
//!   ▲          check(): elapsed >= remaining             │
//!   └────────────────────── Expired ◀────────────────────┘
//!                                   check(): elapsed < remaining
//!                                   → remaining -= elapsed, re-arm
//! ```

/// Result of [`WakeTimer::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCheck {
    /// No timer armed.
    Idle,
    /// Armed, deadline not reached yet.
    Pending,
    /// Deadline reached; the timer is now disarmed.
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Disarmed,
    Armed {
        remaining_ms: u32,
        last_check_tick: u32,
        wake_delay_ticks: u32,
    },
}

/// Bounded-delay, at-most-once software timer driven by scheduler ticks.
#[derive(Debug, Clone)]
pub struct WakeTimer {
    state: TimerState,
    ms_per_tick: u32,
    cap_ticks: u32,
}

impl WakeTimer {
    /// `ms_per_tick` must be non-zero (enforced by config validation).
    pub fn new(ms_per_tick: u32) -> Self {
        let ms_per_tick = ms_per_tick.max(1);
        Self {
            state: TimerState::Disarmed,
            ms_per_tick,
            cap_ticks: 24 * 60 * 60 * 1000 / ms_per_tick,
        }
    }

    /// Arm for `duration_ms` from `now`; `0` disarms.
    pub fn arm(&mut self, duration_ms: u32, now: u32) {
        self.state = if duration_ms == 0 {
            TimerState::Disarmed
        } else {
            TimerState::Armed {
                remaining_ms: duration_ms,
                last_check_tick: now,
                wake_delay_ticks: self.wake_delay_for(duration_ms),
            }
        };
    }

    /// Force the timer off.
    pub fn disarm(&mut self) {
        self.state = TimerState::Disarmed;
    }

    /// Account for time elapsed since the last check.
    ///
    /// Returns [`TimerCheck::Expired`] at most once per [`arm`](Self::arm);
    /// the timer is already disarmed when the caller sees it.
    pub fn check(&mut self, now: u32) -> TimerCheck {
        let TimerState::Armed {
            remaining_ms,
            last_check_tick,
            ..
        } = self.state
        else {
            return TimerCheck::Idle;
        };

        let elapsed_ticks = now.wrapping_sub(last_check_tick);
        if elapsed_ticks == 0 {
            return TimerCheck::Pending;
        }

        let elapsed_ms = u64::from(elapsed_ticks) * u64::from(self.ms_per_tick);
        if elapsed_ms >= u64::from(remaining_ms) {
            self.state = TimerState::Disarmed;
            return TimerCheck::Expired;
        }

        // elapsed_ms < remaining_ms, so it fits in u32.
        self.arm(remaining_ms - elapsed_ms as u32, now);
        TimerCheck::Pending
    }

    /// Ticks the scheduler may sleep before the next check; `None` = forever.
    pub fn wake_delay(&self) -> Option<u32> {
        match self.state {
            TimerState::Disarmed => None,
            TimerState::Armed {
                wake_delay_ticks, ..
            } => Some(wake_delay_ticks),
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, TimerState::Armed { .. })
    }

    /// Milliseconds left as of the last check.
    pub fn remaining_ms(&self) -> Option<u32> {
        match self.state {
            TimerState::Disarmed => None,
            TimerState::Armed { remaining_ms, .. } => Some(remaining_ms),
        }
    }

    /// 90% of the duration in whole ticks, clamped to `1..=cap_ticks`.
    pub fn wake_delay_for(&self, duration_ms: u32) -> u32 {
        let ticks = u64::from(duration_ms / self.ms_per_tick);
        let delay = (ticks * 9 / 10) as u32;
        delay.clamp(1, self.cap_ticks)
    }

    /// Upper bound on any wake delay (24 hours of ticks).
    pub fn cap_ticks(&self) -> u32 {
        self.cap_ticks
    }
}
