//! Tick clock adapter.
//!
//! Implements [`Clock`] for the scheduler.
//!
//! - **`target_os = "espidf"`**: FreeRTOS tick counter
//!   (`xTaskGetTickCount`), one tick = `1000 / configTICK_RATE_HZ` ms.
//! - **`not(target_os = "espidf")`**: `std::time::Instant` divided into
//!   ticks of the configured length, for host tests and simulation.
//!
//! Wall-clock time comes from `SystemTime` on both; anything before
//! 2020-01-01 is treated as "not set yet" (no SNTP sync).

use std::time::{SystemTime, UNIX_EPOCH};

use crate::app::ports::Clock;

const EPOCH_2020: u64 = 1_577_836_800;

/// Monotonic scheduler tick source.
pub struct TickClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(target_os = "espidf"))]
    ms_per_tick: u32,
}

impl TickClock {
    /// `ms_per_tick` is only honoured on the host; on device the FreeRTOS
    /// tick rate is fixed at build time.
    #[cfg(not(target_os = "espidf"))]
    pub fn new(ms_per_tick: u32) -> Self {
        Self {
            start: std::time::Instant::now(),
            ms_per_tick: ms_per_tick.max(1),
        }
    }

    #[cfg(target_os = "espidf")]
    pub fn new(ms_per_tick: u32) -> Self {
        let native = 1000 / esp_idf_svc::sys::configTICK_RATE_HZ;
        if ms_per_tick != native {
            log::warn!(
                "Configured tick of {} ms ignored, FreeRTOS tick is {} ms",
                ms_per_tick,
                native
            );
        }
        Self {}
    }
}

impl Clock for TickClock {
    #[cfg(target_os = "espidf")]
    fn now_ticks(&self) -> u32 {
        unsafe { esp_idf_svc::sys::xTaskGetTickCount() }
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_ticks(&self) -> u32 {
        (self.start.elapsed().as_millis() / u128::from(self.ms_per_tick)) as u32
    }

    #[cfg(target_os = "espidf")]
    fn ms_per_tick(&self) -> u32 {
        1000 / esp_idf_svc::sys::configTICK_RATE_HZ
    }

    #[cfg(not(target_os = "espidf"))]
    fn ms_per_tick(&self) -> u32 {
        self.ms_per_tick
    }

    fn epoch_secs(&self) -> Option<u64> {
        wall_clock_secs()
    }
}

/// Current epoch seconds, `None` while the clock is unset.
pub fn wall_clock_secs() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
        .filter(|secs| *secs >= EPOCH_2020)
}
