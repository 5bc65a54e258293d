//! System control adapter implementing [`SystemPort`].

use log::warn;

use crate::app::ports::SystemPort;

/// Chip-level controls.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChipSystem;

impl SystemPort for ChipSystem {
    #[cfg(target_os = "espidf")]
    fn restart(&self) {
        warn!("Rebooting");
        // SAFETY: plain FFI call; does not return.
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&self) {
        warn!("Reboot requested (ignored in simulation)");
    }
}
