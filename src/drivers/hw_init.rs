//! GPIO interrupt wiring.
//!
//! Every interrupt line the runtime uses ends in the same place: an
//! [`IrqChannel`] owned by the producer task for that peripheral.
//!
//! ```text
//!   DIO0 (rising)   ──▶ gpio_irq_trampoline ──▶ RadioReadPacket ──▶ radio channel
//!   DIO1 (rising)   ──▶ gpio_irq_trampoline ──▶ RadioHop        ──▶ radio channel
//!   button (fall)   ──▶ gpio_irq_trampoline ──▶ ButtonEdge{tick} ─▶ button channel
//! ```

use std::sync::Arc;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use crate::irq::{IrqChannel, IrqToken};

// ── Error type ────────────────────────────────────────────────

/// Errors while wiring a GPIO interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
    HandlerAddFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::HandlerAddFailed(rc) => write!(f, "GPIO ISR handler add failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwInitError {}

/// What an interrupt line means to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqSource {
    RadioRxDone,
    RadioHop,
    Button,
}

impl IrqSource {
    /// Token posted for an edge seen at `tick`.
    pub fn token(self, tick: u32) -> IrqToken {
        match self {
            Self::RadioRxDone => IrqToken::RadioReadPacket,
            Self::RadioHop => IrqToken::RadioHop,
            Self::Button => IrqToken::ButtonEdge { tick },
        }
    }
}

/// Context handed to the trampoline.  Leaked: handlers stay for the
/// lifetime of the firmware.
#[cfg(target_os = "espidf")]
struct IsrBinding {
    channel: Arc<IrqChannel>,
    source: IrqSource,
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gpio_irq_trampoline(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` is the leaked `IsrBinding` registered in
    // `attach_gpio_irq`; it is never freed.
    let binding = unsafe { &*(arg as *const IsrBinding) };
    // SAFETY: tick read, ISR variant.
    let tick = unsafe { xTaskGetTickCountFromISR() };
    // A full ring is counted inside the channel.
    let _ = binding.channel.post_from_isr(binding.source.token(tick));
}

/// Configure `pin` as an interrupt input and route its edges to `channel`.
#[cfg(target_os = "espidf")]
pub fn attach_gpio_irq(
    pin: i32,
    source: IrqSource,
    channel: Arc<IrqChannel>,
) -> Result<(), HwInitError> {
    // Every line is active-high: DIO0/DIO1 pulse high and the button
    // drives its input high while pressed.  Bias comes from the board.
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pin,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_POSEDGE,
    };
    // SAFETY: plain register configuration of an input pin.
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }

    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed.
    let ret = unsafe { gpio_install_isr_service(0) };
    if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
        return Err(HwInitError::IsrInstallFailed(ret));
    }

    let binding = Box::into_raw(Box::new(IsrBinding { channel, source }));
    // SAFETY: `binding` stays valid forever; the trampoline only performs
    // lock-free ring operations and a task notification.
    let ret = unsafe { gpio_isr_handler_add(pin, Some(gpio_irq_trampoline), binding.cast()) };
    if ret != ESP_OK as i32 {
        // SAFETY: registration failed, so the ISR never saw the pointer.
        drop(unsafe { Box::from_raw(binding) });
        return Err(HwInitError::HandlerAddFailed(ret));
    }
    log::info!("hw_init: GPIO{} -> {:?}", pin, source);
    Ok(())
}

/// Simulation: edges are injected with [`simulate_edge`].
#[cfg(not(target_os = "espidf"))]
pub fn attach_gpio_irq(
    pin: i32,
    source: IrqSource,
    channel: Arc<IrqChannel>,
) -> Result<(), HwInitError> {
    drop(channel);
    log::info!("hw_init(sim): GPIO{} -> {:?}", pin, source);
    Ok(())
}

/// Post the token a real edge on `source` would, as the trampoline does.
pub fn simulate_edge(channel: &IrqChannel, source: IrqSource, tick: u32) {
    let _ = channel.post_from_isr(source.token(tick));
}
