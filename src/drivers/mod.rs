//! Interrupt producers, the LoRa modem and task placement.

pub mod button;
pub mod hw_init;
pub mod radio;
pub mod sx127x;
pub mod task_pin;
