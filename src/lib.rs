//! FluxNode firmware library.
//!
//! Exposes the runtime core and its adapters for integration testing and
//! simulation.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod irq;
pub mod loader;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod timer;

pub mod adapters;
pub mod drivers;

#[cfg(any(test, target_os = "espidf"))]
mod esp_link_shims;
