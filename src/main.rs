//! FluxNode Firmware — Main Entry Point
//!
//! Scriptable LoRa/BLE node: every producer feeds one scheduler task that
//! owns the script engine.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  FsScriptStore   TickClock   TaskNotify   ChipSystem           │
//! │  (ScriptStore)   (Clock)     (Notify)     (SystemPort)         │
//! │  WsTransport     BleUiAdapter   JsonEngineFactory  UDP events  │
//! │  (UiTransport)   (UiTransport)  (EngineFactory)                │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │   Scheduler · WorkQueue · WakeTimer · LoadRecovery     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  radio-rx task (SX127x) · button task · GPIO ISR trampolines   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::prelude::*;
use esp_idf_hal::spi::{SpiDeviceDriver, SpiDriverConfig};
use log::{error, info, warn};

use fluxnode::adapters::ble::BleUiAdapter;
use fluxnode::adapters::fs_store::{FsScriptStore, mount_spiffs};
use fluxnode::adapters::log_sink::LogEventSink;
use fluxnode::adapters::notify::TaskNotify;
use fluxnode::adapters::script_engine::{JsonEngineFactory, SharedConnectivity};
use fluxnode::adapters::system::ChipSystem;
use fluxnode::adapters::time::{TickClock, wall_clock_secs};
use fluxnode::adapters::ui::Connectivity;
use fluxnode::adapters::udp;
use fluxnode::adapters::ws::{WS_PORT, WsTransport};
use fluxnode::app::ports::{ConnectivityControl, ConnectivityMode, SystemPort};
use fluxnode::config::{LoraPins, RuntimeConfig};
use fluxnode::drivers::button::{ButtonTask, PressCounter};
use fluxnode::drivers::hw_init::{IrqSource, attach_gpio_irq};
use fluxnode::drivers::radio::RadioTask;
use fluxnode::drivers::sx127x::Sx127x;
use fluxnode::drivers::task_pin::{BUTTON_TASK, RADIO_TASK, SCHEDULER_TASK, spawn_task};
use fluxnode::irq::IrqChannel;
use fluxnode::runtime::RuntimeHandle;
use fluxnode::scheduler::Scheduler;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  FluxNode v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Script filesystem + config ─────────────────────────
    let defaults = RuntimeConfig::default();
    if let Err(e) = mount_spiffs(defaults.base_path.as_str()) {
        // Load attempts will fail and the scheduler ends up awaiting a
        // command; the UI links still come up.
        error!("Script filesystem unavailable: {}", e);
    }
    let store = FsScriptStore::new();
    let config = RuntimeConfig::load_or_default(&store, defaults.base_path.as_str());
    info!("Config: {:?}", config);

    let peripherals = Peripherals::take().context("peripherals already taken")?;

    // ── 3. Runtime core ───────────────────────────────────────
    let runtime = RuntimeHandle::new(Arc::new(TaskNotify::new()));
    let system: Arc<dyn SystemPort> = Arc::new(ChipSystem);

    // ── 4. UI links ───────────────────────────────────────────
    let connectivity: SharedConnectivity = Arc::new(Mutex::new(Connectivity::new(
        runtime.clone(),
        WsTransport::new(runtime.clone(), Arc::clone(&system), WS_PORT),
        BleUiAdapter::new(runtime.clone(), "FluxNode"),
    )));
    // The control endpoint lives on the HTTP server; keep it reachable even
    // when no script loads.  Scripts may switch transports later.
    match connectivity.lock() {
        Ok(mut c) => {
            if let Err(e) = c.set_mode(ConnectivityMode::Wifi) {
                warn!("Boot connectivity unavailable: {}", e);
            }
        }
        Err(_) => error!("Connectivity lock poisoned at boot"),
    }
    let factory = JsonEngineFactory::new(system).with_connectivity(connectivity);

    // ── 5. Button ─────────────────────────────────────────────
    if let Some(pin) = config.button_gpio {
        let channel = Arc::new(IrqChannel::new(Arc::new(TaskNotify::new())));
        attach_gpio_irq(pin, IrqSource::Button, Arc::clone(&channel))?;
        let task = ButtonTask::new(
            channel,
            PressCounter::from_config(&config),
            runtime.clone(),
            TickClock::new(config.ms_per_tick),
        );
        spawn_task(BUTTON_TASK, move || task.run())?;
    }

    // ── 6. LoRa radio ─────────────────────────────────────────
    match config.lora {
        Some(pins) => {
            if let Err(e) = start_radio(peripherals.spi2, pins, &runtime, config.ms_per_tick) {
                warn!("LoRa radio disabled: {:#}", e);
            }
        }
        None => info!("No LoRa modem configured"),
    }

    // ── 7. UDP event injection ────────────────────────────────
    if let Some(port) = config.udp_event_port {
        // Without a network interface the socket still binds; datagrams
        // simply never arrive.
        if let Err(e) = udp::spawn(port, runtime.clone(), wall_clock_secs) {
            warn!("UDP event service not started: {}", e);
        }
    }

    // ── 8. Scheduler ──────────────────────────────────────────
    let mut scheduler = Scheduler::new(
        &config,
        runtime,
        factory,
        store,
        TickClock::new(config.ms_per_tick),
    );
    info!("System ready. Starting scheduler.");
    let handle = spawn_task(SCHEDULER_TASK, move || {
        let mut sink = LogEventSink::new();
        scheduler.run(&mut sink)
    })?;

    // The scheduler never returns; joining keeps main's stack parked.
    let _ = handle.join();
    Ok(())
}

/// Bring up the SX127x on SPI2 and spawn its receive task.
fn start_radio(
    spi2: esp_idf_hal::spi::SPI2,
    pins: LoraPins,
    runtime: &RuntimeHandle,
    ms_per_tick: u32,
) -> Result<()> {
    let spi_config = esp_idf_hal::spi::config::Config::new()
        .baudrate(8.MHz().into())
        .data_mode(embedded_hal::spi::MODE_0);

    // SAFETY: the pin numbers come from the board config and are not
    // claimed by any other driver in this firmware.
    let (sck, mosi, miso, cs) = unsafe {
        (
            AnyIOPin::new(pins.sck),
            AnyIOPin::new(pins.mosi),
            AnyIOPin::new(pins.miso),
            AnyIOPin::new(pins.cs),
        )
    };
    let spi = SpiDeviceDriver::new_single(
        spi2,
        sck,
        mosi,
        Some(miso),
        Some(cs),
        &SpiDriverConfig::default(),
        &spi_config,
    )?;

    let mut radio = Sx127x::new(spi);
    radio
        .init(pins.frequency_hz)
        .map_err(|e| anyhow::anyhow!("SX127x init: {}", e))?;

    let channel = Arc::new(IrqChannel::new(Arc::new(TaskNotify::new())));
    attach_gpio_irq(pins.dio0, IrqSource::RadioRxDone, Arc::clone(&channel))?;
    if let Some(dio1) = pins.dio1 {
        attach_gpio_irq(dio1, IrqSource::RadioHop, Arc::clone(&channel))?;
    }

    let task = RadioTask::new(radio, channel, runtime.clone(), TickClock::new(ms_per_tick));
    spawn_task(RADIO_TASK, move || task.run())?;
    info!("LoRa radio receiving at {} Hz", pins.frequency_hz);
    Ok(())
}
