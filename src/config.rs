//! Runtime configuration parameters
//!
//! All tunable parameters for the FluxNode script runtime.
//! Values are read from `config.json` on the script filesystem; anything
//! missing or malformed falls back to [`RuntimeConfig::default`].

use heapless::{String, Vec};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::app::ports::ScriptStore;
use crate::error::{ConfigError, StoreError};

/// Maximum number of candidate script paths in the load rotation.
pub const MAX_LOAD_CANDIDATES: usize = 4;

/// Maximum length of a script path (SPIFFS object name limit plus mount point).
pub const MAX_PATH_LEN: usize = 64;

/// File name of the configuration blob, relative to `base_path`.
pub const CONFIG_FILE: &str = "config.json";

pub type ScriptPath = String<MAX_PATH_LEN>;

/// Core runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    // --- Timing ---
    /// Length of one scheduler tick in milliseconds
    pub ms_per_tick: u32,

    // --- Script loading ---
    /// Mount point of the script filesystem
    pub base_path: ScriptPath,
    /// Ordered load rotation: primary application first, recovery after
    pub load_candidates: Vec<ScriptPath, MAX_LOAD_CANDIDATES>,

    // --- Button ---
    /// Button GPIO, `None` when the board has no user button
    pub button_gpio: Option<i32>,
    /// Window after the first edge during which presses are collected (ms)
    pub button_window_ms: u32,
    /// Minimum spacing for two edges to count as separate presses (ms)
    pub button_press_min_ms: u32,

    // --- Radio ---
    /// LoRa modem wiring, `None` when the board has no modem
    pub lora: Option<LoraPins>,

    // --- Network ---
    /// UDP port for injected events, `None` disables the service
    pub udp_event_port: Option<u16>,
}

/// GPIO wiring of an SX127x-family LoRa modem on SPI2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoraPins {
    pub sck: i32,
    pub mosi: i32,
    pub miso: i32,
    pub cs: i32,
    /// RX-done interrupt line
    pub dio0: i32,
    /// FHSS change-channel interrupt line, if wired
    pub dio1: Option<i32>,
    /// Receive carrier frequency
    #[serde(default = "default_lora_frequency")]
    pub frequency_hz: u32,
}

fn default_lora_frequency() -> u32 {
    868_100_000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let mut load_candidates = Vec::new();
        for name in ["/spiffs/main.js", "/spiffs/recovery.js"] {
            let mut path = String::new();
            let _ = path.push_str(name);
            let _ = load_candidates.push(path);
        }
        let mut base_path = String::new();
        let _ = base_path.push_str("/spiffs");

        Self {
            // Timing
            ms_per_tick: 10, // 100 Hz FreeRTOS tick

            // Script loading
            base_path,
            load_candidates,

            // Button
            button_gpio: None,
            button_window_ms: 3000,
            button_press_min_ms: 300,

            // Radio
            lora: None,

            // Network
            udp_event_port: Some(5000),
        }
    }
}

impl RuntimeConfig {
    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ms_per_tick == 0 {
            return Err(ConfigError::ValidationFailed("ms_per_tick must be > 0"));
        }
        if self.load_candidates.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "load_candidates must name at least one script",
            ));
        }
        if self.load_candidates.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "load_candidates must not contain empty paths",
            ));
        }
        if self
            .load_candidates
            .iter()
            .any(|p| !p.starts_with(self.base_path.as_str()))
        {
            return Err(ConfigError::ValidationFailed(
                "load_candidates must live under base_path",
            ));
        }
        if self.button_press_min_ms >= self.button_window_ms {
            return Err(ConfigError::ValidationFailed(
                "button_press_min_ms must be shorter than button_window_ms",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON config blob.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_slice(bytes).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read `config.json` from the script store.
    pub fn load(store: &impl ScriptStore, base_path: &str) -> Result<Self, ConfigError> {
        let mut path = std::string::String::from(base_path);
        path.push('/');
        path.push_str(CONFIG_FILE);
        match store.read(&path) {
            Ok(text) => Self::from_json(text.as_bytes()),
            Err(StoreError::NotFound) => Err(ConfigError::NotFound),
            Err(_) => Err(ConfigError::Corrupted),
        }
    }

    /// [`load`](Self::load), falling back to defaults with a warning.
    pub fn load_or_default(store: &impl ScriptStore, base_path: &str) -> Self {
        match Self::load(store, base_path) {
            Ok(cfg) => cfg,
            Err(ConfigError::NotFound) => Self::default(),
            Err(e) => {
                warn!("config.json rejected ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Length of 24 hours expressed in scheduler ticks.
    pub fn max_wake_ticks(&self) -> u32 {
        24 * 60 * 60 * 1000 / self.ms_per_tick.max(1)
    }
}
