//! Unified error types for the FluxNode firmware.
//!
//! Every subsystem has its own small error enum; all of them convert into
//! the top-level [`Error`] so the binary's startup path can funnel them
//! through one type.  None of these ever escape the scheduler loop: load
//! and dispatch failures are logged and absorbed where they happen.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The script engine rejected a load or an entrypoint call.
    Script(ScriptError),
    /// A script file could not be read.
    Store(StoreError),
    /// An outgoing UI message could not be delivered.
    Send(SendError),
    /// An event could not be handed to the scheduler.
    Submit(SubmitError),
    /// The LoRa radio failed a transaction.
    Radio(RadioError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script(e) => write!(f, "script: {e}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Send(e) => write!(f, "send: {e}"),
            Self::Submit(e) => write!(f, "submit: {e}"),
            Self::Radio(e) => write!(f, "radio: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Script engine errors
// ---------------------------------------------------------------------------

/// Errors reported by a [`ScriptEngine`](crate::app::ports::ScriptEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// Engine instance could not be created (usually out of heap).
    CreateFailed,
    /// Top-level code failed to parse or threw during evaluation.
    Eval(String),
    /// The named entrypoint is not defined by the loaded script.
    MissingEntrypoint(&'static str),
    /// The entrypoint threw an uncaught error.
    Uncaught(String),
    /// A native capability module could not be registered.
    Capability(&'static str),
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateFailed => write!(f, "engine creation failed"),
            Self::Eval(msg) => write!(f, "eval failed: {msg}"),
            Self::MissingEntrypoint(name) => write!(f, "missing entrypoint {name}()"),
            Self::Uncaught(msg) => write!(f, "uncaught error: {msg}"),
            Self::Capability(name) => write!(f, "capability {name} not registered"),
        }
    }
}

impl From<ScriptError> for Error {
    fn from(e: ScriptError) -> Self {
        Self::Script(e)
    }
}

// ---------------------------------------------------------------------------
// Script store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// No file at the requested path.
    NotFound,
    /// The file exists but is not valid UTF-8 script source.
    InvalidEncoding,
    /// Generic filesystem error.
    IoError,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::InvalidEncoding => write!(f, "file is not valid UTF-8"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Sender errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// No UI client is connected on the active transport.
    NotConnected,
    /// The message exceeds what the transport can frame.
    TooLarge,
    /// The transport reported a write failure.
    TransportFailed,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "no UI client connected"),
            Self::TooLarge => write!(f, "message too large"),
            Self::TransportFailed => write!(f, "transport write failed"),
        }
    }
}

impl From<SendError> for Error {
    fn from(e: SendError) -> Self {
        Self::Send(e)
    }
}

// ---------------------------------------------------------------------------
// Submit errors (producer side)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// An explicit payload length exceeds the buffer it describes.
    LengthOutOfBounds { declared: usize, available: usize },
    /// The payload buffer could not be allocated.
    OutOfMemory,
    /// The ISR token ring is full; the token was dropped.
    IrqRingFull,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthOutOfBounds {
                declared,
                available,
            } => write!(
                f,
                "declared length {declared} exceeds buffer of {available} bytes"
            ),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::IrqRingFull => write!(f, "IRQ token ring full"),
        }
    }
}

impl From<SubmitError> for Error {
    fn from(e: SubmitError) -> Self {
        Self::Submit(e)
    }
}

// ---------------------------------------------------------------------------
// Radio errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// SPI transaction with the modem failed.
    Spi,
    /// The received packet failed its CRC check.
    Crc,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi => write!(f, "SPI transaction failed"),
            Self::Crc => write!(f, "packet CRC error"),
        }
    }
}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config file found (first boot).
    NotFound,
    /// Stored config failed to deserialise.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
