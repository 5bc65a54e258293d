//! Inbound commands from the management surface.
//!
//! These represent actions requested by the outside world (HTTP control
//! endpoint, UDP, a script calling `Platform.reset()`) that
//! [`RuntimeHandle::handle_command`](crate::runtime::RuntimeHandle::handle_command)
//! maps onto runtime state.

/// Commands that external adapters can send into the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Tear down the running script and reload.
    RequestReset,

    /// Load this path on the next reset, once.  Empty clears the override.
    SetPinnedLoadPath(String),

    /// Restart the chip.
    RequestReboot,
}

impl ControlCommand {
    /// Decode a control endpoint request (`/control?cmd=<name>&arg=<arg>`).
    pub fn from_request(name: &str, arg: Option<&str>) -> Option<Self> {
        match name {
            "reset" => Some(Self::RequestReset),
            "setload" => arg.map(|path| Self::SetPinnedLoadPath(path.to_owned())),
            "reboot" => Some(Self::RequestReboot),
            _ => None,
        }
    }

    /// Decode the query part of a control URI (`cmd=setload&arg=/spiffs/x.js`).
    pub fn from_query(query: &str) -> Option<Self> {
        let mut name = None;
        let mut arg = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("cmd", v)) => name = Some(v),
                Some(("arg", v)) => arg = Some(v),
                _ => {}
            }
        }
        Self::from_request(name?, arg)
    }
}
