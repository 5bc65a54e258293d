//! Application core: runtime-facing vocabulary with no I/O of its own.
//!
//! Control commands, lifecycle events and the **port traits** the
//! scheduler is generic over live here.  All interaction with hardware,
//! the filesystem and the script VM happens through [`ports`], keeping the
//! core fully testable on the host.

pub mod commands;
pub mod events;
pub mod ports;
