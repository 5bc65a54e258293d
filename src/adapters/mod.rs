//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements         | Connects to                   |
//! |-----------------|--------------------|-------------------------------|
//! | `ble`           | UiTransport        | Bluedroid GATT server         |
//! | `fs_store`      | ScriptStore        | SPIFFS via VFS / host fs      |
//! | `log_sink`      | EventSink          | Serial log output             |
//! | `notify`        | Notify             | FreeRTOS task notify / Condvar|
//! | `record`        | —                  | BLE record framing            |
//! | `script_engine` | ScriptEngine       | JSON action scripts           |
//! |                 | EngineFactory      |                               |
//! | `script_object` | —                  | Event → script properties     |
//! | `sender`        | Sender             | BLE indications / send lane   |
//! | `system`        | SystemPort         | esp_restart                   |
//! | `time`          | Clock              | FreeRTOS ticks, wall clock    |
//! | `udp`           | —                  | UDP event injection           |
//! | `ui`            | ConnectivityControl| UI transports, inbound events |
//! | `ws`            | UiTransport        | ESP-IDF httpd WebSocket       |

pub mod ble;
pub mod fs_store;
pub mod log_sink;
pub mod notify;
pub mod record;
pub mod script_engine;
pub mod script_object;
pub mod sender;
pub mod system;
pub mod time;
pub mod udp;
pub mod ui;
#[cfg(target_os = "espidf")]
pub mod ws;
