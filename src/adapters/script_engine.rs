//! Declarative JSON script engine.
//!
//! A script is a JSON document naming the entrypoints it implements.  Each
//! entrypoint is a list of actions executed in order:
//!
//! ```json
//! {
//!   "main":    [ { "print": "booting" } ],
//!   "OnStart": [ { "setConnectivity": 2 }, { "setTimer": 5000 } ],
//!   "OnEvent": [
//!     { "when": 0, "do": [ { "print": "rx rssi={LoRaRSSI}" }, "echo" ] },
//!     { "do": [ { "print": "event {EventType}" } ] }
//!   ],
//!   "OnTimer": [ { "sendEvent": "tick" }, { "setTimer": 5000 } ]
//! }
//! ```
//!
//! `main` runs while the script loads.  `OnStart` is mandatory; a script
//! without it fails to load and the rotation moves on.  An action runs only
//! if one of the engine's registered modules lists it:
//!
//! | Action            | Module   | Effect                                     |
//! |-------------------|----------|--------------------------------------------|
//! | `print`           | Util     | log line, `{Property}` from the event      |
//! | `setTimer`        | Platform | (re)arm the script timer, `0` disarms      |
//! | `sendEvent`       | Platform | queue an Outgoing UI message, `{Property}` |
//! | `echo`            | Platform | send the event's payload back to the UI    |
//! | `reset`           | Platform | request a reset cycle                      |
//! | `reboot`          | Platform | restart the chip                           |
//! | `setLoadFileName` | Platform | pin the next load, `""` clears             |
//! | `setConnectivity` | Platform | 0 off, 1 WiFi/WebSocket, 2 BLE             |
//! | `throw`           | Util     | fail the current call                      |

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use serde::Deserialize;

use super::script_object::{PropertyValue, event_properties};
use crate::app::ports::{
    CapabilityModule, ConnectivityControl, ConnectivityMode, EngineFactory, Entrypoint,
    ScriptArgs, ScriptEngine, SystemPort, native_owner,
};
use crate::error::ScriptError;
use crate::events::{Event, EventKind};
use crate::runtime::RuntimeHandle;

/// Shared connectivity switch handed to every engine.
pub type SharedConnectivity = Arc<Mutex<dyn ConnectivityControl>>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Script {
    #[serde(default)]
    main: Vec<Action>,
    #[serde(rename = "OnStart")]
    on_start: Option<Vec<Action>>,
    #[serde(rename = "OnEvent")]
    on_event: Option<Vec<EventRule>>,
    #[serde(rename = "OnTimer")]
    on_timer: Option<Vec<Action>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventRule {
    /// Only match this `EventType`; every event when absent.
    #[serde(default)]
    when: Option<u8>,
    #[serde(rename = "do")]
    actions: Vec<Action>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Action {
    Print(String),
    SetTimer(u32),
    SendEvent(String),
    Echo,
    Reset,
    Reboot,
    SetLoadFileName(String),
    SetConnectivity(u8),
    Throw(String),
}

impl Action {
    /// Function name as listed in a [`CapabilityModule`].
    fn function(&self) -> &'static str {
        match self {
            Self::Print(_) => "print",
            Self::SetTimer(_) => "setTimer",
            Self::SendEvent(_) => "sendEvent",
            Self::Echo => "echo",
            Self::Reset => "reset",
            Self::Reboot => "reboot",
            Self::SetLoadFileName(_) => "setLoadFileName",
            Self::SetConnectivity(_) => "setConnectivity",
            Self::Throw(_) => "throw",
        }
    }
}

/// Engine instance; one per reset cycle.
pub struct JsonScriptEngine {
    runtime: RuntimeHandle,
    system: Arc<dyn SystemPort>,
    connectivity: Option<SharedConnectivity>,
    modules: Vec<CapabilityModule>,
    script: Option<Script>,
}

impl JsonScriptEngine {
    fn run(&self, actions: &[Action], event: Option<&Event>) -> Result<(), ScriptError> {
        for action in actions {
            self.resolve(action.function())?;
            self.apply(action, event)?;
        }
        Ok(())
    }

    /// Fail unless a registered module lists `function`.
    fn resolve(&self, function: &'static str) -> Result<(), ScriptError> {
        if self.modules.iter().any(|m| m.provides(function)) {
            return Ok(());
        }
        let owner = native_owner(function).map_or(function, |m| m.name);
        Err(ScriptError::Capability(owner))
    }

    fn apply(&self, action: &Action, event: Option<&Event>) -> Result<(), ScriptError> {
        match action {
            Action::Print(template) => info!("script: {}", render(template, event)),
            Action::SetTimer(ms) => self.runtime.set_timer(*ms),
            Action::SendEvent(template) => self.runtime.submit(Event::outgoing(
                EventKind::UiMessage,
                render(template, event).into_bytes(),
            )),
            Action::Echo => {
                let Some(bytes) = event.and_then(Event::payload) else {
                    debug!("script: echo without payload");
                    return Ok(());
                };
                self.runtime
                    .submit(Event::outgoing(EventKind::UiMessage, bytes.to_vec()));
            }
            Action::Reset => self.runtime.request_reset(),
            Action::Reboot => self.system.restart(),
            Action::SetLoadFileName(path) => self.runtime.set_pinned_load_path(path),
            Action::SetConnectivity(code) => {
                let mode = ConnectivityMode::from_code(*code)
                    .ok_or_else(|| ScriptError::Uncaught(format!("bad connectivity mode {code}")))?;
                let Some(conn) = &self.connectivity else {
                    return Err(ScriptError::Capability("Connectivity"));
                };
                conn.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .set_mode(mode)
                    .map_err(|e| ScriptError::Uncaught(e.to_string()))?;
            }
            Action::Throw(msg) => return Err(ScriptError::Uncaught(msg.clone())),
        }
        Ok(())
    }
}

impl ScriptEngine for JsonScriptEngine {
    fn register_capability(&mut self, module: &CapabilityModule) -> Result<(), ScriptError> {
        if !self.modules.iter().any(|m| m.name == module.name) {
            self.modules.push(*module);
        }
        Ok(())
    }

    fn load_and_run(&mut self, source: &str) -> Result<(), ScriptError> {
        let script: Script =
            serde_json::from_str(source).map_err(|e| ScriptError::Eval(e.to_string()))?;
        self.run(&script.main, None)?;
        self.script = Some(script);
        Ok(())
    }

    fn invoke(&mut self, entrypoint: Entrypoint, args: ScriptArgs<'_>) -> Result<(), ScriptError> {
        let missing = ScriptError::MissingEntrypoint(entrypoint.name());
        let Some(script) = &self.script else {
            return Err(missing);
        };
        match entrypoint {
            Entrypoint::OnStart => self.run(script.on_start.as_ref().ok_or(missing)?, None),
            Entrypoint::OnTimer => self.run(script.on_timer.as_ref().ok_or(missing)?, None),
            Entrypoint::OnEvent => {
                let rules = script.on_event.as_ref().ok_or(missing)?;
                let ScriptArgs::Event(event) = args else {
                    return Ok(());
                };
                let code = event.kind().code();
                rules
                    .iter()
                    .filter(|r| r.when.is_none_or(|w| w == code))
                    .try_for_each(|r| self.run(&r.actions, Some(event)))
            }
        }
    }
}

/// Replace `{Property}` placeholders with the event's properties.
fn render(template: &str, event: Option<&Event>) -> String {
    let Some(event) = event else {
        return template.to_owned();
    };
    let mut out = template.to_owned();
    for (name, value) in event_properties(event) {
        let key = format!("{{{name}}}");
        if !out.contains(&key) {
            continue;
        }
        let mut text = String::new();
        match value {
            PropertyValue::Uint(v) => {
                let _ = write!(text, "{v}");
            }
            PropertyValue::Int(v) => {
                let _ = write!(text, "{v}");
            }
            PropertyValue::Buffer(b) => text.push_str(&String::from_utf8_lossy(b)),
        }
        out = out.replace(&key, &text);
    }
    out
}

/// Builds a fresh [`JsonScriptEngine`] for every reset cycle.
pub struct JsonEngineFactory {
    system: Arc<dyn SystemPort>,
    connectivity: Option<SharedConnectivity>,
}

impl JsonEngineFactory {
    pub fn new(system: Arc<dyn SystemPort>) -> Self {
        Self {
            system,
            connectivity: None,
        }
    }

    /// Let scripts switch the UI transport.
    pub fn with_connectivity(mut self, connectivity: SharedConnectivity) -> Self {
        self.connectivity = Some(connectivity);
        self
    }
}

impl EngineFactory for JsonEngineFactory {
    type Engine = JsonScriptEngine;

    fn create(&mut self, runtime: &RuntimeHandle) -> Result<Self::Engine, ScriptError> {
        Ok(JsonScriptEngine {
            runtime: runtime.clone(),
            system: Arc::clone(&self.system),
            connectivity: self.connectivity.clone(),
            modules: Vec::new(),
            script: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{NATIVE_MODULES, Notify, WaitOutcome};
    use crate::error::SendError;
    use crate::events::{Direction, PayloadLength};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Idle;
    impl Notify for Idle {
        fn signal(&self) {}
        fn wait(&self, _: Option<u32>) -> WaitOutcome {
            WaitOutcome::TimedOut
        }
    }

    #[derive(Default)]
    struct CountingSystem(AtomicUsize);
    impl SystemPort for CountingSystem {
        fn restart(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ModeRecorder(ConnectivityMode);
    impl ConnectivityControl for ModeRecorder {
        fn set_mode(&mut self, mode: ConnectivityMode) -> Result<(), SendError> {
            self.0 = mode;
            Ok(())
        }
        fn mode(&self) -> ConnectivityMode {
            self.0
        }
    }

    fn engine(rt: &RuntimeHandle) -> JsonScriptEngine {
        let mut e = JsonEngineFactory::new(Arc::new(CountingSystem::default()))
            .create(rt)
            .unwrap();
        for m in &NATIVE_MODULES {
            e.register_capability(m).unwrap();
        }
        e
    }

    fn runtime() -> RuntimeHandle {
        RuntimeHandle::new(Arc::new(Idle))
    }

    fn outgoing(rt: &RuntimeHandle) -> Vec<Vec<u8>> {
        rt.queue()
            .recv()
            .drain_all()
            .into_iter()
            .filter(|e| e.direction() == Direction::Outgoing)
            .filter_map(Event::into_payload)
            .collect()
    }

    #[test]
    fn parse_error_is_eval_failure() {
        let rt = runtime();
        let mut e = engine(&rt);
        assert!(matches!(e.load_and_run("{ nope"), Err(ScriptError::Eval(_))));
        assert!(matches!(
            e.load_and_run(r#"{"OnStart": [], "Bogus": []}"#),
            Err(ScriptError::Eval(_))
        ));
    }

    #[test]
    fn missing_on_start_is_reported() {
        let rt = runtime();
        let mut e = engine(&rt);
        e.load_and_run(r#"{"OnTimer": []}"#).unwrap();
        assert_eq!(
            e.invoke(Entrypoint::OnStart, ScriptArgs::None),
            Err(ScriptError::MissingEntrypoint("OnStart"))
        );
    }

    #[test]
    fn invoke_before_load_is_missing_entrypoint() {
        let rt = runtime();
        let mut e = engine(&rt);
        assert_eq!(
            e.invoke(Entrypoint::OnTimer, ScriptArgs::None),
            Err(ScriptError::MissingEntrypoint("OnTimer"))
        );
    }

    #[test]
    fn on_start_requests_timer_and_sends() {
        let rt = runtime();
        let mut e = engine(&rt);
        e.load_and_run(r#"{"OnStart": [{"setTimer": 250}, {"sendEvent": "up"}]}"#)
            .unwrap();
        e.invoke(Entrypoint::OnStart, ScriptArgs::None).unwrap();
        assert_eq!(rt.take_timer_request(), Some(250));
        assert_eq!(outgoing(&rt), vec![b"up".to_vec()]);
    }

    #[test]
    fn event_rules_filter_by_kind_and_echo() {
        let rt = runtime();
        let mut e = engine(&rt);
        e.load_and_run(
            r#"{"OnStart": [],
                "OnEvent": [
                  {"when": 1, "do": ["echo"]},
                  {"when": 4, "do": [{"sendEvent": "button"}]}
                ]}"#,
        )
        .unwrap();

        let ui = Event::ui_message(b"ping".to_vec());
        e.invoke(Entrypoint::OnEvent, ScriptArgs::Event(&ui)).unwrap();
        let button = Event::button(2);
        e.invoke(Entrypoint::OnEvent, ScriptArgs::Event(&button))
            .unwrap();
        let radio = Event::new(
            EventKind::RadioReceived,
            Direction::Incoming,
            Some(vec![1, 2]),
            PayloadLength::Explicit(2),
            Some(-80),
            None,
        )
        .unwrap();
        e.invoke(Entrypoint::OnEvent, ScriptArgs::Event(&radio))
            .unwrap();

        assert_eq!(outgoing(&rt), vec![b"ping".to_vec(), b"button".to_vec()]);
    }

    #[test]
    fn unregistered_module_is_capability_error() {
        let rt = runtime();
        let mut e = JsonEngineFactory::new(Arc::new(CountingSystem::default()))
            .create(&rt)
            .unwrap();
        e.register_capability(&NATIVE_MODULES[0]).unwrap();
        e.load_and_run(r#"{"OnStart": [{"print": "ok"}, "reset"]}"#)
            .unwrap();
        assert_eq!(
            e.invoke(Entrypoint::OnStart, ScriptArgs::None),
            Err(ScriptError::Capability("Platform"))
        );
        assert!(!rt.reset_pending());
    }

    #[test]
    fn calls_outside_the_registered_tables_are_refused() {
        let rt = runtime();
        let mut e = JsonEngineFactory::new(Arc::new(CountingSystem::default()))
            .create(&rt)
            .unwrap();
        e.register_capability(&CapabilityModule {
            name: "Platform",
            functions: &["setTimer"],
        })
        .unwrap();
        e.load_and_run(r#"{"OnStart": [{"setTimer": 100}], "OnTimer": ["reset"]}"#)
            .unwrap();
        e.invoke(Entrypoint::OnStart, ScriptArgs::None).unwrap();
        assert_eq!(rt.take_timer_request(), Some(100));

        assert_eq!(
            e.invoke(Entrypoint::OnTimer, ScriptArgs::None),
            Err(ScriptError::Capability("Platform"))
        );
        assert!(!rt.reset_pending());

        // `throw` belongs to Util, which is not registered here.
        e.load_and_run(r#"{"OnStart": [{"throw": "x"}]}"#).unwrap();
        assert_eq!(
            e.invoke(Entrypoint::OnStart, ScriptArgs::None),
            Err(ScriptError::Capability("Util"))
        );
    }

    #[test]
    fn every_action_has_a_native_owner() {
        for f in [
            "print", "throw", "setTimer", "sendEvent", "echo", "reset", "reboot",
            "setLoadFileName", "setConnectivity",
        ] {
            assert!(native_owner(f).is_some(), "{f} has no module");
        }
        assert!(native_owner("fillRandom").is_none());
    }

    #[test]
    fn control_actions_reach_runtime() {
        let rt = runtime();
        let system = Arc::new(CountingSystem::default());
        let mut e = JsonEngineFactory::new(system.clone()).create(&rt).unwrap();
        for m in &NATIVE_MODULES {
            e.register_capability(m).unwrap();
        }
        e.load_and_run(
            r#"{"main": [{"setLoadFileName": "/spiffs/test.js"}],
                "OnStart": ["reset", "reboot"]}"#,
        )
        .unwrap();
        assert_eq!(rt.pinned_load_path().as_deref(), Some("/spiffs/test.js"));
        e.invoke(Entrypoint::OnStart, ScriptArgs::None).unwrap();
        assert!(rt.reset_pending());
        assert_eq!(system.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn throw_fails_the_call() {
        let rt = runtime();
        let mut e = engine(&rt);
        e.load_and_run(r#"{"OnStart": [], "OnTimer": [{"throw": "boom"}, {"sendEvent": "x"}]}"#)
            .unwrap();
        assert_eq!(
            e.invoke(Entrypoint::OnTimer, ScriptArgs::None),
            Err(ScriptError::Uncaught("boom".into()))
        );
        assert!(outgoing(&rt).is_empty());
    }

    #[test]
    fn set_connectivity_uses_the_switch() {
        let rt = runtime();
        let conn: SharedConnectivity = Arc::new(Mutex::new(ModeRecorder(ConnectivityMode::Off)));
        let mut e = JsonEngineFactory::new(Arc::new(CountingSystem::default()))
            .with_connectivity(conn.clone())
            .create(&rt)
            .unwrap();
        for m in &NATIVE_MODULES {
            e.register_capability(m).unwrap();
        }
        e.load_and_run(r#"{"OnStart": [{"setConnectivity": 2}]}"#)
            .unwrap();
        e.invoke(Entrypoint::OnStart, ScriptArgs::None).unwrap();
        assert_eq!(conn.lock().unwrap().mode(), ConnectivityMode::Ble);

        e.load_and_run(r#"{"OnStart": [{"setConnectivity": 9}]}"#)
            .unwrap();
        assert!(matches!(
            e.invoke(Entrypoint::OnStart, ScriptArgs::None),
            Err(ScriptError::Uncaught(_))
        ));
    }

    #[test]
    fn print_renders_event_properties() {
        let ev = Event::button(3);
        assert_eq!(
            render("presses={NumPress} type={EventType} {Missing}", Some(&ev)),
            "presses=3 type=4 {Missing}"
        );
        assert_eq!(render("{NumPress}", None), "{NumPress}");
    }
}
