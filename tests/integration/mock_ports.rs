//! Mock port implementations for integration tests.
//!
//! Everything here is deterministic: the clock only moves when the
//! scheduler waits, and the scripted engine records every call so tests
//! can assert on the full engine lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fluxnode::adapters::ui::UiTransport;
use fluxnode::app::events::RuntimeEvent;
use fluxnode::app::ports::{
    CapabilityModule, Clock, EngineFactory, Entrypoint, EventSink, Notify, ScriptArgs,
    ScriptEngine, ScriptStore, Sender, SystemPort, WaitOutcome,
};
use fluxnode::config::{RuntimeConfig, ScriptPath};
use fluxnode::error::{ScriptError, SendError, StoreError};
use fluxnode::events::{Event, EventKind};
use fluxnode::runtime::RuntimeHandle;

pub const MS_PER_TICK: u32 = 10;

// ── Clock + notify ────────────────────────────────────────────

/// Tick counter that only the notifier advances.
#[derive(Clone, Default)]
pub struct ManualClock(Arc<AtomicU32>);

#[allow(dead_code)]
impl ManualClock {
    pub fn now(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn advance(&self, ticks: u32) {
        self.0.fetch_add(ticks, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ticks(&self) -> u32 {
        self.now()
    }
    fn ms_per_tick(&self) -> u32 {
        MS_PER_TICK
    }
    fn epoch_secs(&self) -> Option<u64> {
        None
    }
}

/// Never blocks: a wait consumes its full timeout (one tick when unbounded).
pub struct AdvancingNotify {
    clock: ManualClock,
    pub signals: AtomicUsize,
    pub waits: Mutex<Vec<Option<u32>>>,
}

impl AdvancingNotify {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            signals: AtomicUsize::new(0),
            waits: Mutex::new(Vec::new()),
        }
    }
}

impl Notify for AdvancingNotify {
    fn signal(&self) {
        self.signals.fetch_add(1, Ordering::SeqCst);
    }

    fn wait(&self, timeout_ticks: Option<u32>) -> WaitOutcome {
        self.waits.lock().unwrap().push(timeout_ticks);
        self.clock.advance(timeout_ticks.unwrap_or(1));
        WaitOutcome::TimedOut
    }
}

// ── Script store ──────────────────────────────────────────────

/// In-memory filesystem; tests may rewrite files between resets.
#[derive(Clone, Default)]
pub struct MemStore(Arc<Mutex<HashMap<String, String>>>);

#[allow(dead_code)]
impl MemStore {
    pub fn with(files: &[(&str, &str)]) -> Self {
        let store = Self::default();
        for (path, source) in files {
            store.put(path, source);
        }
        store
    }

    pub fn put(&self, path: &str, source: &str) {
        self.0
            .lock()
            .unwrap()
            .insert(path.to_owned(), source.to_owned());
    }
}

impl ScriptStore for MemStore {
    fn read(&self, path: &str) -> Result<String, StoreError> {
        self.0
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

// ── Scripted engine ───────────────────────────────────────────

/// One observable engine interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Created(u32),
    Registered(u32, &'static str),
    Loaded(u32, String),
    Invoked(u32, Entrypoint, Option<EventKind>),
    Dropped(u32),
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Engine whose behaviour is spelled out by space-separated directives in
/// the script source:
///
/// | Directive       | Effect                                    |
/// |-----------------|-------------------------------------------|
/// | `syntax-error`  | `load_and_run` fails                      |
/// | `no-start`      | `OnStart` throws                          |
/// | `throw-event`   | `OnEvent` throws                          |
/// | `timer=N`       | `OnStart` arms an N ms timer              |
/// | `retimer=N`     | `OnTimer` re-arms an N ms timer           |
/// | `echo`          | `OnEvent` sends the payload back          |
/// | `reset-on-event`| `OnEvent` requests a reset                |
pub struct ScriptedEngine {
    id: u32,
    runtime: RuntimeHandle,
    log: CallLog,
    directives: Vec<String>,
}

impl ScriptedEngine {
    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }

    fn has(&self, directive: &str) -> bool {
        self.directives.iter().any(|d| d == directive)
    }

    fn value(&self, key: &str) -> Option<u32> {
        self.directives
            .iter()
            .find_map(|d| d.strip_prefix(key)?.strip_prefix('=')?.parse().ok())
    }
}

impl ScriptEngine for ScriptedEngine {
    fn register_capability(&mut self, module: &CapabilityModule) -> Result<(), ScriptError> {
        self.record(Call::Registered(self.id, module.name));
        Ok(())
    }

    fn load_and_run(&mut self, source: &str) -> Result<(), ScriptError> {
        self.record(Call::Loaded(self.id, source.to_owned()));
        self.directives = source.split_whitespace().map(str::to_owned).collect();
        if self.has("syntax-error") {
            return Err(ScriptError::Eval("SyntaxError: unexpected token".into()));
        }
        Ok(())
    }

    fn invoke(&mut self, entrypoint: Entrypoint, args: ScriptArgs<'_>) -> Result<(), ScriptError> {
        let event = match args {
            ScriptArgs::Event(ev) => Some(ev),
            ScriptArgs::None => None,
        };
        self.record(Call::Invoked(self.id, entrypoint, event.map(Event::kind)));
        match entrypoint {
            Entrypoint::OnStart => {
                if self.has("no-start") {
                    return Err(ScriptError::MissingEntrypoint("OnStart"));
                }
                if let Some(ms) = self.value("timer") {
                    self.runtime.set_timer(ms);
                }
            }
            Entrypoint::OnTimer => {
                if let Some(ms) = self.value("retimer") {
                    self.runtime.set_timer(ms);
                }
            }
            Entrypoint::OnEvent => {
                if self.has("throw-event") {
                    return Err(ScriptError::Uncaught("TypeError: x is undefined".into()));
                }
                if self.has("echo") {
                    if let Some(bytes) = event.and_then(Event::payload) {
                        self.runtime
                            .submit(Event::outgoing(EventKind::UiMessage, bytes.to_vec()));
                    }
                }
                if self.has("reset-on-event") {
                    self.runtime.request_reset();
                }
            }
        }
        Ok(())
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        self.record(Call::Dropped(self.id));
    }
}

#[derive(Default)]
pub struct ScriptedFactory {
    pub log: CallLog,
    next_id: u32,
}

#[allow(dead_code)]
impl ScriptedFactory {
    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }
}

impl EngineFactory for ScriptedFactory {
    type Engine = ScriptedEngine;

    fn create(&mut self, runtime: &RuntimeHandle) -> Result<Self::Engine, ScriptError> {
        self.next_id += 1;
        self.log.lock().unwrap().push(Call::Created(self.next_id));
        Ok(ScriptedEngine {
            id: self.next_id,
            runtime: runtime.clone(),
            log: Arc::clone(&self.log),
            directives: Vec::new(),
        })
    }
}

// ── Sink, sender, system ──────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink(pub Vec<RuntimeEvent>);

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &RuntimeEvent) {
        self.0.push(event.clone());
    }
}

#[derive(Clone, Default)]
pub struct SentFrames(pub Arc<Mutex<Vec<Vec<u8>>>>);

#[allow(dead_code)]
impl SentFrames {
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl Sender for SentFrames {
    fn send(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        self.0.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingSystem(pub AtomicUsize);

impl SystemPort for CountingSystem {
    fn restart(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// UI transport that only records its lifecycle.
#[allow(dead_code)]
pub struct FakeTransport {
    pub frames: SentFrames,
    pub starts: Arc<AtomicUsize>,
    pub fail_start: bool,
}

#[allow(dead_code)]
impl FakeTransport {
    pub fn new() -> Self {
        Self {
            frames: SentFrames::default(),
            starts: Arc::new(AtomicUsize::new(0)),
            fail_start: false,
        }
    }
}

impl UiTransport for FakeTransport {
    fn start(&mut self) -> Result<(), SendError> {
        if self.fail_start {
            return Err(SendError::TransportFailed);
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {}

    fn sender(&self) -> Box<dyn Sender> {
        Box::new(self.frames.clone())
    }
}

// ── Config ────────────────────────────────────────────────────

pub fn config(candidates: &[&str]) -> RuntimeConfig {
    let mut cfg = RuntimeConfig {
        ms_per_tick: MS_PER_TICK,
        ..RuntimeConfig::default()
    };
    cfg.load_candidates.clear();
    for c in candidates {
        let mut path = ScriptPath::new();
        path.push_str(c).unwrap();
        cfg.load_candidates.push(path).unwrap();
    }
    cfg
}
