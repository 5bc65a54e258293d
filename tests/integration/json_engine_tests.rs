//! JSON script engine driven through the real scheduler.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use fluxnode::adapters::script_engine::{JsonEngineFactory, SharedConnectivity};
use fluxnode::adapters::ui::Connectivity;
use fluxnode::app::events::RuntimeEvent;
use fluxnode::app::ports::{ConnectivityControl, ConnectivityMode};
use fluxnode::events::{Direction, Event, EventKind, PayloadLength};
use fluxnode::runtime::RuntimeHandle;
use fluxnode::scheduler::{Phase, Scheduler};

use crate::mock_ports::{
    AdvancingNotify, CountingSystem, FakeTransport, ManualClock, MemStore, RecordingSink,
    SentFrames, config,
};

const ECHO_APP: &str = r#"{
    "main": [ { "print": "echo app loading" } ],
    "OnStart": [ { "setConnectivity": 2 }, { "setTimer": 200 } ],
    "OnEvent": [
        { "when": 1, "do": [ "echo" ] },
        { "when": 0, "do": [ { "sendEvent": "rssi {LoRaRSSI}" } ] }
    ],
    "OnTimer": [ { "sendEvent": "tick" } ]
}"#;

const RECOVERY: &str = r#"{ "OnStart": [ { "print": "recovery mode" } ] }"#;

struct Rig {
    sched: Scheduler<JsonEngineFactory, MemStore, ManualClock>,
    sink: RecordingSink,
    system: Arc<CountingSystem>,
    connectivity: Arc<Mutex<Connectivity<FakeTransport, FakeTransport>>>,
    wifi_frames: SentFrames,
    ble_frames: SentFrames,
}

impl Rig {
    fn new(files: &[(&str, &str)]) -> Self {
        let clock = ManualClock::default();
        let runtime = RuntimeHandle::new(Arc::new(AdvancingNotify::new(clock.clone())));
        let system = Arc::new(CountingSystem::default());

        let wifi = FakeTransport::new();
        let ble = FakeTransport::new();
        let wifi_frames = wifi.frames.clone();
        let ble_frames = ble.frames.clone();
        let connectivity = Arc::new(Mutex::new(Connectivity::new(runtime.clone(), wifi, ble)));
        let shared: SharedConnectivity = connectivity.clone();

        let factory = JsonEngineFactory::new(system.clone()).with_connectivity(shared);
        let sched = Scheduler::new(
            &config(&["/main.json", "/recovery.json"]),
            runtime,
            factory,
            MemStore::with(files),
            clock,
        );
        Self {
            sched,
            sink: RecordingSink::default(),
            system,
            connectivity,
            wifi_frames,
            ble_frames,
        }
    }

    fn tick(&mut self) {
        self.sched.tick(&mut self.sink);
    }

    fn rt(&self) -> RuntimeHandle {
        self.sched.handle().clone()
    }

    fn mode(&self) -> ConnectivityMode {
        self.connectivity.lock().unwrap().mode()
    }
}

#[test]
fn echo_app_switches_to_ble_and_echoes_ui_messages() {
    let mut rig = Rig::new(&[("/main.json", ECHO_APP), ("/recovery.json", RECOVERY)]);
    rig.tick();

    assert_eq!(
        rig.sched.phase(),
        &Phase::Running {
            path: "/main.json".into()
        }
    );
    assert_eq!(rig.mode(), ConnectivityMode::Ble);
    assert!(rig.rt().has_sender());

    rig.rt().submit(Event::ui_message(b"hi there".to_vec()));
    rig.tick();
    assert_eq!(rig.ble_frames.take(), vec![b"hi there".to_vec()]);
    assert!(rig.wifi_frames.take().is_empty());
}

#[test]
fn radio_properties_render_into_outgoing_messages() {
    let mut rig = Rig::new(&[("/main.json", ECHO_APP)]);
    rig.tick();

    rig.rt()
        .submit_event(
            EventKind::RadioReceived,
            Direction::Incoming,
            Some(b"pkt".to_vec()),
            PayloadLength::Explicit(3),
            Some(-97),
            Some(1_700_000_000),
        )
        .unwrap();
    rig.tick();
    assert_eq!(rig.ble_frames.take(), vec![b"rssi -97".to_vec()]);
}

#[test]
fn on_timer_sends_tick() {
    let mut rig = Rig::new(&[("/main.json", ECHO_APP)]);
    // 200 ms: 180 ms sleep, then two one-tick catch-up waits.
    for _ in 0..3 {
        rig.tick();
    }
    assert_eq!(rig.sched.stats().timer_firings, 1);
    assert_eq!(rig.ble_frames.take(), vec![b"tick".to_vec()]);

    for _ in 0..3 {
        rig.tick();
    }
    assert_eq!(rig.sched.stats().timer_firings, 1);
}

#[test]
fn script_without_on_start_falls_back() {
    let mut rig = Rig::new(&[
        ("/main.json", r#"{ "OnEvent": [] }"#),
        ("/recovery.json", RECOVERY),
    ]);
    rig.tick();
    assert_eq!(
        rig.sched.phase(),
        &Phase::Running {
            path: "/recovery.json".into()
        }
    );
    assert!(matches!(
        &rig.sink.0[1],
        RuntimeEvent::LoadFailed { path, .. } if path == "/main.json"
    ));
}

#[test]
fn malformed_json_falls_back() {
    let mut rig = Rig::new(&[
        ("/main.json", "{ \"OnStart\": [ "),
        ("/recovery.json", RECOVERY),
    ]);
    rig.tick();
    assert_eq!(rig.sched.stats().load_attempts, 2);
    assert_eq!(rig.mode(), ConnectivityMode::Off);
}

#[test]
fn script_pins_next_load_and_resets() {
    let app = r#"{
        "OnStart": [],
        "OnEvent": [ { "when": 4, "do": [ { "setLoadFileName": "/recovery.json" }, "reset" ] } ]
    }"#;
    let mut rig = Rig::new(&[("/main.json", app), ("/recovery.json", RECOVERY)]);
    rig.tick();

    rig.rt().submit(Event::button(3));
    rig.tick();
    assert!(rig.rt().reset_pending());
    assert_eq!(rig.rt().pinned_load_path().as_deref(), Some("/recovery.json"));

    rig.tick();
    assert_eq!(
        rig.sched.phase(),
        &Phase::Running {
            path: "/recovery.json".into()
        }
    );
}

#[test]
fn reboot_action_reaches_system_port() {
    let app = r#"{ "OnStart": [], "OnEvent": [ { "do": [ "reboot" ] } ] }"#;
    let mut rig = Rig::new(&[("/main.json", app)]);
    rig.tick();
    rig.rt().submit(Event::status(EventKind::UiConnected));
    rig.tick();
    assert_eq!(rig.system.0.load(Ordering::SeqCst), 1);
}

#[test]
fn throw_in_on_event_is_contained() {
    let app = r#"{ "OnStart": [], "OnEvent": [ { "do": [ { "throw": "boom" } ] } ] }"#;
    let mut rig = Rig::new(&[("/main.json", app)]);
    rig.tick();
    rig.rt().submit(Event::button(1));
    rig.tick();
    assert_eq!(rig.sched.stats().dispatch_failures, 1);
    assert!(rig.sched.has_engine());
}

#[test]
fn connectivity_switch_moves_the_sender() {
    let app = r#"{
        "OnStart": [ { "setConnectivity": 1 } ],
        "OnEvent": [ { "when": 4, "do": [ { "setConnectivity": 2 }, { "sendEvent": "over ble" } ] } ]
    }"#;
    let mut rig = Rig::new(&[("/main.json", app)]);
    rig.tick();
    assert_eq!(rig.mode(), ConnectivityMode::Wifi);

    rig.rt().submit(Event::button(1));
    rig.tick();
    assert_eq!(rig.mode(), ConnectivityMode::Ble);
    assert_eq!(rig.ble_frames.take(), vec![b"over ble".to_vec()]);
    assert!(rig.wifi_frames.take().is_empty());
}
