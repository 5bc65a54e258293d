//! Scheduler lifecycle: boot, load rotation, reset, dispatch, timer.

use std::sync::Arc;

use fluxnode::app::events::RuntimeEvent;
use fluxnode::app::ports::Entrypoint;
use fluxnode::error::{ScriptError, SendError};
use fluxnode::events::{Event, EventKind};
use fluxnode::runtime::RuntimeHandle;
use fluxnode::scheduler::{Phase, Scheduler};

use crate::mock_ports::{
    AdvancingNotify, Call, CallLog, ManualClock, MemStore, RecordingSink, ScriptedFactory,
    SentFrames, config,
};

struct Rig {
    sched: Scheduler<ScriptedFactory, MemStore, ManualClock>,
    sink: RecordingSink,
    store: MemStore,
    notify: Arc<AdvancingNotify>,
    log: CallLog,
}

impl Rig {
    fn new(files: &[(&str, &str)]) -> Self {
        let clock = ManualClock::default();
        let notify = Arc::new(AdvancingNotify::new(clock.clone()));
        let runtime = RuntimeHandle::new(notify.clone());
        let factory = ScriptedFactory::default();
        let log = Arc::clone(&factory.log);
        let store = MemStore::with(files);
        let sched = Scheduler::new(
            &config(&["/main.js", "/recovery.js"]),
            runtime,
            factory,
            store.clone(),
            clock,
        );
        Self {
            sched,
            sink: RecordingSink::default(),
            store,
            notify,
            log,
        }
    }

    fn tick(&mut self) {
        self.sched.tick(&mut self.sink);
    }

    fn rt(&self) -> RuntimeHandle {
        self.sched.handle().clone()
    }

    fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn last_wait(&self) -> Option<u32> {
        *self.notify.waits.lock().unwrap().last().unwrap()
    }
}

fn running(path: &str) -> Phase {
    Phase::Running { path: path.into() }
}

// ── Boot + load rotation ─────────────────────────────────────

#[test]
fn boot_registers_modules_loads_primary_and_starts_it() {
    let mut rig = Rig::new(&[("/main.js", "ok"), ("/recovery.js", "ok")]);
    assert_eq!(rig.sched.phase(), &Phase::Booting);

    rig.tick();

    assert_eq!(rig.sched.phase(), &running("/main.js"));
    assert_eq!(
        rig.calls(),
        vec![
            Call::Created(1),
            Call::Registered(1, "Util"),
            Call::Registered(1, "Platform"),
            Call::Registered(1, "FileSystem"),
            Call::Registered(1, "LoRa"),
            Call::Registered(1, "Crypto"),
            Call::Loaded(1, "ok".into()),
            Call::Invoked(1, Entrypoint::OnStart, None),
        ]
    );
    assert!(rig.sink.0.contains(&RuntimeEvent::ScriptLoaded {
        path: "/main.js".into(),
        attempts: 1
    }));
    // Nothing armed: the scheduler sleeps until signalled.
    assert_eq!(rig.last_wait(), None);
}

#[test]
fn broken_primary_falls_back_to_recovery_on_a_fresh_engine() {
    let mut rig = Rig::new(&[("/main.js", "syntax-error"), ("/recovery.js", "ok")]);
    rig.tick();

    assert_eq!(rig.sched.phase(), &running("/recovery.js"));
    assert_eq!(rig.sched.loader().rotation_index(), 0);
    assert_eq!(rig.sched.stats().load_attempts, 2);

    let calls = rig.calls();
    let dropped = calls.iter().position(|c| *c == Call::Dropped(1)).unwrap();
    let created = calls.iter().position(|c| *c == Call::Created(2)).unwrap();
    assert!(dropped < created, "failed engine must be gone before the next one");
    assert!(matches!(
        &rig.sink.0[1],
        RuntimeEvent::LoadFailed { path, .. } if path == "/main.js"
    ));
}

#[test]
fn missing_on_start_counts_as_a_failed_load() {
    let mut rig = Rig::new(&[("/main.js", "no-start"), ("/recovery.js", "ok")]);
    rig.tick();
    assert_eq!(rig.sched.phase(), &running("/recovery.js"));
}

#[test]
fn exhausted_rotation_awaits_command() {
    let mut rig = Rig::new(&[("/main.js", "syntax-error")]);
    rig.tick();

    assert_eq!(rig.sched.phase(), &Phase::AwaitingCommand);
    assert!(!rig.sched.has_engine());
    assert!(rig.sink.0.contains(&RuntimeEvent::AwaitingCommand { attempts: 2 }));

    // Incoming traffic is discarded, outgoing still flows.
    let frames = SentFrames::default();
    rig.rt().set_sender(Some(Box::new(frames.clone())));
    rig.rt().submit(Event::ui_message(b"hello".to_vec()));
    rig.rt()
        .submit(Event::outgoing(EventKind::UiMessage, b"status".to_vec()));
    rig.tick();
    rig.tick();

    assert_eq!(rig.sched.phase(), &Phase::AwaitingCommand);
    assert_eq!(rig.count(|c| matches!(c, Call::Invoked(..))), 0);
    assert_eq!(frames.take(), vec![b"status".to_vec()]);
    assert_eq!(rig.sched.stats().events_discarded, 1);

    // Only a reset leaves the state.
    rig.store.put("/recovery.js", "ok");
    rig.rt().request_reset();
    rig.tick();
    assert_eq!(rig.sched.phase(), &running("/recovery.js"));
}

// ── Reset ────────────────────────────────────────────────────

#[test]
fn reset_discards_queue_and_honours_pinned_path_once() {
    let mut rig = Rig::new(&[
        ("/main.js", "ok"),
        ("/recovery.js", "ok"),
        ("/test.js", "echo"),
    ]);
    rig.tick();

    let rt = rig.rt();
    for i in 0..4u8 {
        rt.submit(Event::ui_message(vec![b'a' + i; 8]));
    }
    rt.set_pinned_load_path("/test.js");
    rt.request_reset();
    rig.tick();

    assert_eq!(rt.pending_events(), 0);
    assert_eq!(rt.pinned_load_path(), None);
    assert_eq!(rig.sched.phase(), &running("/test.js"));
    assert!(rig.sink.0.contains(&RuntimeEvent::ResetCompleted { discarded: 4 }));
    assert_eq!(rig.sched.stats().events_discarded, 4);
    assert_eq!(
        rig.count(|c| matches!(c, Call::Invoked(_, Entrypoint::OnEvent, _))),
        0
    );
    assert!(rig.calls().contains(&Call::Dropped(1)));
    assert!(rig.calls().contains(&Call::Loaded(2, "echo".into())));

    // The pin was consumed: the next reset goes back to the rotation.
    rt.request_reset();
    rig.tick();
    assert_eq!(rig.sched.phase(), &running("/main.js"));
}

#[test]
fn failing_pinned_path_falls_back_to_rotation() {
    let mut rig = Rig::new(&[("/main.js", "ok")]);
    rig.tick();

    rig.rt().set_pinned_load_path("/missing.js");
    rig.rt().request_reset();
    rig.tick();

    assert_eq!(rig.sched.phase(), &running("/main.js"));
    assert!(rig.sink.0.contains(&RuntimeEvent::ScriptLoaded {
        path: "/main.js".into(),
        attempts: 2
    }));
}

#[test]
fn repeated_reset_requests_coalesce() {
    let mut rig = Rig::new(&[("/main.js", "ok")]);
    rig.tick();
    rig.rt().request_reset();
    rig.rt().request_reset();
    rig.tick();
    rig.tick();

    assert_eq!(rig.sched.stats().resets, 2);
    assert_eq!(rig.count(|c| matches!(c, Call::Created(_))), 2);
}

#[test]
fn script_requested_reset_runs_on_next_tick() {
    let mut rig = Rig::new(&[("/main.js", "reset-on-event")]);
    rig.tick();
    rig.rt().submit(Event::button(1));
    rig.tick();
    assert!(rig.rt().reset_pending());
    rig.tick();
    assert!(!rig.rt().reset_pending());
    assert!(rig.calls().contains(&Call::Created(2)));
}

// ── Dispatch ─────────────────────────────────────────────────

#[test]
fn incoming_events_reach_on_event_in_order() {
    let mut rig = Rig::new(&[("/main.js", "ok")]);
    rig.tick();

    let rt = rig.rt();
    rt.submit(Event::button(2));
    rt.submit(Event::ui_message(b"x".to_vec()));
    rt.submit(Event::status(EventKind::UiDisconnected));
    rig.tick();

    let kinds: Vec<_> = rig
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Invoked(_, Entrypoint::OnEvent, kind) => kind,
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::ButtonPressed,
            EventKind::UiMessage,
            EventKind::UiDisconnected
        ]
    );
    assert_eq!(rig.sched.stats().events_dispatched, 3);
}

#[test]
fn throwing_handler_is_logged_and_runtime_continues() {
    let mut rig = Rig::new(&[("/main.js", "throw-event")]);
    rig.tick();

    rig.rt().submit(Event::button(1));
    rig.rt().submit(Event::button(2));
    rig.tick();

    assert_eq!(rig.sched.phase(), &running("/main.js"));
    assert_eq!(rig.sched.stats().dispatch_failures, 2);
    assert!(rig.sink.0.contains(&RuntimeEvent::DispatchFailed {
        entrypoint: Entrypoint::OnEvent,
        error: ScriptError::Uncaught("TypeError: x is undefined".into()),
    }));
    assert!(rig.sched.has_engine());
}

#[test]
fn outgoing_events_go_to_active_sender() {
    let mut rig = Rig::new(&[("/main.js", "echo")]);
    rig.tick();

    // No UI connected yet.
    rig.rt().submit(Event::ui_message(b"lost".to_vec()));
    rig.tick();
    assert!(
        rig.sink
            .0
            .contains(&RuntimeEvent::SendFailed(SendError::NotConnected))
    );
    assert_eq!(rig.sched.stats().send_failures, 1);

    let frames = SentFrames::default();
    rig.rt().set_sender(Some(Box::new(frames.clone())));
    rig.rt().submit(Event::ui_message(b"ping".to_vec()));
    rig.tick();
    assert_eq!(frames.take(), vec![b"ping".to_vec()]);
    assert_eq!(rig.sched.stats().events_sent, 1);
}

// ── Timer ────────────────────────────────────────────────────

#[test]
fn timer_armed_in_on_start_fires_once() {
    let mut rig = Rig::new(&[("/main.js", "timer=100")]);

    rig.tick();
    // 100 ms at 10 ms/tick: sleep 90% of it first.
    assert_eq!(rig.last_wait(), Some(9));
    assert_eq!(rig.sched.stats().timer_firings, 0);

    rig.tick();
    assert_eq!(rig.last_wait(), Some(1));
    assert_eq!(rig.sched.stats().timer_firings, 1);
    assert!(rig.sink.0.contains(&RuntimeEvent::TimerFired));

    for _ in 0..5 {
        rig.tick();
    }
    assert_eq!(rig.sched.stats().timer_firings, 1);
    assert_eq!(
        rig.count(|c| matches!(c, Call::Invoked(_, Entrypoint::OnTimer, _))),
        1
    );
    assert_eq!(rig.last_wait(), None);
}

#[test]
fn on_timer_can_rearm() {
    let mut rig = Rig::new(&[("/main.js", "timer=100 retimer=50")]);
    rig.tick();
    rig.tick();

    assert_eq!(rig.sched.stats().timer_firings, 1);
    assert!(rig.sched.timer().is_armed());
    assert_eq!(rig.sched.timer().remaining_ms(), Some(50));
}

#[test]
fn reset_disarms_the_old_timer() {
    let mut rig = Rig::new(&[("/main.js", "timer=100000"), ("/plain.js", "ok")]);
    rig.tick();
    assert!(rig.sched.timer().is_armed());

    rig.rt().set_pinned_load_path("/plain.js");
    rig.rt().request_reset();
    rig.tick();

    assert!(!rig.sched.timer().is_armed());
    assert_eq!(rig.last_wait(), None);
}
