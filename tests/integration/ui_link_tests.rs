//! UI link end to end: inbound framing → script → outbound Sender.

use std::sync::{Arc, Mutex};

use fluxnode::adapters::record::{RecordAssembler, record_count, send_records};
use fluxnode::adapters::script_engine::JsonEngineFactory;
use fluxnode::adapters::sender::{BleSender, IndicationLink, LaneSender, pump_send_lane};
use fluxnode::adapters::ui::UiInbound;
use fluxnode::error::SendError;
use fluxnode::events::EventKind;
use fluxnode::runtime::RuntimeHandle;
use fluxnode::scheduler::Scheduler;

use crate::mock_ports::{
    AdvancingNotify, CountingSystem, ManualClock, MemStore, RecordingSink, config,
};

const ECHO: &str = r#"{
    "OnStart": [],
    "OnEvent": [
        { "when": 1, "do": [ "echo" ] },
        { "when": 2, "do": [ { "sendEvent": "welcome" } ] }
    ]
}"#;

fn scheduler() -> Scheduler<JsonEngineFactory, MemStore, ManualClock> {
    let clock = ManualClock::default();
    let runtime = RuntimeHandle::new(Arc::new(AdvancingNotify::new(clock.clone())));
    Scheduler::new(
        &config(&["/main.json"]),
        runtime,
        JsonEngineFactory::new(Arc::new(CountingSystem::default())),
        MemStore::with(&[("/main.json", ECHO)]),
        clock,
    )
}

/// Central that collects indications, 23-byte default MTU.
#[derive(Clone, Default)]
struct Central(Arc<Mutex<Vec<Vec<u8>>>>);

impl IndicationLink for Central {
    fn is_connected(&self) -> bool {
        true
    }
    fn mtu(&self) -> usize {
        23
    }
    fn indicate(&mut self, record: &[u8]) -> Result<(), SendError> {
        self.0.lock().unwrap().push(record.to_vec());
        Ok(())
    }
}

#[test]
fn ble_records_round_trip_through_the_script() {
    let mut sched = scheduler();
    let mut sink = RecordingSink::default();
    sched.tick(&mut sink);

    let rt = sched.handle().clone();
    let central = Central::default();
    rt.set_sender(Some(Box::new(BleSender::new(central.clone()))));

    // Peer writes a 100-byte message as 18-byte records.
    let msg: Vec<u8> = (0..100u8).collect();
    let mut inbound = UiInbound::new(rt.clone());
    inbound.on_conninfo(true);
    send_records(&msg, 18, |r| {
        inbound.on_record(r);
        Ok(())
    })
    .unwrap();
    assert_eq!(rt.pending_events(), 2);
    sched.tick(&mut sink);

    let records = central.0.lock().unwrap().clone();
    assert_eq!(records.len(), record_count(7, 18) + record_count(100, 18));

    let mut peer = RecordAssembler::new();
    let received: Vec<Vec<u8>> = records.iter().filter_map(|r| peer.push(r)).collect();
    assert_eq!(received, vec![b"welcome".to_vec(), msg]);
}

#[test]
fn websocket_replies_wait_on_the_send_lane() {
    let mut sched = scheduler();
    let mut sink = RecordingSink::default();
    sched.tick(&mut sink);

    let rt = sched.handle().clone();
    let pump_wake = Arc::new(AdvancingNotify::new(ManualClock::default()));
    rt.set_sender(Some(Box::new(LaneSender::new(
        rt.shared_queue(),
        pump_wake.clone(),
    ))));

    let mut inbound = UiInbound::new(rt.clone());
    inbound.on_message(b"one");
    inbound.on_message(b"two");
    sched.tick(&mut sink);

    // The scheduler only queued the frames and woke the pump.
    let queue = rt.shared_queue();
    assert_eq!(queue.send().len(), 2);
    assert_eq!(
        pump_wake
            .signals
            .load(std::sync::atomic::Ordering::SeqCst),
        2
    );
    assert_eq!(
        queue.send().dequeue_head().map(|e| e.kind()),
        Some(EventKind::UiMessage)
    );

    let mut written = Vec::new();
    let n = pump_send_lane(&queue, |frame| {
        written.push(frame.to_vec());
        Ok(())
    });
    assert_eq!(n, 1);
    assert_eq!(written, vec![b"two".to_vec()]);
    assert!(queue.send().is_empty());
}
