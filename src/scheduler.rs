//! Runtime scheduler: the single task that owns the script engine.
//!
//! Every other task talks to it through the
//! [`RuntimeHandle`](crate::runtime::RuntimeHandle).  One call to
//! [`Scheduler::tick`] is one loop iteration:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. reset requested?                                          │
//! │      drop engine ─▶ drain_all(recv) ─▶ disarm timer          │
//! │      ─▶ LoadRecovery: fresh engine + modules + load + OnStart│
//! │                                                              │
//! │ 2. Notify::wait(timer.wake_delay())                          │
//! │                                                              │
//! │ 3. timer.check(now) == Expired ─▶ OnTimer()                  │
//! │                                                              │
//! │ 4. while let Some(ev) = recv.dequeue_head()                  │
//! │      Incoming ─▶ OnEvent(ev)      Outgoing ─▶ Sender::send   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Script failures never leave this module: load failures feed the
//! rotation, dispatch failures are logged and counted.

use log::{debug, error, info, warn};

use crate::app::events::RuntimeEvent;
use crate::app::ports::{
    Clock, EngineFactory, Entrypoint, EventSink, NATIVE_MODULES, ScriptArgs, ScriptEngine,
    ScriptStore,
};
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::events::{Direction, Event, EventKind};
use crate::loader::{LoadOutcome, LoadRecovery};
use crate::runtime::RuntimeHandle;
use crate::timer::{TimerCheck, WakeTimer};

/// What the scheduler is currently able to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Before the first reset cycle.
    Booting,
    /// A script is loaded and receives events.
    Running { path: String },
    /// The rotation was exhausted.  Incoming events are discarded until a
    /// reset request arrives.
    AwaitingCommand,
}

/// Counters since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub resets: u32,
    pub load_attempts: u32,
    pub events_dispatched: u64,
    pub events_sent: u64,
    pub events_discarded: u64,
    pub dispatch_failures: u64,
    pub send_failures: u64,
    pub timer_firings: u64,
}

/// The consumer task.
pub struct Scheduler<F: EngineFactory, S: ScriptStore, C: Clock> {
    handle: RuntimeHandle,
    factory: F,
    store: S,
    clock: C,
    engine: Option<F::Engine>,
    timer: WakeTimer,
    loader: LoadRecovery,
    phase: Phase,
    stats: SchedulerStats,
    boot_pending: bool,
}

impl<F: EngineFactory, S: ScriptStore, C: Clock> Scheduler<F, S, C> {
    /// The first [`tick`](Self::tick) runs a full reset cycle, which loads
    /// the initial script.
    pub fn new(
        config: &RuntimeConfig,
        handle: RuntimeHandle,
        factory: F,
        store: S,
        clock: C,
    ) -> Self {
        Self {
            handle,
            factory,
            store,
            timer: WakeTimer::new(clock.ms_per_tick()),
            clock,
            engine: None,
            loader: LoadRecovery::new(config.load_candidates.clone()),
            phase: Phase::Booting,
            stats: SchedulerStats::default(),
            boot_pending: true,
        }
    }

    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn timer(&self) -> &WakeTimer {
        &self.timer
    }

    pub fn loader(&self) -> &LoadRecovery {
        &self.loader
    }

    /// `true` while a script engine instance is alive.
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Loop forever.
    pub fn run(&mut self, sink: &mut dyn EventSink) -> ! {
        loop {
            self.tick(sink);
        }
    }

    /// One scheduler iteration.
    pub fn tick(&mut self, sink: &mut dyn EventSink) {
        self.stats.ticks += 1;

        // 1. Reset
        let boot = core::mem::take(&mut self.boot_pending);
        if self.handle.take_reset_request() || boot {
            self.reinitialize(sink);
        }

        // 2. Wait
        let woke = self.handle.notifier().wait(self.timer.wake_delay());
        debug!("Scheduler woke: {:?}", woke);

        // 3. Timer
        if self.timer.check(self.clock.now_ticks()) == TimerCheck::Expired {
            self.stats.timer_firings += 1;
            sink.emit(&RuntimeEvent::TimerFired);
            self.dispatch(Entrypoint::OnTimer, ScriptArgs::None, sink);
        }

        // 4. Drain
        while let Some(event) = self.handle.queue().recv().dequeue_head() {
            self.handle_event(event, sink);
        }
    }

    fn reinitialize(&mut self, sink: &mut dyn EventSink) {
        self.stats.resets += 1;
        info!("Reset cycle {}: {:?}", self.stats.resets, self.stats);
        self.engine = None;

        let discarded = self.handle.queue().recv().drain_all();
        let count = discarded.len();
        drop(discarded);
        self.stats.events_discarded += count as u64;

        self.timer.disarm();
        let _ = self.handle.take_timer_request();
        info!("Reset: engine destroyed, {} queued event(s) discarded", count);
        sink.emit(&RuntimeEvent::ResetCompleted { discarded: count });

        let pinned = self.handle.take_pinned_load_path();
        let Self {
            factory,
            store,
            handle,
            engine,
            stats,
            loader,
            ..
        } = self;

        let outcome = loader.run(pinned, |path| {
            stats.load_attempts += 1;
            let _ = handle.take_timer_request();
            match load_candidate(factory, store, handle, path) {
                Ok(fresh) => {
                    *engine = Some(fresh);
                    Ok(())
                }
                Err(e) => {
                    sink.emit(&RuntimeEvent::LoadFailed {
                        path: path.to_owned(),
                        error: e.to_string(),
                    });
                    Err(e)
                }
            }
        });

        match outcome {
            LoadOutcome::Running { path, attempts } => {
                info!("Script {} running after {} attempt(s)", path, attempts);
                sink.emit(&RuntimeEvent::ScriptLoaded {
                    path: path.clone(),
                    attempts,
                });
                self.phase = Phase::Running { path };
                self.apply_timer_request();
            }
            LoadOutcome::Abandoned { attempts } => {
                error!("All {} load attempt(s) failed; awaiting command", attempts);
                self.engine = None;
                let _ = self.handle.take_timer_request();
                sink.emit(&RuntimeEvent::AwaitingCommand { attempts });
                self.phase = Phase::AwaitingCommand;
            }
        }
    }

    fn handle_event(&mut self, event: Event, sink: &mut dyn EventSink) {
        match event.direction() {
            Direction::Incoming => {
                if self.engine.is_some() {
                    self.stats.events_dispatched += 1;
                    self.dispatch(Entrypoint::OnEvent, ScriptArgs::Event(&event), sink);
                } else {
                    self.stats.events_discarded += 1;
                    debug!("No script loaded, dropping {:?}", event.kind());
                }
            }
            Direction::Outgoing => self.deliver(event, sink),
        }
    }

    fn deliver(&mut self, event: Event, sink: &mut dyn EventSink) {
        if event.kind() != EventKind::UiMessage {
            debug!("Outgoing {:?} has no transport, dropped", event.kind());
            self.stats.events_discarded += 1;
            return;
        }
        let payload = event.into_payload().unwrap_or_default();
        match self.handle.send_outgoing(&payload) {
            Ok(()) => self.stats.events_sent += 1,
            Err(e) => {
                self.stats.send_failures += 1;
                warn!("Outgoing UI message ({} bytes) not sent: {}", payload.len(), e);
                sink.emit(&RuntimeEvent::SendFailed(e));
            }
        }
    }

    fn dispatch(&mut self, entrypoint: Entrypoint, args: ScriptArgs<'_>, sink: &mut dyn EventSink) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if let Err(e) = engine.invoke(entrypoint, args) {
            self.stats.dispatch_failures += 1;
            warn!("{}() failed: {}", entrypoint.name(), e);
            sink.emit(&RuntimeEvent::DispatchFailed {
                entrypoint,
                error: e,
            });
        }
        self.apply_timer_request();
    }

    fn apply_timer_request(&mut self) {
        if let Some(ms) = self.handle.take_timer_request() {
            debug!("Timer {} ms", ms);
            self.timer.arm(ms, self.clock.now_ticks());
        }
    }
}

/// One load attempt on a brand new engine instance.
fn load_candidate<F: EngineFactory, S: ScriptStore>(
    factory: &mut F,
    store: &S,
    handle: &RuntimeHandle,
    path: &str,
) -> Result<F::Engine> {
    let source = store.read(path)?;
    let mut engine = factory.create(handle)?;
    for module in &NATIVE_MODULES {
        engine.register_capability(module)?;
    }
    engine.load_and_run(&source)?;
    engine.invoke(Entrypoint::OnStart, ScriptArgs::None)?;
    Ok(engine)
}
