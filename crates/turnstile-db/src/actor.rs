//! The connection task: sole owner of the scheduler, the only place
//! completions are delivered and notifications emitted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rusqlite::{InterruptHandle, OpenFlags};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use turnstile_core::{
    ChangeEvent, ConnectionId, DatabaseError, Event, ProfileEvent, Result, TraceEvent,
};
use turnstile_hooks::HookSet;
use turnstile_scheduler::{Admission, ConnectionState, Drain, Scheduler, Status};

use crate::call::{self, Call, CallKind, Callback, Delivery, Settle};
use crate::engine::Engine;
use crate::mode::{ModeChange, Modes};
use crate::worker;

/// Requests from [`crate::Database`] handles.
pub(crate) enum Command {
    Schedule { call: Call, exclusive: bool },
    /// Like `Schedule`, shared, followed by a drain pass.
    Configure { call: Call },
    Mode(ModeChange),
    Interrupt(oneshot::Sender<Result<()>>),
    Status(oneshot::Sender<Result<Status>>),
}

/// Traffic from workers and hook relays back to the connection task.
pub(crate) enum Signal {
    Opened {
        result: Result<InterruptHandle>,
        done: Option<Callback<()>>,
    },
    Completed {
        kind: CallKind,
        outcome: Box<dyn Settle>,
    },
    Panicked {
        kind: CallKind,
        label: &'static str,
    },
    Hook(Event),
}

impl From<TraceEvent> for Signal {
    fn from(ev: TraceEvent) -> Self {
        Signal::Hook(Event::Trace(ev))
    }
}

impl From<ProfileEvent> for Signal {
    fn from(ev: ProfileEvent) -> Self {
        Signal::Hook(Event::Profile(ev))
    }
}

impl From<ChangeEvent> for Signal {
    fn from(ev: ChangeEvent) -> Self {
        Signal::Hook(Event::Change(ev))
    }
}

pub(crate) struct ConnectionActor {
    id: ConnectionId,
    scheduler: Scheduler<Call>,
    engine: Arc<Mutex<Engine>>,
    commands: mpsc::UnboundedReceiver<Command>,
    signals: mpsc::UnboundedReceiver<Signal>,
    outlet: mpsc::UnboundedSender<Signal>,
    events: broadcast::Sender<Event>,
    open: Arc<AtomicBool>,
    interrupt: Option<InterruptHandle>,
    modes: Modes,
}

impl ConnectionActor {
    pub(crate) fn new(
        id: ConnectionId,
        commands: mpsc::UnboundedReceiver<Command>,
        events: broadcast::Sender<Event>,
        open: Arc<AtomicBool>,
    ) -> Self {
        let (outlet, signals) = mpsc::unbounded_channel();
        let engine = Engine::new(HookSet::new(outlet.clone()));
        Self {
            id,
            scheduler: Scheduler::new(),
            engine: Arc::new(Mutex::new(engine)),
            commands,
            signals,
            outlet,
            events,
            open,
            interrupt: None,
            modes: Modes::default(),
        }
    }

    /// Open the engine, then serve until every handle is gone and nothing is
    /// left in flight or queued.
    pub(crate) async fn run(mut self, path: String, flags: OpenFlags, done: Option<Callback<()>>) {
        info!(connection = %self.id, path = %path, "connection task started");
        worker::open(Arc::clone(&self.engine), path, flags, done, self.outlet.clone());

        let mut accepting = true;
        loop {
            tokio::select! {
                biased;
                Some(signal) = self.signals.recv() => self.handle_signal(signal),
                command = self.commands.recv(), if accepting => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!(connection = %self.id, "all handles dropped");
                        accepting = false;
                    }
                },
                else => break,
            }
            if !accepting && self.is_quiescent() {
                break;
            }
        }
        info!(connection = %self.id, state = %self.scheduler.state(), "connection task stopped");
    }

    fn is_quiescent(&self) -> bool {
        self.scheduler.state() != ConnectionState::Opening
            && self.scheduler.pending() == 0
            && self.scheduler.queued() == 0
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Schedule { call, exclusive } => self.schedule(call, exclusive),
            Command::Configure { call } => {
                self.schedule(call, false);
                self.process();
            }
            Command::Mode(change) => {
                self.change_mode(change);
                self.process();
            }
            Command::Interrupt(reply) => {
                let _ = reply.send(self.interrupt());
            }
            Command::Status(reply) => {
                let _ = reply.send(Ok(self.scheduler.status()));
            }
        }
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Opened { result, done } => self.finish_open(result, done),
            Signal::Completed { kind, outcome } => self.finish_call(kind, outcome),
            Signal::Panicked { kind, label } => self.finish_panicked(kind, label),
            Signal::Hook(event) => self.emit(event),
        }
    }

    fn schedule(&mut self, call: Call, exclusive: bool) {
        match self.scheduler.schedule(call, exclusive) {
            Admission::Run(call) => self.dispatch(call),
            Admission::Queued => {
                debug!(connection = %self.id, queued = self.scheduler.queued(), "call queued");
            }
            Admission::Rejected(call) => {
                warn!(connection = %self.id, op = call.label(), "call on a closed connection");
                if let Delivery::Unhandled(e) = call.reject(DatabaseError::closed()) {
                    self.emit(Event::error(e));
                }
            }
        }
    }

    /// Dispatch whatever became runnable, or fail everything still queued
    /// on a dead connection.
    fn process(&mut self) {
        match self.scheduler.process() {
            Drain::Nothing => {}
            Drain::Dispatch(calls) => {
                for call in calls {
                    self.dispatch(call);
                }
            }
            Drain::Flush(calls) => {
                warn!(connection = %self.id, flushed = calls.len(), "flushing queue of closed connection");
                let mut called = false;
                let mut unhandled = None;
                for call in calls {
                    match call.reject(DatabaseError::handle_closed()) {
                        Delivery::Callback => called = true,
                        Delivery::Unhandled(e) => unhandled = Some(e),
                        Delivery::Silent => {}
                    }
                }
                // One notification covers every uncallbacked call in the batch.
                if !called {
                    if let Some(e) = unhandled {
                        self.emit(Event::error(e));
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, call: Call) {
        if call.kind() == CallKind::Close {
            self.scheduler.begin_close();
        }
        debug!(
            connection = %self.id,
            op = call.label(),
            pending = self.scheduler.pending(),
            state = %self.scheduler.state(),
            "dispatching"
        );
        worker::submit(Arc::clone(&self.engine), call, self.outlet.clone());
    }

    fn finish_open(&mut self, result: Result<InterruptHandle>, done: Option<Callback<()>>) {
        match result {
            Ok(interrupt) => {
                self.scheduler.opened();
                self.interrupt = Some(interrupt);
                self.open.store(true, Ordering::Release);
                info!(connection = %self.id, "database opened");
                if let Delivery::Unhandled(e) = call::deliver(Ok(()), done) {
                    self.emit(Event::error(e));
                }
                self.emit(Event::Open);
            }
            Err(e) => {
                error!(connection = %self.id, code = e.code(), "open failed: {e}");
                self.scheduler.open_failed();
                if let Delivery::Unhandled(e) = call::deliver(Err(e), done) {
                    self.emit(Event::error(e));
                }
            }
        }
        self.process();
    }

    fn finish_call(&mut self, kind: CallKind, outcome: Box<dyn Settle>) {
        let ok = outcome.succeeded();
        match kind {
            CallKind::Operation => self.scheduler.complete(),
            CallKind::Close => self.finish_close(ok),
        }
        if let Delivery::Unhandled(e) = outcome.deliver() {
            error!(connection = %self.id, code = e.code(), "unhandled failure: {e}");
            self.emit(Event::error(e));
        }
        if kind == CallKind::Close && ok {
            self.emit(Event::Close);
        }
        self.process();
    }

    fn finish_close(&mut self, ok: bool) {
        self.scheduler.finish_close(ok);
        if ok {
            self.interrupt = None;
            self.open.store(false, Ordering::Release);
            info!(connection = %self.id, "database closed");
        }
    }

    fn finish_panicked(&mut self, kind: CallKind, label: &'static str) {
        match kind {
            CallKind::Operation => self.scheduler.complete(),
            CallKind::Close => self.finish_close(false),
        }
        self.emit(Event::error(DatabaseError::internal(format!("{label} panicked"))));
        self.process();
    }

    fn change_mode(&mut self, change: ModeChange) {
        match self.modes.apply(change) {
            Some(serialize) => {
                self.scheduler.set_serialize(serialize);
                debug!(connection = %self.id, serialize, "mode changed");
            }
            None => warn!(connection = %self.id, ?change, "mode scope ended twice"),
        }
    }

    fn interrupt(&self) -> Result<()> {
        let state = self.scheduler.state();
        if !state.is_open() {
            return Err(DatabaseError::NotOpen);
        }
        if state.is_closing() {
            return Err(DatabaseError::Closing);
        }
        if let Some(handle) = &self.interrupt {
            handle.interrupt();
        }
        Ok(())
    }

    fn emit(&self, event: Event) {
        debug!(connection = %self.id, event = event.name(), "notify");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
