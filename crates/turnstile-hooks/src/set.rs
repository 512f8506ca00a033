use rusqlite::hooks::Action;
use rusqlite::Connection;
use tokio::sync::mpsc;
use tracing::info;
use turnstile_core::{ChangeEvent, ChangeKind, ProfileEvent, TraceEvent};

use crate::relay::Relay;
use crate::sink::{self, SinkScope};

/// Which engine hook a toggle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Trace,
    Profile,
    Change,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HookKind::Trace => "trace",
            HookKind::Profile => "profile",
            HookKind::Change => "change",
        };
        write!(f, "{s}")
    }
}

/// The hook relays of one connection. Lives next to the engine handle and is
/// only touched by the worker that currently holds it.
pub struct HookSet<M> {
    outlet: mpsc::UnboundedSender<M>,
    trace: Option<Relay<TraceEvent>>,
    profile: Option<Relay<ProfileEvent>>,
    change: Option<Relay<ChangeEvent>>,
}

impl<M> HookSet<M>
where
    M: From<TraceEvent> + From<ProfileEvent> + From<ChangeEvent> + Send + 'static,
{
    /// `outlet` is the owning task's inbox.
    pub fn new(outlet: mpsc::UnboundedSender<M>) -> Self {
        Self { outlet, trace: None, profile: None, change: None }
    }

    pub fn is_active(&self, kind: HookKind) -> bool {
        match kind {
            HookKind::Trace => self.trace.is_some(),
            HookKind::Profile => self.profile.is_some(),
            HookKind::Change => self.change.is_some(),
        }
    }

    /// Route this thread's trace/profile callbacks to the active relays until
    /// the returned guard drops.
    pub fn enter(&self) -> SinkScope {
        SinkScope::install(
            self.trace.as_ref().map(Relay::producer),
            self.profile.as_ref().map(Relay::producer),
        )
    }

    /// Register the hook if it is off, unregister it if it is on. Returns
    /// whether the hook is active afterwards.
    pub fn toggle(&mut self, kind: HookKind, conn: &mut Connection) -> bool {
        let active = match kind {
            HookKind::Trace => self.toggle_trace(conn),
            HookKind::Profile => self.toggle_profile(conn),
            HookKind::Change => self.toggle_change(conn),
        };
        info!(hook = %kind, active, "hook toggled");
        active
    }

    /// Detach every hook and drain its relay. Used before closing.
    pub fn finish_all(&mut self, conn: &mut Connection) {
        if let Some(relay) = self.trace.take() {
            conn.trace(None);
            relay.finish();
        }
        if let Some(relay) = self.profile.take() {
            conn.profile(None);
            relay.finish();
        }
        if let Some(relay) = self.change.take() {
            conn.update_hook(None::<fn(Action, &str, &str, i64)>);
            relay.finish();
        }
    }

    fn toggle_trace(&mut self, conn: &mut Connection) -> bool {
        match self.trace.take() {
            None => {
                self.trace = Some(Relay::spawn(self.outlet.clone()));
                conn.trace(Some(sink::on_trace));
                true
            }
            Some(relay) => {
                conn.trace(None);
                relay.finish();
                false
            }
        }
    }

    fn toggle_profile(&mut self, conn: &mut Connection) -> bool {
        match self.profile.take() {
            None => {
                self.profile = Some(Relay::spawn(self.outlet.clone()));
                conn.profile(Some(sink::on_profile));
                true
            }
            Some(relay) => {
                conn.profile(None);
                relay.finish();
                false
            }
        }
    }

    fn toggle_change(&mut self, conn: &mut Connection) -> bool {
        match self.change.take() {
            None => {
                let relay = Relay::spawn(self.outlet.clone());
                let producer = relay.producer();
                conn.update_hook(Some(
                    move |action: Action, database: &str, table: &str, rowid: i64| {
                        producer.send(ChangeEvent {
                            kind: change_kind(action),
                            database: database.to_owned(),
                            table: table.to_owned(),
                            rowid,
                        });
                    },
                ));
                self.change = Some(relay);
                true
            }
            Some(relay) => {
                conn.update_hook(None::<fn(Action, &str, &str, i64)>);
                relay.finish();
                false
            }
        }
    }
}

fn change_kind(action: Action) -> ChangeKind {
    match action {
        Action::SQLITE_INSERT => ChangeKind::Insert,
        Action::SQLITE_UPDATE => ChangeKind::Update,
        Action::SQLITE_DELETE => ChangeKind::Delete,
        _ => ChangeKind::Unknown,
    }
}
