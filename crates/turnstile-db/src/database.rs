use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use rusqlite::{Connection, OpenFlags};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;
use turnstile_core::{ConnectionId, DatabaseConfig, DatabaseError, Event, Result};
use turnstile_scheduler::Status;

use crate::actor::{Command, ConnectionActor};
use crate::call::{Call, CallKind, Callback};
use crate::mode::{ModeChange, ScopeId};
use crate::options::{self, ConfigureOption};

/// Resolves with the result of one operation.
///
/// Dropping it does not cancel the operation; it still runs in its turn.
#[must_use = "the operation runs regardless; await the reply to observe its result"]
pub struct Reply<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for Reply<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DatabaseError::Shutdown)))
    }
}

fn reply<T: Send + 'static>() -> (Callback<T>, Reply<T>) {
    let (tx, rx) = oneshot::channel();
    let done: Callback<T> = Box::new(move |result| {
        let _ = tx.send(result);
    });
    (done, Reply { rx })
}

/// An operation submitted through [`Database::post`], without a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Exec { sql: String },
    Wait,
    LoadExtension { path: PathBuf },
    Configure(ConfigureOption),
    Close,
}

impl Request {
    /// Everything but configuration runs alone on the connection.
    pub fn is_exclusive(&self) -> bool {
        !matches!(self, Request::Configure(_))
    }

    fn into_command(self, done: Option<Callback<()>>) -> Command {
        let exclusive = self.is_exclusive();
        let call = match self {
            Request::Exec { sql } => {
                Call::new(CallKind::Operation, "exec", move |engine| engine.exec(&sql), done)
            }
            Request::Wait => Call::new(CallKind::Operation, "wait", |_| Ok(()), done),
            Request::LoadExtension { path } => Call::new(
                CallKind::Operation,
                "load_extension",
                move |engine| engine.load_extension(&path),
                done,
            ),
            Request::Configure(option) => {
                let call = Call::new(
                    CallKind::Operation,
                    option.name(),
                    move |engine| engine.configure(option),
                    done,
                );
                return Command::Configure { call };
            }
            Request::Close => Call::new(CallKind::Close, "close", |engine| engine.close(), done),
        };
        Command::Schedule { call, exclusive }
    }
}

struct Shared {
    id: ConnectionId,
    filename: String,
    flags: OpenFlags,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<Event>,
    /// Subscribed before the task started, so the first subscriber also sees
    /// notifications emitted before it asked.
    first_events: Mutex<Option<broadcast::Receiver<Event>>>,
    open: Arc<AtomicBool>,
    next_scope: AtomicU64,
}

/// Handle to one scheduled database connection.
///
/// Cheap to clone; every clone drives the same connection. The connection
/// task exits once all handles are dropped and its queue has drained.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Shared>,
}

impl Database {
    /// Start opening `path` and return immediately. Operations issued before
    /// the open finishes wait for it in arrival order.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(path: impl Into<String>, flags: OpenFlags, done: Option<Callback<()>>) -> Self {
        Self::spawn(path.into(), flags, turnstile_core::config::DEFAULT_EVENT_CAPACITY, done)
    }

    /// Open and wait for the outcome.
    pub async fn connect(path: impl Into<String>, flags: OpenFlags) -> Result<Self> {
        let (done, opened) = reply();
        let db = Self::open(path, flags, Some(done));
        opened.await?;
        Ok(db)
    }

    /// Open as described by `config`, then queue the configured busy
    /// timeout, limits, hooks and mode behind the open.
    pub fn open_with_config(config: &DatabaseConfig, done: Option<Callback<()>>) -> Result<Self> {
        for limit in &config.limits {
            options::engine_limit(limit.id)?;
        }
        let db = Self::spawn(config.path.clone(), config.mode.flags(), config.event_capacity, done);

        if config.busy_timeout_ms != turnstile_core::config::DEFAULT_BUSY_TIMEOUT_MS {
            let ms = i32::try_from(config.busy_timeout_ms).unwrap_or(i32::MAX);
            db.post(Request::Configure(ConfigureOption::BusyTimeout(ms)));
        }
        for limit in &config.limits {
            db.post(Request::Configure(ConfigureOption::Limit { id: limit.id, value: limit.value }));
        }
        let hooks = [
            (config.trace, ConfigureOption::Trace),
            (config.profile, ConfigureOption::Profile),
            (config.change, ConfigureOption::Change),
        ];
        for (enabled, option) in hooks {
            if enabled {
                db.post(Request::Configure(option));
            }
        }
        if config.serialize {
            db.serialize();
        }
        Ok(db)
    }

    fn spawn(path: String, flags: OpenFlags, capacity: usize, done: Option<Callback<()>>) -> Self {
        let id = ConnectionId::new();
        let (commands, inbox) = mpsc::unbounded_channel();
        let (events, first_events) = broadcast::channel(capacity.max(1));
        let open = Arc::new(AtomicBool::new(false));

        let actor = ConnectionActor::new(id.clone(), inbox, events.clone(), Arc::clone(&open));
        tokio::spawn(actor.run(path.clone(), flags, done));

        Self {
            inner: Arc::new(Shared {
                id,
                filename: path,
                flags,
                commands,
                events,
                first_events: Mutex::new(Some(first_events)),
                open,
                next_scope: AtomicU64::new(0),
            }),
        }
    }

    fn send(&self, command: Command) {
        if self.inner.commands.send(command).is_err() {
            // Dropping the command drops its completion, which answers with `Shutdown`.
            warn!(connection = %self.inner.id, "connection task is gone");
        }
    }

    fn call(&self, request: Request) -> Reply<()> {
        let (done, reply) = reply();
        self.send(request.into_command(Some(done)));
        reply
    }

    /// Submit without a completion. A failure is reported as
    /// [`Event::Error`] to subscribers instead.
    pub fn post(&self, request: Request) {
        self.send(request.into_command(None));
    }

    /// Run one or more `;`-separated statements.
    pub fn exec(&self, sql: impl Into<String>) -> Reply<()> {
        self.call(Request::Exec { sql: sql.into() })
    }

    /// Resolves once everything scheduled before it has finished.
    pub fn wait(&self) -> Reply<()> {
        self.call(Request::Wait)
    }

    pub fn load_extension(&self, path: impl Into<PathBuf>) -> Reply<()> {
        self.call(Request::LoadExtension { path: path.into() })
    }

    pub fn configure(&self, option: ConfigureOption) -> Reply<()> {
        self.call(Request::Configure(option))
    }

    /// Close once everything ahead of it has finished. Anything scheduled
    /// afterwards fails with [`DatabaseError::Closed`].
    pub fn close(&self) -> Reply<()> {
        self.call(Request::Close)
    }

    /// Schedule an arbitrary body against the live connection.
    ///
    /// The engine stays locked for the whole body, so shared bodies take
    /// turns on it rather than overlapping. A body must never wait on
    /// another body of the same connection; that wait cannot end. A body
    /// that panics fails with an `SQLITE_INTERNAL` engine error.
    pub fn schedule<T, F>(&self, exclusive: bool, body: F, done: Option<Callback<T>>)
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let call = Call::new(
            CallKind::Operation,
            "statement",
            move |engine| body(engine.connection()?),
            done,
        );
        self.send(Command::Schedule { call, exclusive });
    }

    /// [`Database::schedule`] with the result delivered through a [`Reply`].
    /// The same locking applies: never block a body on another one.
    pub fn run<T, F>(&self, exclusive: bool, body: F) -> Reply<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let (done, reply) = reply();
        self.schedule(exclusive, body, Some(done));
        reply
    }

    /// Every call scheduled from now on runs alone.
    pub fn serialize(&self) {
        self.send(Command::Mode(ModeChange::Set { serialize: true }));
    }

    /// Calls scheduled from now on may share the connection again.
    pub fn parallelize(&self) {
        self.send(Command::Mode(ModeChange::Set { serialize: false }));
    }

    /// Serialize only the calls scheduled inside `f`; the previous mode comes
    /// back afterwards, even if `f` panics.
    pub fn serialize_scoped<R>(&self, f: impl FnOnce(&Database) -> R) -> R {
        self.scoped(true, f)
    }

    /// Counterpart of [`Database::serialize_scoped`].
    pub fn parallelize_scoped<R>(&self, f: impl FnOnce(&Database) -> R) -> R {
        self.scoped(false, f)
    }

    fn scoped<R>(&self, serialize: bool, f: impl FnOnce(&Database) -> R) -> R {
        let scope = self.inner.next_scope.fetch_add(1, Ordering::Relaxed);
        self.send(Command::Mode(ModeChange::Enter { scope, serialize }));
        let _scope = ModeScope { db: self, scope };
        f(self)
    }

    /// Abort whatever statement the engine is running. The operation itself
    /// still completes (with an interrupt error) and is accounted normally.
    pub fn interrupt(&self) -> Reply<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Interrupt(tx));
        Reply { rx }
    }

    /// Scheduler snapshot.
    pub fn status(&self) -> Reply<Status> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Status(tx));
        Reply { rx }
    }

    /// Receive notifications. The first call also gets everything emitted
    /// since the connection was created.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        let first = self
            .inner
            .first_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        first.unwrap_or_else(|| self.inner.events.subscribe())
    }

    /// True between a successful open and a successful close.
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    pub fn filename(&self) -> &str {
        &self.inner.filename
    }

    pub fn flags(&self) -> OpenFlags {
        self.inner.flags
    }

    pub fn id(&self) -> &ConnectionId {
        &self.inner.id
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("id", &self.inner.id)
            .field("filename", &self.inner.filename)
            .field("open", &self.is_open())
            .finish()
    }
}

struct ModeScope<'a> {
    db: &'a Database,
    scope: ScopeId,
}

impl Drop for ModeScope<'_> {
    fn drop(&mut self) {
        self.db.send(Command::Mode(ModeChange::Leave { scope: self.scope }));
    }
}
