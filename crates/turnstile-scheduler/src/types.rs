use serde::Serialize;

/// Lifecycle of the single engine connection, as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// Open has not completed yet; every call queues.
    Opening,
    /// Open with nothing in flight.
    Idle,
    /// Open with at least one call in flight. `exclusive` is true while the
    /// single running call holds the connection alone.
    Busy { exclusive: bool },
    /// A close is in flight; calls queue until it settles.
    Closing,
    /// Terminal. Never reopens; every call is rejected or flushed.
    Closed,
}

impl ConnectionState {
    /// True while the engine handle is live (including mid-close).
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ConnectionState::Idle | ConnectionState::Busy { .. } | ConnectionState::Closing
        )
    }

    /// True while some call holds exclusive access, and forever after close.
    pub fn is_locked(&self) -> bool {
        matches!(
            self,
            ConnectionState::Busy { exclusive: true }
                | ConnectionState::Closing
                | ConnectionState::Closed
        )
    }

    pub fn is_closing(&self) -> bool {
        matches!(self, ConnectionState::Closing)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Opening => "opening",
            ConnectionState::Idle => "idle",
            ConnectionState::Busy { exclusive: true } => "busy(exclusive)",
            ConnectionState::Busy { exclusive: false } => "busy",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Verdict for one newly scheduled call.
#[derive(Debug)]
pub enum Admission<C> {
    /// Dispatch now. `pending` already counts it.
    Run(C),
    /// Held in the queue until a later [`crate::Scheduler::process`].
    Queued,
    /// The connection is closed for good; fail the call.
    Rejected(C),
}

/// What a [`crate::Scheduler::process`] pass produced.
#[derive(Debug)]
pub enum Drain<C> {
    /// Nothing eligible.
    Nothing,
    /// Dispatch these, in order. `pending` already counts them.
    Dispatch(Vec<C>),
    /// The connection is dead; fail all of these.
    Flush(Vec<C>),
}

impl<C> Drain<C> {
    pub fn is_nothing(&self) -> bool {
        matches!(self, Drain::Nothing)
    }
}

/// Point-in-time view of the scheduler, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    pub state: ConnectionState,
    pub pending: usize,
    pub queued: usize,
    pub serialize: bool,
}
