use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::types::{Admission, ConnectionState, Drain, Status};

/// A queued call plus the exclusivity it was admitted with.
struct Queued<C> {
    call: C,
    exclusive: bool,
}

/// Call queue and connection state for one engine connection.
///
/// Not thread-safe and not meant to be: it lives on the connection's owning
/// task, which is the only place state is read or mutated.
pub struct Scheduler<C> {
    state: ConnectionState,
    /// Dispatched calls whose completion has not been reported yet.
    pending: usize,
    /// Session-wide: every call is treated as exclusive.
    serialize: bool,
    queue: VecDeque<Queued<C>>,
}

impl<C> Scheduler<C> {
    /// A scheduler for a connection whose open is still in flight.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Opening,
            pending: 0,
            serialize: false,
            queue: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_serialized(&self) -> bool {
        self.serialize
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.state,
            pending: self.pending,
            queued: self.queue.len(),
            serialize: self.serialize,
        }
    }

    /// Decide whether `call` runs now, waits, or fails.
    pub fn schedule(&mut self, call: C, exclusive: bool) -> Admission<C> {
        let exclusive = exclusive || self.serialize;

        let run_now = match self.state {
            ConnectionState::Closed => {
                warn!("call rejected: connection is closed");
                return Admission::Rejected(call);
            }
            ConnectionState::Opening | ConnectionState::Closing => false,
            // Older work still waiting: never overtake it.
            _ if !self.queue.is_empty() => false,
            ConnectionState::Idle => true,
            ConnectionState::Busy { exclusive: running } => !running && !exclusive,
        };

        if run_now {
            self.start(exclusive);
            debug!(exclusive, pending = self.pending, "call dispatched immediately");
            Admission::Run(call)
        } else {
            self.queue.push_back(Queued { call, exclusive });
            debug!(
                exclusive,
                state = %self.state,
                queued = self.queue.len(),
                "call queued"
            );
            Admission::Queued
        }
    }

    /// Release whatever the current state allows. Calling it with nothing
    /// eligible is a no-op.
    pub fn process(&mut self) -> Drain<C> {
        if self.state == ConnectionState::Closed {
            if self.queue.is_empty() {
                return Drain::Nothing;
            }
            let flushed: Vec<C> = self.queue.drain(..).map(|q| q.call).collect();
            warn!(count = flushed.len(), "flushing queued calls on closed connection");
            return Drain::Flush(flushed);
        }

        if !matches!(self.state, ConnectionState::Idle | ConnectionState::Busy { .. }) {
            return Drain::Nothing;
        }

        let mut ready = Vec::new();
        while let Some(head) = self.queue.front() {
            if self.state == (ConnectionState::Busy { exclusive: true }) {
                break;
            }
            // An exclusive call waits until nothing else is in flight.
            if head.exclusive && self.pending > 0 {
                break;
            }
            let Some(Queued { call, exclusive }) = self.queue.pop_front() else {
                break;
            };
            self.start(exclusive);
            ready.push(call);
            if exclusive {
                break;
            }
        }

        if ready.is_empty() {
            Drain::Nothing
        } else {
            debug!(
                count = ready.len(),
                pending = self.pending,
                queued = self.queue.len(),
                "queued calls released"
            );
            Drain::Dispatch(ready)
        }
    }

    /// Report that one dispatched call finished.
    pub fn complete(&mut self) {
        if self.pending == 0 {
            warn!(state = %self.state, "completion reported with nothing in flight");
            return;
        }
        self.pending -= 1;
        if self.pending == 0 && matches!(self.state, ConnectionState::Busy { .. }) {
            self.state = ConnectionState::Idle;
        }
    }

    /// The engine handle is live.
    pub fn opened(&mut self) {
        debug_assert_eq!(self.state, ConnectionState::Opening);
        self.state = ConnectionState::Idle;
    }

    /// Open failed: the connection will never become usable.
    pub fn open_failed(&mut self) {
        debug_assert_eq!(self.state, ConnectionState::Opening);
        self.state = ConnectionState::Closed;
    }

    /// Enter `Closing`. Called right after the close call was dispatched.
    ///
    /// # Panics
    ///
    /// If the close call is not the only call in flight, holding exclusive
    /// access. That means the exclusivity protocol was already broken.
    pub fn begin_close(&mut self) {
        assert_eq!(
            self.state,
            ConnectionState::Busy { exclusive: true },
            "close dispatched without exclusive access"
        );
        assert_eq!(self.pending, 1, "close dispatched while other calls are in flight");
        self.state = ConnectionState::Closing;
    }

    /// Settle an in-flight close. On failure the connection stays usable.
    pub fn finish_close(&mut self, closed: bool) {
        debug_assert_eq!(self.state, ConnectionState::Closing);
        self.pending = self.pending.saturating_sub(1);
        self.state = if closed {
            ConnectionState::Closed
        } else {
            ConnectionState::Idle
        };
    }

    /// Set the serialize flag, returning its previous value.
    pub fn set_serialize(&mut self, serialize: bool) -> bool {
        std::mem::replace(&mut self.serialize, serialize)
    }

    fn start(&mut self, exclusive: bool) {
        self.pending += 1;
        self.state = ConnectionState::Busy { exclusive };
    }
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
