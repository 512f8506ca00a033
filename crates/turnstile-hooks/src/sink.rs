//! Per-thread routing for the trace and profile callbacks.
//!
//! The engine binding only accepts plain function pointers for these two
//! hooks, so they cannot capture their relay. Instead the worker installs the
//! current connection's producers in thread-local slots for as long as it runs
//! an operation body; the callbacks, which fire synchronously on that same
//! thread, read them from there.

use std::cell::RefCell;
use std::time::Duration;

use turnstile_core::{ProfileEvent, TraceEvent};

use crate::relay::Producer;

#[derive(Default)]
struct Sinks {
    trace: Option<Producer<TraceEvent>>,
    profile: Option<Producer<ProfileEvent>>,
}

thread_local! {
    static SINKS: RefCell<Sinks> = RefCell::new(Sinks::default());
}

/// Guard returned by [`crate::HookSet::enter`]; clears the thread's sinks on drop.
pub struct SinkScope {
    _private: (),
}

impl SinkScope {
    pub(crate) fn install(
        trace: Option<Producer<TraceEvent>>,
        profile: Option<Producer<ProfileEvent>>,
    ) -> Self {
        SINKS.with(|sinks| *sinks.borrow_mut() = Sinks { trace, profile });
        SinkScope { _private: () }
    }
}

impl Drop for SinkScope {
    fn drop(&mut self) {
        SINKS.with(|sinks| *sinks.borrow_mut() = Sinks::default());
    }
}

/// Engine trace callback. Runs on the worker thread.
pub(crate) fn on_trace(sql: &str) {
    SINKS.with(|sinks| {
        if let Some(producer) = &sinks.borrow().trace {
            producer.send(TraceEvent { sql: sql.to_owned() });
        }
    });
}

/// Engine profile callback. Runs on the worker thread.
pub(crate) fn on_profile(sql: &str, elapsed: Duration) {
    SINKS.with(|sinks| {
        if let Some(producer) = &sinks.borrow().profile {
            producer.send(ProfileEvent { sql: sql.to_owned(), elapsed });
        }
    });
}
