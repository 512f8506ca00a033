//! Blocking execution of operation bodies.
//!
//! Every body runs on a `spawn_blocking` thread with the engine locked for
//! its whole duration. The result goes back to the connection task as a
//! [`Signal`]. A panicking body is answered through its own completion; a
//! panic anywhere else around it still reports back so the in-flight count
//! stays balanced.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::OpenFlags;
use tokio::sync::mpsc;
use tracing::error;
use turnstile_core::DatabaseError;

use crate::actor::Signal;
use crate::call::{Call, Callback};
use crate::engine::Engine;

fn lock(engine: &Mutex<Engine>) -> MutexGuard<'_, Engine> {
    // A body that panicked mid-run leaves the engine itself usable.
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn submit(engine: Arc<Mutex<Engine>>, call: Call, outlet: mpsc::UnboundedSender<Signal>) {
    let kind = call.kind();
    let label = call.label();
    tokio::task::spawn_blocking(move || {
        let ran = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut engine = lock(&engine);
            let _sinks = engine.enter();
            call.run(&mut engine)
        }));
        let signal = match ran {
            Ok(outcome) => Signal::Completed { kind, outcome },
            Err(_) => {
                error!(op = label, "operation body panicked");
                Signal::Panicked { kind, label }
            }
        };
        // The connection task only goes away once nothing is in flight.
        let _ = outlet.send(signal);
    });
}

pub(crate) fn open(
    engine: Arc<Mutex<Engine>>,
    path: String,
    flags: OpenFlags,
    done: Option<Callback<()>>,
    outlet: mpsc::UnboundedSender<Signal>,
) {
    tokio::task::spawn_blocking(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(|| lock(&engine).open(&path, flags)))
            .unwrap_or_else(|_| {
                error!(path = %path, "open panicked");
                Err(DatabaseError::internal("open panicked"))
            });
        let _ = outlet.send(Signal::Opened { result, done });
    });
}
