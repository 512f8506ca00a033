//! One scheduled operation: a blocking body plus its optional completion,
//! moved as a single owned value from the caller to the actor, into a
//! worker, and back.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;
use turnstile_core::{DatabaseError, Result};

use crate::engine::Engine;

/// Completion callback. Runs on the connection task, never on a worker.
pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// Close gets its own kind: its completion drives the lifecycle, not just
/// the in-flight count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallKind {
    Operation,
    Close,
}

/// What became of a result once it was handed back.
#[derive(Debug)]
pub(crate) enum Delivery {
    /// A completion callback consumed it.
    Callback,
    /// Succeeded with nobody listening.
    Silent,
    /// Failed with nobody listening; the caller must surface it.
    Unhandled(DatabaseError),
}

pub(crate) fn deliver<T>(result: Result<T>, done: Option<Callback<T>>) -> Delivery {
    match (done, result) {
        (Some(done), result) => {
            done(result);
            Delivery::Callback
        }
        (None, Ok(_)) => Delivery::Silent,
        (None, Err(e)) => Delivery::Unhandled(e),
    }
}

/// Type-erased body + completion.
trait Task: Send {
    fn run(self: Box<Self>, engine: &mut Engine) -> Box<dyn Settle>;
    fn reject(self: Box<Self>, error: DatabaseError) -> Delivery;
}

/// A finished body waiting to be delivered on the connection task.
pub(crate) trait Settle: Send {
    fn succeeded(&self) -> bool;
    fn deliver(self: Box<Self>) -> Delivery;
}

struct Job<T, F> {
    body: F,
    done: Option<Callback<T>>,
}

impl<T, F> Task for Job<T, F>
where
    T: Send + 'static,
    F: FnOnce(&mut Engine) -> Result<T> + Send + 'static,
{
    fn run(self: Box<Self>, engine: &mut Engine) -> Box<dyn Settle> {
        let Job { body, done } = *self;
        // Only the body unwinds; the completion must still be answered.
        let result = panic::catch_unwind(AssertUnwindSafe(|| body(engine))).unwrap_or_else(|payload| {
            let reason = panic_message(payload.as_ref());
            error!(reason = %reason, "operation body panicked");
            Err(DatabaseError::internal(format!("operation panicked: {reason}")))
        });
        Box::new(Outcome { result, done })
    }

    fn reject(self: Box<Self>, error: DatabaseError) -> Delivery {
        deliver(Err(error), self.done)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct Outcome<T> {
    result: Result<T>,
    done: Option<Callback<T>>,
}

impl<T: Send + 'static> Settle for Outcome<T> {
    fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    fn deliver(self: Box<Self>) -> Delivery {
        let Outcome { result, done } = *self;
        deliver(result, done)
    }
}

pub(crate) struct Call {
    kind: CallKind,
    label: &'static str,
    task: Box<dyn Task>,
}

impl Call {
    pub(crate) fn new<T, F>(
        kind: CallKind,
        label: &'static str,
        body: F,
        done: Option<Callback<T>>,
    ) -> Self
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine) -> Result<T> + Send + 'static,
    {
        Self { kind, label, task: Box::new(Job { body, done }) }
    }

    pub(crate) fn kind(&self) -> CallKind {
        self.kind
    }

    pub(crate) fn label(&self) -> &'static str {
        self.label
    }

    /// Run the body. Worker side.
    pub(crate) fn run(self, engine: &mut Engine) -> Box<dyn Settle> {
        self.task.run(engine)
    }

    /// Fail the call without running it.
    pub(crate) fn reject(self, error: DatabaseError) -> Delivery {
        self.task.reject(error)
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call").field("kind", &self.kind).field("label", &self.label).finish()
    }
}
