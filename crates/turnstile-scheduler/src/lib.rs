//! `turnstile-scheduler`: the call queue and connection state machine that
//! decide when an operation may touch the engine.
//!
//! # Overview
//!
//! The [`Scheduler`] never runs anything itself. [`Scheduler::schedule`] answers
//! "run now, queue, or reject" for one new call, and [`Scheduler::process`]
//! hands back the calls that became runnable after a completion, an open, or
//! a mode change. The caller owns dispatch and must report every completion
//! back through [`Scheduler::complete`] (or [`Scheduler::finish_close`]).
//!
//! # Exclusivity
//!
//! | Running            | New exclusive call | New shared call |
//! |--------------------|--------------------|-----------------|
//! | nothing            | run                | run             |
//! | shared calls       | queue              | run*            |
//! | one exclusive call | queue              | queue           |
//!
//! \* unless older calls are still queued, in which case it queues behind them.
//!
//! Serialized mode makes every call exclusive.

pub mod scheduler;
pub mod types;

pub use scheduler::Scheduler;
pub use types::{Admission, ConnectionState, Drain, Status};
