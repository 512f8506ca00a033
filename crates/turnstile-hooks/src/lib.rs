//! `turnstile-hooks`: forwards engine hook callbacks (trace, profile, row
//! change) from whichever worker thread runs a statement to the connection's
//! owning task.
//!
//! The engine calls hooks synchronously, mid-statement, on a worker thread.
//! Nothing user-visible may run there, so every callback only captures its
//! payload and pushes it into a [`Relay`]. The relay's pump forwards each
//! payload, in order, into the owning task's inbox, where it becomes an
//! [`turnstile_core::Event`].

pub mod relay;
pub mod set;
pub mod sink;

pub use relay::{Producer, Relay};
pub use set::{HookKind, HookSet};
pub use sink::SinkScope;
