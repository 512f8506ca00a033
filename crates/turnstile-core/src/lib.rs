//! `turnstile-core`: shared vocabulary for the turnstile workspace, namely the
//! error type, notification payloads, and configuration loading.

pub mod config;
pub mod error;
pub mod types;

pub use config::{DatabaseConfig, LimitConfig, OpenMode, TurnstileConfig};
pub use error::{DatabaseError, Result};
pub use types::{ChangeEvent, ChangeKind, ConnectionId, Event, ProfileEvent, TraceEvent};
