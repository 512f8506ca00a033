use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::DatabaseError;

/// Identifies one connection in logs (UUIDv7, so ids sort by creation time).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A statement the engine is about to run, as reported by the trace hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub sql: String,
}

/// A finished statement and its wall-clock cost, from the profile hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileEvent {
    pub sql: String,
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl ProfileEvent {
    /// Elapsed time in fractional milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_nanos() as f64 / 1_000_000.0
    }
}

fn as_millis<S: Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(elapsed.as_nanos() as f64 / 1_000_000.0)
}

/// Kind of row change reported by the change hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Unknown,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
            ChangeKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub database: String,
    pub table: String,
    pub rowid: i64,
}

/// Asynchronous notification emitted by a connection on its owning task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Open,
    Close,
    /// A failure nobody supplied a completion for.
    Error {
        #[serde(serialize_with = "error_text")]
        error: DatabaseError,
    },
    Trace(TraceEvent),
    Profile(ProfileEvent),
    Change(ChangeEvent),
}

fn error_text<S: Serializer>(error: &DatabaseError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&error.to_string())
}

impl Event {
    pub fn error(error: DatabaseError) -> Self {
        Event::Error { error }
    }

    /// The notification name listeners historically subscribed to.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Open => "open",
            Event::Close => "close",
            Event::Error { .. } => "error",
            Event::Trace(_) => "trace",
            Event::Profile(_) => "profile",
            Event::Change(_) => "change",
        }
    }
}

impl From<TraceEvent> for Event {
    fn from(ev: TraceEvent) -> Self {
        Event::Trace(ev)
    }
}

impl From<ProfileEvent> for Event {
    fn from(ev: ProfileEvent) -> Self {
        Event::Profile(ev)
    }
}

impl From<ChangeEvent> for Event {
    fn from(ev: ChangeEvent) -> Self {
        Event::Change(ev)
    }
}
