use rusqlite::ffi;
use thiserror::Error;

/// Message used when a call is rejected at admission on a dead connection.
pub const CLOSED_MESSAGE: &str = "Database is closed";
/// Message used when queued calls are flushed after the connection died.
pub const HANDLE_CLOSED_MESSAGE: &str = "Database handle is closed";

/// Every failure a connection can report to its callers.
///
/// `Clone` because errors travel inside broadcast notifications as well as
/// through completion callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatabaseError {
    /// Misuse: the connection already reached its terminal state.
    #[error("{message}")]
    Closed { message: String },

    /// Interrupt requested before the connection opened (or after it closed).
    #[error("Database is not open")]
    NotOpen,

    /// Interrupt requested while a close is in flight.
    #[error("Database is closing")]
    Closing,

    /// `configure` called with a name it does not recognise.
    #[error("{option} is not a valid configuration option")]
    InvalidOption { option: String },

    /// A recognised option with a missing or out-of-range argument.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// The engine returned a non-OK status. `offset` is the byte position in
    /// the submitted SQL the engine blamed, when it named one.
    #[error("SQLITE error {code}: {message}")]
    Engine { code: i32, message: String, offset: Option<i32> },

    #[error("Configuration error: {0}")]
    Config(String),

    /// The connection task is gone; nothing will answer this request.
    #[error("connection task has shut down")]
    Shutdown,
}

impl DatabaseError {
    pub fn closed() -> Self {
        Self::Closed { message: CLOSED_MESSAGE.to_string() }
    }

    pub fn handle_closed() -> Self {
        Self::Closed { message: HANDLE_CLOSED_MESSAGE.to_string() }
    }

    /// Engine-level failure that did not come from the engine (a panicking body).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Engine { code: ffi::SQLITE_INTERNAL, message: message.into(), offset: None }
    }

    /// Byte offset into the submitted SQL, for engine errors that carry one.
    pub fn offset(&self) -> Option<i32> {
        match self {
            DatabaseError::Engine { offset, .. } => *offset,
            _ => None,
        }
    }

    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            DatabaseError::Closed { .. } => "SQLITE_MISUSE",
            DatabaseError::NotOpen => "NOT_OPEN",
            DatabaseError::Closing => "CLOSING",
            DatabaseError::InvalidOption { .. } => "INVALID_OPTION",
            DatabaseError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            DatabaseError::Engine { code, .. } => engine_code_name(*code),
            DatabaseError::Config(_) => "CONFIG_ERROR",
            DatabaseError::Shutdown => "SHUTDOWN",
        }
    }

    /// Numeric engine status, when the error maps onto one.
    pub fn status(&self) -> Option<i32> {
        match self {
            DatabaseError::Closed { .. } => Some(ffi::SQLITE_MISUSE),
            DatabaseError::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message) => DatabaseError::Engine {
                code: failure.extended_code,
                message: message.unwrap_or_else(|| failure.to_string()),
                offset: None,
            },
            rusqlite::Error::SqlInputError { error, msg, offset, .. } => DatabaseError::Engine {
                code: error.extended_code,
                message: msg,
                offset: Some(offset),
            },
            other => DatabaseError::Engine {
                code: ffi::SQLITE_ERROR,
                message: other.to_string(),
                offset: None,
            },
        }
    }
}

/// Primary result code name; extended codes are reduced to their low byte.
fn engine_code_name(code: i32) -> &'static str {
    match code & 0xff {
        ffi::SQLITE_ERROR => "SQLITE_ERROR",
        ffi::SQLITE_INTERNAL => "SQLITE_INTERNAL",
        ffi::SQLITE_PERM => "SQLITE_PERM",
        ffi::SQLITE_ABORT => "SQLITE_ABORT",
        ffi::SQLITE_BUSY => "SQLITE_BUSY",
        ffi::SQLITE_LOCKED => "SQLITE_LOCKED",
        ffi::SQLITE_NOMEM => "SQLITE_NOMEM",
        ffi::SQLITE_READONLY => "SQLITE_READONLY",
        ffi::SQLITE_INTERRUPT => "SQLITE_INTERRUPT",
        ffi::SQLITE_IOERR => "SQLITE_IOERR",
        ffi::SQLITE_CORRUPT => "SQLITE_CORRUPT",
        ffi::SQLITE_NOTFOUND => "SQLITE_NOTFOUND",
        ffi::SQLITE_FULL => "SQLITE_FULL",
        ffi::SQLITE_CANTOPEN => "SQLITE_CANTOPEN",
        ffi::SQLITE_PROTOCOL => "SQLITE_PROTOCOL",
        ffi::SQLITE_SCHEMA => "SQLITE_SCHEMA",
        ffi::SQLITE_TOOBIG => "SQLITE_TOOBIG",
        ffi::SQLITE_CONSTRAINT => "SQLITE_CONSTRAINT",
        ffi::SQLITE_MISMATCH => "SQLITE_MISMATCH",
        ffi::SQLITE_MISUSE => "SQLITE_MISUSE",
        ffi::SQLITE_AUTH => "SQLITE_AUTH",
        ffi::SQLITE_RANGE => "SQLITE_RANGE",
        ffi::SQLITE_NOTADB => "SQLITE_NOTADB",
        _ => "SQLITE_UNKNOWN",
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
