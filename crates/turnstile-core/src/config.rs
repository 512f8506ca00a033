use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use rusqlite::OpenFlags;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PATH: &str = ":memory:";
/// Busy timeout the engine gets right after open, before any configure call.
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 1000;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Top-level config (turnstile.toml + TURNSTILE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// How to open and prime one connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub mode: OpenMode,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,
    /// Start in serialized mode.
    #[serde(default)]
    pub serialize: bool,
    #[serde(default)]
    pub trace: bool,
    #[serde(default)]
    pub profile: bool,
    #[serde(default)]
    pub change: bool,
    #[serde(default)]
    pub limits: Vec<LimitConfig>,
    /// Notifications buffered per subscriber before slow receivers lag.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            mode: OpenMode::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            serialize: false,
            trace: false,
            profile: false,
            change: false,
            limits: Vec::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// One `(id, value)` engine limit, applied after open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub id: i32,
    pub value: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    #[default]
    ReadWriteCreate,
    ReadWrite,
    ReadOnly,
}

impl OpenMode {
    /// Engine open flags. Full-mutex is always on: the handle moves between
    /// worker threads.
    pub fn flags(self) -> OpenFlags {
        let access = match self {
            OpenMode::ReadWriteCreate => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
            OpenMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
        };
        access | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_FULL_MUTEX
    }
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}
fn default_busy_timeout_ms() -> u32 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl TurnstileConfig {
    /// Load config from a TOML file with TURNSTILE_* env var overrides.
    ///
    /// Nested keys use a double underscore:
    /// `TURNSTILE_DATABASE__BUSY_TIMEOUT_MS=5000`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("turnstile.toml");

        let config: TurnstileConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TURNSTILE_").split("__"))
            .extract()
            .map_err(|e| crate::error::DatabaseError::Config(e.to_string()))?;

        tracing::debug!(path, db = %config.database.path, "configuration loaded");
        Ok(config)
    }
}
