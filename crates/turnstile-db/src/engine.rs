use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, InterruptHandle, LoadExtensionGuard, OpenFlags};
use tracing::{debug, warn};
use turnstile_core::config::DEFAULT_BUSY_TIMEOUT_MS;
use turnstile_core::{DatabaseError, Result};
use turnstile_hooks::{HookKind, HookSet, SinkScope};

use crate::actor::Signal;
use crate::options::{self, ConfigureOption};

/// The engine handle and its hook relays. Only ever touched by the worker
/// that holds the lock around it.
pub(crate) struct Engine {
    conn: Option<Connection>,
    hooks: HookSet<Signal>,
}

impl Engine {
    pub(crate) fn new(hooks: HookSet<Signal>) -> Self {
        Self { conn: None, hooks }
    }

    /// The live connection, or `NotOpen` before open and after close.
    pub(crate) fn connection(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or(DatabaseError::NotOpen)
    }

    /// Route trace/profile callbacks on this thread for the current body.
    pub(crate) fn enter(&self) -> SinkScope {
        self.hooks.enter()
    }

    pub(crate) fn open(&mut self, path: &str, flags: OpenFlags) -> Result<InterruptHandle> {
        let conn = Connection::open_with_flags(path, flags)?;
        conn.busy_timeout(Duration::from_millis(u64::from(DEFAULT_BUSY_TIMEOUT_MS)))?;
        let interrupt = conn.get_interrupt_handle();
        self.conn = Some(conn);
        Ok(interrupt)
    }

    pub(crate) fn exec(&mut self, sql: &str) -> Result<()> {
        self.connection()?.execute_batch(sql)?;
        Ok(())
    }

    /// Extension loading is switched on only for the duration of this call.
    pub(crate) fn load_extension(&mut self, path: &Path) -> Result<()> {
        let conn: &Connection = self.connection()?;
        // Safety: the library at `path` is chosen by the caller, who takes
        // responsibility for trusting it. The guard turns loading back off
        // before this block returns.
        unsafe {
            let _guard = LoadExtensionGuard::new(conn)?;
            conn.load_extension(path, None::<&str>)?;
        }
        debug!(path = %path.display(), "extension loaded");
        Ok(())
    }

    pub(crate) fn configure(&mut self, option: ConfigureOption) -> Result<()> {
        let Engine { conn, hooks } = self;
        let conn = conn.as_mut().ok_or(DatabaseError::NotOpen)?;
        match option {
            ConfigureOption::Trace => {
                hooks.toggle(HookKind::Trace, conn);
            }
            ConfigureOption::Profile => {
                hooks.toggle(HookKind::Profile, conn);
            }
            ConfigureOption::Change => {
                hooks.toggle(HookKind::Change, conn);
            }
            ConfigureOption::BusyTimeout(ms) => conn.busy_timeout(options::busy_timeout(ms))?,
            ConfigureOption::Limit { id, value } => {
                let limit = options::engine_limit(id)?;
                // The previous value is of no interest.
                let _ = conn.set_limit(limit, value);
            }
        }
        Ok(())
    }

    /// Detach every hook, then close the engine handle. On failure the handle
    /// stays live so a later close can retry.
    pub(crate) fn close(&mut self) -> Result<()> {
        let Engine { conn, hooks } = self;
        let mut live = conn.take().ok_or(DatabaseError::NotOpen)?;
        hooks.finish_all(&mut live);
        match live.close() {
            Ok(()) => Ok(()),
            Err((live, e)) => {
                warn!("engine refused to close: {e}");
                *conn = Some(live);
                Err(e.into())
            }
        }
    }
}
