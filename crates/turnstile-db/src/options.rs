use std::time::Duration;

use rusqlite::limits::Limit;
use turnstile_core::{DatabaseError, Result};

/// One connection setting, applied through the scheduler like any other
/// operation so it never races a running statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureOption {
    /// Toggle the trace hook.
    Trace,
    /// Toggle the profile hook.
    Profile,
    /// Toggle the row-change hook.
    Change,
    /// Busy handler timeout in milliseconds. Zero or less turns it off.
    BusyTimeout(i32),
    /// Set engine limit `id` (a `SQLITE_LIMIT_*` category) to `value`.
    Limit { id: i32, value: i32 },
}

impl ConfigureOption {
    /// Resolve a named option and its integer arguments.
    ///
    /// Fails without touching the engine when the name is unknown or an
    /// argument is missing.
    pub fn parse(name: &str, args: &[i32]) -> Result<Self> {
        match name {
            "trace" => Ok(Self::Trace),
            "profile" => Ok(Self::Profile),
            "change" => Ok(Self::Change),
            "busyTimeout" => {
                let ms = arg(args, 0, "Value must be an integer")?;
                Ok(Self::BusyTimeout(ms))
            }
            "limit" => {
                let id = arg(args, 0, "limit id must be an integer")?;
                let value = arg(args, 1, "limit value must be an integer")?;
                engine_limit(id)?;
                Ok(Self::Limit { id, value })
            }
            other => Err(DatabaseError::InvalidOption { option: other.to_string() }),
        }
    }

    /// Name the option was parsed from.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Profile => "profile",
            Self::Change => "change",
            Self::BusyTimeout(_) => "busyTimeout",
            Self::Limit { .. } => "limit",
        }
    }
}

fn arg(args: &[i32], index: usize, message: &str) -> Result<i32> {
    args.get(index)
        .copied()
        .ok_or_else(|| DatabaseError::InvalidArgument { message: message.to_string() })
}

pub(crate) fn busy_timeout(ms: i32) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

/// Map a raw `SQLITE_LIMIT_*` id onto the binding's limit category.
pub(crate) fn engine_limit(id: i32) -> Result<Limit> {
    let limit = match id {
        0 => Limit::SQLITE_LIMIT_LENGTH,
        1 => Limit::SQLITE_LIMIT_SQL_LENGTH,
        2 => Limit::SQLITE_LIMIT_COLUMN,
        3 => Limit::SQLITE_LIMIT_EXPR_DEPTH,
        4 => Limit::SQLITE_LIMIT_COMPOUND_SELECT,
        5 => Limit::SQLITE_LIMIT_VDBE_OP,
        6 => Limit::SQLITE_LIMIT_FUNCTION_ARG,
        7 => Limit::SQLITE_LIMIT_ATTACHED,
        8 => Limit::SQLITE_LIMIT_LIKE_PATTERN_LENGTH,
        9 => Limit::SQLITE_LIMIT_VARIABLE_NUMBER,
        10 => Limit::SQLITE_LIMIT_TRIGGER_DEPTH,
        11 => Limit::SQLITE_LIMIT_WORKER_THREADS,
        _ => {
            return Err(DatabaseError::InvalidArgument {
                message: format!("unknown limit id: {id}"),
            })
        }
    };
    Ok(limit)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_toggles_take_no_arguments() {
        assert_eq!(ConfigureOption::parse("trace", &[]).unwrap(), ConfigureOption::Trace);
        assert_eq!(ConfigureOption::parse("profile", &[1]).unwrap(), ConfigureOption::Profile);
        assert_eq!(ConfigureOption::parse("change", &[]).unwrap(), ConfigureOption::Change);
    }

    #[test]
    fn busy_timeout_requires_a_value() {
        assert_eq!(
            ConfigureOption::parse("busyTimeout", &[250]).unwrap(),
            ConfigureOption::BusyTimeout(250)
        );
        let err = ConfigureOption::parse("busyTimeout", &[]).unwrap_err();
        assert_eq!(err.to_string(), "Value must be an integer");
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn limit_checks_both_arguments_and_the_id() {
        assert_eq!(
            ConfigureOption::parse("limit", &[1, 1000]).unwrap(),
            ConfigureOption::Limit { id: 1, value: 1000 }
        );
        assert_eq!(
            ConfigureOption::parse("limit", &[]).unwrap_err().to_string(),
            "limit id must be an integer"
        );
        assert_eq!(
            ConfigureOption::parse("limit", &[1]).unwrap_err().to_string(),
            "limit value must be an integer"
        );
        assert_eq!(
            ConfigureOption::parse("limit", &[99, 1]).unwrap_err().to_string(),
            "unknown limit id: 99"
        );
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = ConfigureOption::parse("cache", &[1]).unwrap_err();
        assert_eq!(err, DatabaseError::InvalidOption { option: "cache".to_string() });
        assert_eq!(err.to_string(), "cache is not a valid configuration option");
    }

    #[test]
    fn names_round_trip() {
        for name in ["trace", "profile", "change", "busyTimeout", "limit"] {
            let option = ConfigureOption::parse(name, &[0, 0]).unwrap();
            assert_eq!(option.name(), name);
        }
    }

    #[test]
    fn negative_busy_timeout_disables_the_handler() {
        assert_eq!(busy_timeout(-5), Duration::ZERO);
        assert_eq!(busy_timeout(1500), Duration::from_millis(1500));
    }
}
