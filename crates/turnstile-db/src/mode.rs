//! Serialize/parallelize mode with scopes that may overlap across handles.
//!
//! Every clone of a [`crate::Database`] can open a scope, so scopes do not
//! necessarily end in the order they began. Each one is tracked by id; the
//! most recently entered scope that is still open decides the mode, and the
//! unscoped base mode applies once none are left.

/// Identifies one scoped mode change.
pub(crate) type ScopeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModeChange {
    /// Change the unscoped mode.
    Set { serialize: bool },
    Enter { scope: ScopeId, serialize: bool },
    Leave { scope: ScopeId },
}

#[derive(Debug, Default)]
pub(crate) struct Modes {
    base: bool,
    scopes: Vec<(ScopeId, bool)>,
}

impl Modes {
    /// Apply one change and return the mode now in effect. `None` if the
    /// change named a scope that is not open.
    pub(crate) fn apply(&mut self, change: ModeChange) -> Option<bool> {
        match change {
            ModeChange::Set { serialize } => self.base = serialize,
            ModeChange::Enter { scope, serialize } => self.scopes.push((scope, serialize)),
            ModeChange::Leave { scope } => {
                let index = self.scopes.iter().position(|(id, _)| *id == scope)?;
                self.scopes.remove(index);
            }
        }
        Some(self.effective())
    }

    pub(crate) fn effective(&self) -> bool {
        self.scopes.last().map_or(self.base, |(_, serialize)| *serialize)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scopes_unwind_to_the_base_mode() {
        let mut modes = Modes::default();
        assert_eq!(modes.apply(ModeChange::Enter { scope: 1, serialize: true }), Some(true));
        assert_eq!(modes.apply(ModeChange::Enter { scope: 2, serialize: false }), Some(false));
        assert_eq!(modes.apply(ModeChange::Leave { scope: 2 }), Some(true));
        assert_eq!(modes.apply(ModeChange::Leave { scope: 1 }), Some(false));
    }

    #[test]
    fn an_outer_scope_ending_first_leaves_the_inner_one_in_force() {
        let mut modes = Modes::default();
        modes.apply(ModeChange::Enter { scope: 1, serialize: true });
        modes.apply(ModeChange::Enter { scope: 2, serialize: false });

        // Scope 1 belongs to another handle and ends while 2 is still open.
        assert_eq!(modes.apply(ModeChange::Leave { scope: 1 }), Some(false));
        assert_eq!(modes.apply(ModeChange::Leave { scope: 2 }), Some(false));
    }

    #[test]
    fn base_mode_applies_only_outside_scopes() {
        let mut modes = Modes::default();
        modes.apply(ModeChange::Enter { scope: 7, serialize: false });
        assert_eq!(modes.apply(ModeChange::Set { serialize: true }), Some(false));
        assert_eq!(modes.apply(ModeChange::Leave { scope: 7 }), Some(true));
    }

    #[test]
    fn leaving_an_unknown_scope_changes_nothing() {
        let mut modes = Modes::default();
        modes.apply(ModeChange::Set { serialize: true });
        assert_eq!(modes.apply(ModeChange::Leave { scope: 3 }), None);
        assert!(modes.effective());
    }
}
