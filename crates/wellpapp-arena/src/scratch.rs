//! Per-connection scratch memory (§4.7, §9): short-lived allocations made
//! while handling one command, freed in bulk on disconnect. The original is
//! a small linked-list allocator with leak accounting; per §9's design note
//! a scoped lifetime is sufficient, so this is a byte-budget view over
//! ordinary heap allocations rather than a bespoke allocator, while keeping
//! the leak-accounting *intent*: `outstanding()` surfaces anything not
//! returned to the pool before the connection's `Scratch` is dropped.

use tracing::warn;

/// Default per-connection scratch budget. Requests exceeding this budget
/// fail with `Error::Oom` rather than growing unbounded.
pub const DEFAULT_BUDGET: usize = 64 * 1024;

pub struct Scratch {
    budget: usize,
    used: usize,
    connection_id: u64,
}

impl Scratch {
    #[must_use]
    pub const fn new(connection_id: u64) -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            used: 0,
            connection_id,
        }
    }

    #[must_use]
    pub const fn with_budget(connection_id: u64, budget: usize) -> Self {
        Self {
            budget,
            used: 0,
            connection_id,
        }
    }

    /// Accounts for `len` bytes of scratch allocation (e.g. a parsed
    /// command's intermediate buffers), returning an error if this would
    /// exceed the per-connection budget.
    pub fn reserve(&mut self, len: usize) -> wellpapp_error::Result<()> {
        if self.used + len > self.budget {
            return Err(wellpapp_error::Error::Oom);
        }
        self.used += len;
        Ok(())
    }

    /// Returns `len` bytes to the pool, e.g. once a command's scratch
    /// buffers go out of scope.
    pub fn release(&mut self, len: usize) {
        self.used = self.used.saturating_sub(len);
    }

    /// Resets all accounting, e.g. between successive commands on one
    /// connection so scratch never accumulates across a whole session.
    pub fn reset_for_next_command(&mut self) {
        self.used = 0;
    }

    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.used
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if self.used != 0 {
            warn!(
                connection_id = self.connection_id,
                leaked_bytes = self.used,
                "connection scratch arena leaked bytes at disconnect"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_and_release_round_trip() {
        let mut scratch = Scratch::new(1);
        scratch.reserve(100).unwrap();
        assert_eq!(scratch.outstanding(), 100);
        scratch.release(100);
        assert_eq!(scratch.outstanding(), 0);
    }

    #[test]
    fn over_budget_reserve_fails() {
        let mut scratch = Scratch::with_budget(1, 10);
        assert!(scratch.reserve(11).is_err());
    }

    #[test]
    fn reset_clears_accounting_between_commands() {
        let mut scratch = Scratch::new(1);
        scratch.reserve(500).unwrap();
        scratch.reset_for_next_command();
        assert_eq!(scratch.outstanding(), 0);
    }
}
