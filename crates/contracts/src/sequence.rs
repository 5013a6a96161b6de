//! IdSequence - explicit id generator passed through the pipeline

use std::collections::HashMap;

/// Monotonic per-prefix id generator
///
/// Produces ids like `mark_000001`. Owned by the pipeline and handed to each
/// stage by `&mut`, so ids stay unique for a whole run without global state.
#[derive(Debug, Clone, Default)]
pub struct IdSequence {
    counters: HashMap<String, u64>,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for the given prefix
    pub fn next_id(&mut self, prefix: &str) -> String {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        format!("{prefix}_{:06}", *counter)
    }

    /// Number of ids issued so far for a prefix
    pub fn issued(&self, prefix: &str) -> u64 {
        self.counters.get(prefix).copied().unwrap_or(0)
    }
}
