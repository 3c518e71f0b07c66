//! Hierarchical stats aggregation

use callspan_shared::{StatsEntry, StatsTable};
use std::collections::HashMap;

/// Live stats table of one session
#[derive(Debug, Default)]
pub struct StatsAggregator {
    entries: HashMap<String, StatsEntry>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation into the entry for `name`, creating it on first use
    pub fn record(
        &mut self,
        name: &str,
        calls: u64,
        wall_us: u64,
        cpu_us: Option<u64>,
        mem_delta: Option<i64>,
        peak_mem_delta: Option<i64>,
    ) {
        // Lookup by &str first so repeated names do not allocate
        match self.entries.get_mut(name) {
            Some(entry) => entry.add(calls, wall_us, cpu_us, mem_delta, peak_mem_delta),
            None => {
                let mut entry = StatsEntry::default();
                entry.add(calls, wall_us, cpu_us, mem_delta, peak_mem_delta);
                self.entries.insert(name.to_string(), entry);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&StatsEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand the whole table over, ordered by name
    pub fn into_table(self) -> StatsTable {
        self.entries.into_iter().collect()
    }
}
