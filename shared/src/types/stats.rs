//! Hierarchical call statistics
//!
//! Entries are keyed by a caller-qualified name such as `main()==>foo` or
//! `foo@1==>foo@2` for recursive calls.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Separator between caller and callee in a qualified name
pub const STACK_DELIMITER: &str = "==>";

/// Accumulated cost of every completed call sharing one qualified name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsEntry {
    /// Number of completed calls
    #[serde(rename = "ct")]
    pub calls: u64,

    /// Inclusive wall time in microseconds
    #[serde(rename = "wt")]
    pub wall_us: u64,

    /// Inclusive CPU time in microseconds (CPU gathering only)
    #[serde(rename = "cpu", default)]
    pub cpu_us: Option<u64>,

    /// Memory usage delta in bytes (memory gathering only)
    #[serde(rename = "mu", default)]
    pub mem_delta: Option<i64>,

    /// Peak memory delta in bytes (memory gathering only)
    #[serde(rename = "pmu", default)]
    pub peak_mem_delta: Option<i64>,
}

impl StatsEntry {
    /// Fold one more observation into the entry
    pub fn add(
        &mut self,
        calls: u64,
        wall_us: u64,
        cpu_us: Option<u64>,
        mem_delta: Option<i64>,
        peak_mem_delta: Option<i64>,
    ) {
        self.calls += calls;
        self.wall_us += wall_us;
        if let Some(cpu) = cpu_us {
            *self.cpu_us.get_or_insert(0) += cpu;
        }
        if let Some(mu) = mem_delta {
            *self.mem_delta.get_or_insert(0) += mu;
        }
        if let Some(pmu) = peak_mem_delta {
            *self.peak_mem_delta.get_or_insert(0) += pmu;
        }
    }
}

/// Complete stats table of one session, ordered by qualified name
pub type StatsTable = BTreeMap<String, StatsEntry>;

/// Split `caller==>callee` into its parts; root entries have no caller
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once(STACK_DELIMITER) {
        Some((caller, callee)) => (Some(caller), callee),
        None => (None, name),
    }
}

/// The `n` entries with the highest wall time, highest first
pub fn top_by_wall(table: &StatsTable, n: usize) -> Vec<(&str, &StatsEntry)> {
    let mut entries: Vec<(&str, &StatsEntry)> =
        table.iter().map(|(k, v)| (k.as_str(), v)).collect();
    entries.sort_by(|a, b| b.1.wall_us.cmp(&a.1.wall_us).then_with(|| a.0.cmp(b.0)));
    entries.truncate(n);
    entries
}
