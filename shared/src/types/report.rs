//! Session report handed to the caller when a profiling session ends

use super::flags::Flags;
use super::span::Span;
use super::stats::StatsTable;
use super::value::Value;
use serde::{Deserialize, Serialize};

/// Compile-unit counters gathered during a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileStats {
    /// Number of compile units observed
    pub count: u64,

    /// Total wall time spent compiling, in microseconds
    pub wall_us: u64,
}

/// Summary of the exception detected during a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    pub class: String,
    pub message: Option<String>,
}

impl ExceptionRecord {
    /// Summarize an exception-like value; `None` for anything else
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object().filter(|o| o.exception)?;
        Some(Self {
            class: object.class.clone(),
            message: object
                .properties
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Everything one session produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Flags the session ran with
    pub flags: Flags,

    /// Wall-clock session start (nanoseconds since UNIX epoch)
    pub started_at_ns: u64,

    /// Session length in microseconds
    pub duration_us: u64,

    /// Hierarchical stats keyed by caller-qualified name
    pub stats: StatsTable,

    /// Spans in creation order; `spans[i].id == SpanId(i)`
    pub spans: Vec<Span>,

    pub transaction_name: Option<String>,

    pub exception: Option<ExceptionRecord>,

    pub compile: CompileStats,

    /// Span creations refused because the cap was reached
    pub dropped_spans: u64,
}

impl SessionReport {
    /// Total number of completed calls across all stats entries
    pub fn total_calls(&self) -> u64 {
        self.stats.values().map(|e| e.calls).sum()
    }

    /// Spans of one category
    pub fn spans_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Span> + 'a {
        self.spans.iter().filter(move |s| s.category == category)
    }
}
