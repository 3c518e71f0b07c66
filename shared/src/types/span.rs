//! Trace span data
//!
//! A span describes one logical operation (a SQL statement, an HTTP call, a
//! template render). Repeated invocations of the same operation append
//! another start/stop pair instead of creating a new span.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Dense span index, stable for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanId(pub u32);

impl SpanId {
    /// The root `app` span created when a session begins
    pub const ROOT: SpanId = SpanId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One span with its timers and annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub id: SpanId,

    /// Operation category, e.g. `sql`, `http`, `view`
    #[serde(rename = "n")]
    pub category: String,

    /// Timer starts in microseconds since session start
    #[serde(rename = "b")]
    pub starts: Vec<f64>,

    /// Timer stops in microseconds since session start, paired by position
    #[serde(rename = "e")]
    pub stops: Vec<f64>,

    #[serde(rename = "p", default)]
    pub parent: Option<SpanId>,

    #[serde(rename = "a", default)]
    pub annotations: BTreeMap<String, String>,
}

impl Span {
    pub fn new(id: SpanId, category: impl Into<String>) -> Self {
        Self {
            id,
            category: category.into(),
            starts: Vec::new(),
            stops: Vec::new(),
            parent: None,
            annotations: BTreeMap::new(),
        }
    }

    /// A timer was started and not yet stopped
    pub fn is_open(&self) -> bool {
        self.starts.len() > self.stops.len()
    }

    /// Number of completed start/stop pairs
    pub fn invocations(&self) -> usize {
        self.starts.len().min(self.stops.len())
    }

    /// Sum of all completed pair durations in microseconds
    pub fn total_duration_us(&self) -> f64 {
        self.starts
            .iter()
            .zip(&self.stops)
            .map(|(start, stop)| (stop - start).max(0.0))
            .sum()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}
