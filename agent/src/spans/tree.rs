//! Bounded span list
//!
//! Spans are stored densely in creation order, so a `SpanId` is an index.
//! All timestamps are microseconds relative to session start and are
//! supplied by the caller. Operations on unknown ids do nothing.

use callspan_shared::utils::truncate_str;
use callspan_shared::{Span, SpanId};
use tracing::debug;

/// Spans per session; creation beyond this is refused
pub const MAX_SPANS: usize = 1500;

/// Annotation values are cut to this many bytes
pub const MAX_ANNOTATION_LEN: usize = 1000;

#[derive(Debug, Default)]
pub struct SpanTree {
    spans: Vec<Span>,
    dropped: u64,
}

impl SpanTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// New span of `category`, or `None` once the cap is reached
    pub fn create(&mut self, category: &str) -> Option<SpanId> {
        if self.spans.len() >= MAX_SPANS {
            if self.dropped == 0 {
                debug!("Span limit of {} reached, dropping new spans", MAX_SPANS);
            }
            self.dropped += 1;
            return None;
        }

        let id = SpanId(self.spans.len() as u32);
        self.spans.push(Span::new(id, category));
        Some(id)
    }

    /// New span recording `parent`. An unknown parent is not recorded.
    pub fn create_child(&mut self, category: &str, parent: SpanId) -> Option<SpanId> {
        let parent = self.get(parent).map(|p| p.id);
        let id = self.create(category)?;
        if let Some(span) = self.get_mut(id) {
            span.parent = parent;
        }
        Some(id)
    }

    pub fn timer_start(&mut self, id: SpanId, at: f64) {
        if let Some(span) = self.get_mut(id) {
            span.starts.push(at);
        }
    }

    /// Stop the running timer. No-op when none is open.
    pub fn timer_stop(&mut self, id: SpanId, at: f64) {
        if let Some(span) = self.get_mut(id).filter(|s| s.is_open()) {
            span.stops.push(at);
        }
    }

    /// Append a complete start/stop pair. A running timer stays open after
    /// the new pair.
    pub fn record_duration(&mut self, id: SpanId, start: f64, end: f64) {
        let Some(span) = self.get_mut(id) else {
            return;
        };
        if span.is_open() {
            let open = span.starts.len() - 1;
            span.starts.insert(open, start);
        } else {
            span.starts.push(start);
        }
        span.stops.push(end);
    }

    /// Close the span's open timer at `end`, or record the whole call
    /// `start..end` when no timer is open.
    pub fn close_call(&mut self, id: SpanId, start: f64, end: f64) {
        let Some(span) = self.get_mut(id) else {
            return;
        };
        if span.is_open() {
            span.stops.push(end);
        } else {
            span.starts.push(start);
            span.stops.push(end);
        }
    }

    pub fn annotate(&mut self, id: SpanId, key: &str, value: &str) {
        if let Some(span) = self.get_mut(id) {
            let value = truncate_str(value, MAX_ANNOTATION_LEN);
            span.annotations.insert(key.to_string(), value.to_string());
        }
    }

    pub fn annotate_numeric(&mut self, id: SpanId, key: &str, value: i64) {
        if let Some(span) = self.get_mut(id) {
            span.annotations.insert(key.to_string(), value.to_string());
        }
    }

    /// Merge several annotations; later keys overwrite earlier ones
    pub fn annotate_many<'a, I>(&mut self, id: SpanId, annotations: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        if self.get(id).is_none() {
            return;
        }
        for (key, value) in annotations {
            self.annotate(id, key, value);
        }
    }

    /// Stop every span with more starts than stops. Returns how many were closed.
    pub fn close_open_timers(&mut self, at: f64) -> usize {
        let mut closed = 0;
        for span in &mut self.spans {
            while span.stops.len() < span.starts.len() {
                span.stops.push(at);
                closed += 1;
            }
        }
        closed
    }

    pub fn get(&self, id: SpanId) -> Option<&Span> {
        self.spans.get(id.index())
    }

    fn get_mut(&mut self, id: SpanId) -> Option<&mut Span> {
        self.spans.get_mut(id.index())
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Creations refused because the cap was reached
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &Span> {
        self.spans.iter()
    }

    pub fn into_spans(self) -> Vec<Span> {
        self.spans
    }
}
