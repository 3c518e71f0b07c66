//! Extractor registry and dispatch
//!
//! Maps a fully-qualified symbol to the extractor that turns a call into a
//! span. Extractors describe the span as a [`SpanDraft`]; the registry
//! materializes it, reusing a cached span when the draft carries a title
//! already seen in this session.
//!
//! Nothing an extractor does can escape dispatch: errors and panics both
//! end up as "no span" for that call.

use crate::error::ExtractError;
use crate::spans::tree::SpanTree;
use callspan_shared::{SpanId, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

/// Category used when neither the draft nor the watch hint names one
pub const DEFAULT_CATEGORY: &str = "php";

/// What an extractor sees of a call
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub symbol: &'a str,
    pub args: &'a [Value],
    pub receiver: Option<&'a Value>,
}

impl<'a> CallContext<'a> {
    pub fn new(symbol: &'a str, args: &'a [Value], receiver: Option<&'a Value>) -> Self {
        Self {
            symbol,
            args,
            receiver,
        }
    }

    pub fn arg(&self, index: usize) -> Option<&'a Value> {
        self.args.get(index)
    }

    /// String argument at `index`
    pub fn str_arg(&self, index: usize) -> Result<&'a str, ExtractError> {
        self.arg(index)
            .ok_or(ExtractError::MissingArgument(index))?
            .as_str()
            .ok_or(ExtractError::NotAString(index))
    }

    /// Class name of the receiver object
    pub fn receiver_class(&self) -> Result<&'a str, ExtractError> {
        self.receiver
            .and_then(Value::class_name)
            .ok_or(ExtractError::MissingReceiver)
    }
}

/// Description of the span an extractor wants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanDraft {
    pub category: String,
    /// Dedup key; drafts with the same title share one span per session
    pub title: Option<String>,
    pub annotations: Vec<(String, String)>,
}

impl SpanDraft {
    /// A fresh span of `category`
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..Self::default()
        }
    }

    /// A span shared by every call producing the same `title`
    pub fn cached(category: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            title: Some(title.into()),
            annotations: Vec::new(),
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.push((key.into(), value.into()));
        self
    }
}

/// Outcome of one extraction
pub type ExtractResult = Result<Option<SpanDraft>, ExtractError>;

/// Turns a call into a span description.
///
/// `Ok(None)` declines the call. Errors are logged at debug level and
/// treated the same as declining.
pub trait Extractor: Send + Sync {
    fn extract(&self, call: &CallContext<'_>) -> ExtractResult;
}

impl<F> Extractor for F
where
    F: Fn(&CallContext<'_>) -> ExtractResult + Send + Sync,
{
    fn extract(&self, call: &CallContext<'_>) -> ExtractResult {
        self(call)
    }
}

/// User callback bound to a symbol at runtime
pub type WatchCallback = Box<dyn Fn(&CallContext<'_>) -> Option<SpanDraft> + Send>;

struct Watch {
    category_hint: String,
    callback: WatchCallback,
}

enum Route {
    Extractor(Arc<dyn Extractor>),
    Watch,
}

/// Symbol-keyed extractors, watch callbacks and the title cache
#[derive(Default)]
pub struct ExtractorRegistry {
    routes: HashMap<String, Route>,
    watches: HashMap<String, Watch>,
    cache: HashMap<String, SpanId>,
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("routes", &self.routes.len())
            .field("watches", &self.watches.len())
            .field("cached_titles", &self.cache.len())
            .finish()
    }
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `symbol` to `extractor`, replacing any previous binding
    pub fn register(&mut self, symbol: impl Into<String>, extractor: Arc<dyn Extractor>) {
        let symbol = symbol.into();
        self.watches.remove(&symbol);
        self.routes.insert(symbol, Route::Extractor(extractor));
    }

    /// Bind `symbol` to a user callback. `category_hint` names the span
    /// category when the callback leaves it empty.
    pub fn register_watch_callback(
        &mut self,
        symbol: impl Into<String>,
        category_hint: impl Into<String>,
        callback: WatchCallback,
    ) {
        let symbol = symbol.into();
        self.watches.insert(
            symbol.clone(),
            Watch {
                category_hint: category_hint.into(),
                callback,
            },
        );
        self.routes.insert(symbol, Route::Watch);
    }

    pub fn unregister(&mut self, symbol: &str) -> bool {
        self.watches.remove(symbol);
        self.routes.remove(symbol).is_some()
    }

    pub fn is_registered(&self, symbol: &str) -> bool {
        self.routes.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Span cached under `title`, if any
    pub fn cached(&self, title: &str) -> Option<SpanId> {
        self.cache.get(title).copied()
    }

    /// Forget cached titles; bindings stay
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Run the extractor bound to the call's symbol and create its span
    pub fn dispatch(&mut self, call: &CallContext<'_>, spans: &mut SpanTree) -> Option<SpanId> {
        let draft = match self.routes.get(call.symbol)? {
            Route::Extractor(extractor) => run_guarded(call.symbol, || extractor.extract(call))?,
            Route::Watch => {
                let watch = self.watches.get(call.symbol)?;
                let mut draft = run_guarded(call.symbol, || Ok((watch.callback)(call)))?;
                if draft.category.is_empty() {
                    draft.category = if watch.category_hint.is_empty() {
                        DEFAULT_CATEGORY.to_string()
                    } else {
                        watch.category_hint.clone()
                    };
                }
                draft
            }
        };

        self.materialize(draft, spans)
    }

    /// Create or reuse the span a draft describes
    pub fn materialize(&mut self, draft: SpanDraft, spans: &mut SpanTree) -> Option<SpanId> {
        let id = match draft.title.as_deref() {
            Some(title) => match self.cache.get(title) {
                Some(&id) => id,
                None => {
                    let id = spans.create(&draft.category)?;
                    self.cache.insert(title.to_string(), id);
                    id
                }
            },
            None => spans.create(&draft.category)?,
        };

        if let Some(title) = draft.title.as_deref() {
            spans.annotate(id, "title", title);
        }
        spans.annotate_many(
            id,
            draft
                .annotations
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        Some(id)
    }
}

fn run_guarded<F>(symbol: &str, f: F) -> Option<SpanDraft>
where
    F: FnOnce() -> ExtractResult,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(draft)) => draft,
        Ok(Err(e)) => {
            debug!("Extractor for {} declined: {}", symbol, e);
            None
        }
        Err(_) => {
            debug!("Extractor for {} panicked, no span recorded", symbol);
            None
        }
    }
}
