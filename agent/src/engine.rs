//! Profiling engine
//!
//! Owns the call stack and the state of the current session, and turns host
//! notifications into frames, stats and spans. One engine serves one thread
//! of the monitored program; it is an ordinary value passed by `&mut`.
//!
//! A session runs from [`Engine::begin_session`] to [`Engine::stop`]. After
//! `stop` the results stay available until [`Engine::end_session`] hands
//! them over as a [`SessionReport`].

use crate::classifier::{Classifier, DEFAULT_DISPATCHERS};
use crate::collector::{
    inline_hash, CallStack, FilterMode, FrameHandle, StatsAggregator, SymbolFilter, ROOT_SYMBOL,
};
use crate::error::{AgentError, StackViolation};
use crate::host::{GcCounters, HostAdapter, SystemHost};
use crate::spans::{
    CallContext, Extractor, ExtractorRegistry, ExtractorRule, GenericExtractor, SpanTree,
    WatchCallback,
};
use callspan_shared::utils::time::system_time_nanos;
use callspan_shared::{
    CallKind, CompileStats, ExceptionRecord, Flags, SessionReport, Span, SpanId, Value,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub filter_mode: FilterMode,
    pub filter_functions: Vec<String>,
    pub transaction_function: Option<String>,
    pub exception_function: Option<String>,
    /// Transaction markers named `ReceiverClass::argument`
    pub dispatcher_functions: Vec<String>,
    /// Push a `main()` frame at session start so top-level calls have a caller
    pub synthetic_root: bool,
    pub extractors: Vec<ExtractorRule>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            filter_mode: FilterMode::Disabled,
            filter_functions: Vec::new(),
            transaction_function: None,
            exception_function: None,
            dispatcher_functions: DEFAULT_DISPATCHERS.iter().map(|s| s.to_string()).collect(),
            synthetic_root: false,
            extractors: Vec::new(),
        }
    }
}

/// One call boundary as reported by the host
#[derive(Debug, Clone, Copy)]
pub struct HostCall<'a> {
    /// `None` for code without a resolvable name
    pub symbol: Option<&'a str>,
    pub kind: CallKind,
    pub args: &'a [Value],
    pub receiver: Option<&'a Value>,
}

impl<'a> HostCall<'a> {
    /// Userland call without arguments
    pub fn new(symbol: &'a str) -> Self {
        Self {
            symbol: Some(symbol),
            kind: CallKind::Userland,
            args: &[],
            receiver: None,
        }
    }

    pub fn builtin(symbol: &'a str) -> Self {
        Self::new(symbol).with_kind(CallKind::Builtin)
    }

    /// Code the host could not name, e.g. top-level dynamic evaluation
    pub fn anonymous() -> Self {
        Self {
            symbol: None,
            kind: CallKind::Userland,
            args: &[],
            receiver: None,
        }
    }

    pub fn with_kind(mut self, kind: CallKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_args(mut self, args: &'a [Value]) -> Self {
        self.args = args;
        self
    }

    pub fn with_receiver(mut self, receiver: Option<&'a Value>) -> Self {
        self.receiver = receiver;
        self
    }
}

/// Returned by `on_call_enter`, handed back to `on_call_leave`.
/// Null for calls that are not profiled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookToken(Option<FrameHandle>);

impl HookToken {
    pub const NULL: HookToken = HookToken(None);

    pub fn is_null(self) -> bool {
        self.0.is_none()
    }

    pub fn frame(self) -> Option<FrameHandle> {
        self.0
    }
}

/// Returned by `on_compile_unit_start`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileToken(Option<u64>);

struct Session {
    flags: Flags,
    filter: SymbolFilter,
    stats: StatsAggregator,
    spans: SpanTree,
    /// Absent when spans are disabled
    registry: Option<ExtractorRegistry>,
    classifier: Classifier,
    compile: CompileStats,
    gc_start: Option<GcCounters>,
    wall_start: u64,
    cpu_start: u64,
    started_at_ns: u64,
    /// Set by `stop`
    wall_end: Option<u64>,
}

impl Session {
    fn is_active(&self) -> bool {
        self.wall_end.is_none()
    }

    fn spans_enabled(&self) -> bool {
        !self.flags.contains(Flags::NO_SPANS)
    }

    fn hierarchical(&self) -> bool {
        !self.flags.contains(Flags::NO_HIERARCHICAL_STATS)
    }

    /// Microseconds since session start
    fn relative(&self, ts: u64) -> f64 {
        ts.saturating_sub(self.wall_start) as f64
    }
}

pub struct Engine<H: HostAdapter> {
    host: H,
    stack: CallStack,
    session: Option<Session>,
    ever_enabled: bool,
}

impl Engine<SystemHost> {
    /// Engine reading the operating system's clocks
    pub fn system() -> Self {
        Self::new(SystemHost::new())
    }
}

impl<H: HostAdapter> Engine<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            stack: CallStack::new(),
            session: None,
            ever_enabled: false,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// A session is running and not yet stopped
    pub fn is_enabled(&self) -> bool {
        self.active().is_some()
    }

    /// A session was started at least once
    pub fn ever_enabled(&self) -> bool {
        self.ever_enabled
    }

    pub fn flags(&self) -> Option<Flags> {
        self.session.as_ref().map(|s| s.flags)
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }

    /// Symbols of the active frames, innermost first
    pub fn active_symbols(&self) -> Vec<&str> {
        self.stack.symbols()
    }

    fn active(&self) -> Option<&Session> {
        self.session.as_ref().filter(|s| s.is_active())
    }

    fn active_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut().filter(|s| s.is_active())
    }

    /// Start a session. Fails if one is already running; a stopped session
    /// whose report was never collected is discarded.
    pub fn begin_session(&mut self, flags: Flags, options: SessionOptions) -> Result<(), AgentError> {
        if self.is_enabled() {
            return Err(AgentError::SessionActive);
        }
        if self.session.take().is_some() {
            debug!("Discarding stopped session that was never collected");
        }

        let spans_enabled = !flags.contains(Flags::NO_SPANS);
        let registry = if spans_enabled {
            let mut registry = ExtractorRegistry::new();
            for rule in &options.extractors {
                for (symbol, extractor) in rule.bindings()? {
                    registry.register(symbol, extractor);
                }
            }
            debug!("Initialized extractor registry with {} symbols", registry.len());
            Some(registry)
        } else {
            None
        };

        self.stack.reset();
        let mut session = Session {
            flags,
            filter: SymbolFilter::new(options.filter_mode, &options.filter_functions),
            stats: StatsAggregator::new(),
            spans: SpanTree::new(),
            registry,
            classifier: Classifier::new(
                options.transaction_function,
                options.exception_function,
                options.dispatcher_functions,
            ),
            compile: CompileStats::default(),
            gc_start: self.host.gc_counters(),
            wall_start: self.host.now_wall_us(),
            cpu_start: self.host.now_cpu_us(),
            started_at_ns: system_time_nanos(),
            wall_end: None,
        };

        if spans_enabled {
            if let Some(root) = session.spans.create("app") {
                session.spans.timer_start(root, 0.0);
            }
        }

        self.session = Some(session);
        self.ever_enabled = true;
        info!("Profiling session started (flags: {})", flags);

        if options.synthetic_root {
            self.on_call_enter(HostCall::new(ROOT_SYMBOL));
        }
        Ok(())
    }

    /// A call is starting
    pub fn on_call_enter(&mut self, call: HostCall<'_>) -> HookToken {
        let Some(session) = self.session.as_mut().filter(|s| s.is_active()) else {
            return HookToken::NULL;
        };
        let Some(symbol) = call.symbol else {
            return HookToken::NULL;
        };

        let ctx = CallContext::new(symbol, call.args, call.receiver);
        session.classifier.observe(&ctx);

        let skipped_class = match call.kind {
            CallKind::Builtin => Flags::NO_BUILTIN_CALLS,
            CallKind::Userland => Flags::NO_USERLAND_CALLS,
        };
        if session.flags.contains(skipped_class) {
            return HookToken::NULL;
        }

        let hash = inline_hash(symbol);
        if !session.filter.should_profile(hash, symbol) {
            return HookToken::NULL;
        }

        let handle = self.stack.push(symbol, hash, session.hierarchical());
        let wall_start = self.host.now_wall_us();

        let span = match session.registry.as_mut() {
            Some(registry) => registry.dispatch(&ctx, &mut session.spans),
            None => None,
        };

        let cpu_start = session
            .flags
            .contains(Flags::GATHER_CPU_TIME)
            .then(|| self.host.now_cpu_us());
        let (mem_start, peak_mem_start) = if session.flags.contains(Flags::GATHER_MEMORY) {
            (Some(self.host.memory_usage()), Some(self.host.memory_peak()))
        } else {
            (None, None)
        };

        if let Some(frame) = self.stack.frame_mut(handle) {
            frame.wall_start = wall_start;
            frame.span = span;
            frame.cpu_start = cpu_start;
            frame.mem_start = mem_start;
            frame.peak_mem_start = peak_mem_start;
        }
        HookToken(Some(handle))
    }

    /// The call behind `token` returned.
    ///
    /// `token` must belong to the innermost active call. Anything else is
    /// reported as a violation and the stack is left untouched. Tokens of
    /// calls still running when the session was stopped are ignored.
    pub fn on_call_leave(&mut self, token: HookToken) -> Result<(), StackViolation> {
        let Some(handle) = token.0 else {
            return Ok(());
        };
        let Some(session) = self.session.as_mut().filter(|s| s.is_active()) else {
            return Ok(());
        };

        let end = self.host.now_wall_us();
        complete_frame(&mut self.stack, session, &self.host, handle, end).map_err(|e| {
            warn!("{}", e);
            e
        })
    }

    pub fn on_compile_unit_start(&mut self) -> CompileToken {
        match self.active() {
            Some(s) if !s.flags.contains(Flags::NO_COMPILE_TRACKING) => {
                CompileToken(Some(self.host.now_wall_us()))
            }
            _ => CompileToken(None),
        }
    }

    pub fn on_compile_unit_end(&mut self, token: CompileToken) {
        let Some(start) = token.0 else {
            return;
        };
        let now = self.host.now_wall_us();
        if let Some(session) = self.active_mut() {
            session.compile.count += 1;
            session.compile.wall_us += now.saturating_sub(start);
        }
    }

    /// End profiling early: closes every active frame innermost first, then
    /// every open span timer. Results stay available until `end_session`.
    pub fn stop(&mut self) {
        let Some(session) = self.session.as_mut().filter(|s| s.is_active()) else {
            return;
        };

        let end = self.host.now_wall_us();
        while let Some(top) = self.stack.top() {
            if complete_frame(&mut self.stack, session, &self.host, top, end).is_err() {
                break;
            }
        }

        if session.spans_enabled() {
            let at = session.relative(end);
            let root = SpanId::ROOT;
            session.spans.timer_stop(root, at);
            session.spans.close_open_timers(at);

            if let (Some(start), Some(now)) = (session.gc_start, self.host.gc_counters()) {
                if now.runs > start.runs {
                    session
                        .spans
                        .annotate_numeric(root, "gc", (now.runs - start.runs) as i64);
                    session.spans.annotate_numeric(
                        root,
                        "gcc",
                        now.collected.saturating_sub(start.collected) as i64,
                    );
                }
            }
            if session.compile.count > 0 {
                session
                    .spans
                    .annotate_numeric(root, "cct", session.compile.count as i64);
            }
            if session.compile.wall_us > 0 {
                session
                    .spans
                    .annotate_numeric(root, "cwt", session.compile.wall_us as i64);
            }
            let cpu = self.host.now_cpu_us().saturating_sub(session.cpu_start);
            session.spans.annotate_numeric(root, "cpu", cpu as i64);
        }

        session.wall_end = Some(end);
    }

    /// Stop if needed and hand over everything the session gathered
    pub fn end_session(&mut self) -> Option<SessionReport> {
        self.stop();
        let session = self.session.take()?;
        self.stack.reset();

        let (transaction_name, exception) = session.classifier.into_parts();
        let dropped_spans = session.spans.dropped();
        let report = SessionReport {
            flags: session.flags,
            started_at_ns: session.started_at_ns,
            duration_us: session
                .wall_end
                .unwrap_or(session.wall_start)
                .saturating_sub(session.wall_start),
            stats: session.stats.into_table(),
            spans: session.spans.into_spans(),
            transaction_name,
            exception: exception.as_ref().and_then(ExceptionRecord::from_value),
            compile: session.compile,
            dropped_spans,
        };

        info!(
            "Profiling session ended: {} stats entries, {} calls, {} spans",
            report.stats.len(),
            report.total_calls(),
            report.spans.len()
        );
        Some(report)
    }

    pub fn current_transaction_name(&self) -> Option<&str> {
        self.session.as_ref()?.classifier.transaction_name()
    }

    pub fn current_exception(&self) -> Option<&Value> {
        self.session.as_ref()?.classifier.exception()
    }

    fn span_tree_mut(&mut self) -> Option<&mut SpanTree> {
        self.active_mut()
            .filter(|s| s.spans_enabled())
            .map(|s| &mut s.spans)
    }

    /// New span, or `None` outside an active session or once the cap is hit
    pub fn create_span(&mut self, category: &str) -> Option<SpanId> {
        self.span_tree_mut()?.create(category)
    }

    pub fn start_timer(&mut self, id: SpanId) {
        let now = self.host.now_wall_us();
        if let Some(session) = self.active_mut().filter(|s| s.spans_enabled()) {
            let at = session.relative(now);
            session.spans.timer_start(id, at);
        }
    }

    pub fn stop_timer(&mut self, id: SpanId) {
        let now = self.host.now_wall_us();
        if let Some(session) = self.active_mut().filter(|s| s.spans_enabled()) {
            let at = session.relative(now);
            session.spans.timer_stop(id, at);
        }
    }

    /// Record a start/stop pair observed at host wall-clock times
    pub fn record_duration(&mut self, id: SpanId, start: u64, end: u64) {
        if let Some(session) = self.active_mut().filter(|s| s.spans_enabled()) {
            let (start, end) = (session.relative(start), session.relative(end));
            session.spans.record_duration(id, start, end);
        }
    }

    pub fn annotate(&mut self, id: SpanId, key: &str, value: &str) {
        if let Some(spans) = self.span_tree_mut() {
            spans.annotate(id, key, value);
        }
    }

    pub fn annotate_numeric(&mut self, id: SpanId, key: &str, value: i64) {
        if let Some(spans) = self.span_tree_mut() {
            spans.annotate_numeric(id, key, value);
        }
    }

    pub fn span(&self, id: SpanId) -> Option<&Span> {
        self.session.as_ref()?.spans.get(id)
    }

    pub fn span_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.spans.len())
    }

    fn registry_mut(&mut self) -> Option<&mut ExtractorRegistry> {
        self.active_mut()?.registry.as_mut()
    }

    /// Bind an extractor to `symbol` for the rest of the session. Returns
    /// `false` when no session is running or spans are disabled.
    pub fn register_extractor(&mut self, symbol: &str, extractor: Arc<dyn Extractor>) -> bool {
        match self.registry_mut() {
            Some(registry) => {
                registry.register(symbol, extractor);
                true
            }
            None => false,
        }
    }

    /// Bind a generic extractor picked by hint: `view` titles the span with
    /// the template file, `event` with the event name, anything else with
    /// the symbol.
    pub fn register_watch(&mut self, symbol: &str, category_hint: Option<&str>) -> bool {
        let extractor = GenericExtractor::for_hint(category_hint.unwrap_or_default());
        self.register_extractor(symbol, Arc::new(extractor))
    }

    pub fn register_watch_callback(
        &mut self,
        symbol: &str,
        category_hint: &str,
        callback: WatchCallback,
    ) -> bool {
        match self.registry_mut() {
            Some(registry) => {
                registry.register_watch_callback(symbol, category_hint, callback);
                true
            }
            None => false,
        }
    }

    /// Replace the symbol filter of the running session
    pub fn reconfigure_filter<I, S>(&mut self, mode: FilterMode, functions: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match self.active_mut() {
            Some(session) => {
                session.filter = SymbolFilter::new(mode, functions);
                true
            }
            None => false,
        }
    }

    /// Free pooled frames. Only allowed between sessions.
    pub fn release_pool(&mut self) -> bool {
        if self.session.is_some() {
            return false;
        }
        self.stack.release_pool();
        true
    }

    pub fn pooled_frames(&self) -> usize {
        self.stack.pool().capacity()
    }
}

/// Fold the top frame into the session and pop it
fn complete_frame<H: HostAdapter>(
    stack: &mut CallStack,
    session: &mut Session,
    host: &H,
    handle: FrameHandle,
    end: u64,
) -> Result<(), StackViolation> {
    let (wall_start, cpu_start, mem_start, peak_mem_start, span) = {
        let frame = stack.check_top(handle)?;
        (
            frame.wall_start,
            frame.cpu_start,
            frame.mem_start,
            frame.peak_mem_start,
            frame.span,
        )
    };

    if let Some(id) = span {
        let (start, stop) = (session.relative(wall_start), session.relative(end));
        session.spans.close_call(id, start, stop);
    }

    if session.hierarchical() {
        let wall = end.saturating_sub(wall_start);
        let cpu = cpu_start.map(|s| host.now_cpu_us().saturating_sub(s));
        let mem = mem_start.map(|s| host.memory_usage() - s);
        let peak = peak_mem_start.map(|s| host.memory_peak() - s);
        session
            .stats
            .record(stack.qualified_name(handle), 1, wall, cpu, mem, peak);
    }

    stack.pop(handle)
}
