//! In-process call profiler library
//!
//! The engine receives call-boundary notifications from a host runtime,
//! keeps a shadow call stack, aggregates per caller/callee statistics and
//! builds a bounded list of trace spans through pluggable extractors.

pub mod classifier;
pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod output;
pub mod replay;
pub mod spans;

pub use config::AgentConfig;
pub use engine::{CompileToken, Engine, HookToken, HostCall, SessionOptions};
pub use error::{AgentError, ExtractError, StackViolation};
pub use host::{GcCounters, HostAdapter, ManualHost, SystemHost};
pub use replay::{replay, Replayer};
