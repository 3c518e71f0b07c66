//! Error types for the profiling engine

use crate::collector::stack::FrameHandle;
use thiserror::Error;

/// Errors surfaced by configuration and output, never by the hot path
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Flag(#[from] callspan_shared::FlagParseError),

    #[error("invalid filter mode: {0} (expected disabled, blacklist or whitelist)")]
    FilterMode(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid host script: {0}")]
    Script(#[from] callspan_shared::ScriptError),

    #[error("a profiling session is already running")]
    SessionActive,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The host left a call other than the innermost active one.
///
/// The stack is left untouched when this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("call stack violation: expected leave of {expected:?}, got {got:?}")]
pub struct StackViolation {
    /// Current top of the stack, if any
    pub expected: Option<FrameHandle>,
    pub got: FrameHandle,
}

/// An extractor could not derive a span from the call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("argument {0} is missing")]
    MissingArgument(usize),

    #[error("argument {0} is not a string")]
    NotAString(usize),

    #[error("call has no receiver object")]
    MissingReceiver,

    #[error("{0}")]
    Other(String),
}
