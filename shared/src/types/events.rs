//! Host event definitions
//!
//! These types describe the call-boundary and compile notifications a host
//! runtime sends to the engine. A recorded sequence of them (a `HostScript`)
//! can be replayed against the engine with a manual clock.

use super::value::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host clock reading in microseconds
pub type Timestamp = u64;

/// Class of an intercepted call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// Function defined by application code
    #[default]
    Userland,
    /// Function provided by the runtime itself
    Builtin,
}

/// One notification from the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// A call is about to execute
    Enter {
        at: Timestamp,

        /// Resolved function name; `None` for anonymous top-level code
        #[serde(default)]
        symbol: Option<String>,

        #[serde(default)]
        kind: CallKind,

        #[serde(default)]
        args: Vec<Value>,

        #[serde(default)]
        receiver: Option<Value>,

        /// CPU clock reading, when the host reports one
        #[serde(default)]
        cpu: Option<Timestamp>,

        /// Memory usage in bytes, when the host reports it
        #[serde(default)]
        memory: Option<i64>,
    },

    /// The innermost active call returned
    Leave {
        at: Timestamp,

        #[serde(default)]
        cpu: Option<Timestamp>,

        #[serde(default)]
        memory: Option<i64>,
    },

    /// A source compilation unit started
    CompileStart { at: Timestamp },

    /// The innermost compilation unit finished
    CompileEnd { at: Timestamp },
}

impl HostEvent {
    pub fn at(&self) -> Timestamp {
        match self {
            HostEvent::Enter { at, .. }
            | HostEvent::Leave { at, .. }
            | HostEvent::CompileStart { at }
            | HostEvent::CompileEnd { at } => *at,
        }
    }
}

/// Problems found while checking a recorded script
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("event {index} goes back in time ({at}us < {previous}us)")]
    TimeReversal {
        index: usize,
        at: Timestamp,
        previous: Timestamp,
    },

    #[error("event {index} leaves a call that was never entered")]
    UnmatchedLeave { index: usize },

    #[error("event {index} ends a compile unit that was never started")]
    UnmatchedCompileEnd { index: usize },
}

/// A recorded sequence of host notifications
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostScript {
    /// Flag names to run the session with
    #[serde(default)]
    pub flags: Vec<String>,

    pub events: Vec<HostEvent>,
}

impl HostScript {
    /// Check clock monotonicity and nesting.
    ///
    /// Calls still open at the end are allowed; the engine force-closes them
    /// when the session stops.
    pub fn validate(&self) -> Result<(), ScriptError> {
        let mut previous = 0;
        let mut calls = 0usize;
        let mut compiles = 0usize;

        for (index, event) in self.events.iter().enumerate() {
            let at = event.at();
            if at < previous {
                return Err(ScriptError::TimeReversal { index, at, previous });
            }
            previous = at;

            match event {
                HostEvent::Enter { .. } => calls += 1,
                HostEvent::Leave { .. } => {
                    calls = calls
                        .checked_sub(1)
                        .ok_or(ScriptError::UnmatchedLeave { index })?;
                }
                HostEvent::CompileStart { .. } => compiles += 1,
                HostEvent::CompileEnd { .. } => {
                    compiles = compiles
                        .checked_sub(1)
                        .ok_or(ScriptError::UnmatchedCompileEnd { index })?;
                }
            }
        }

        Ok(())
    }

    /// Timestamp of the last event, or zero for an empty script
    pub fn end_time(&self) -> Timestamp {
        self.events.last().map(HostEvent::at).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"{
        "flags": ["gather_cpu_time"],
        "events": [
            {"event": "enter", "at": 0, "symbol": "main()"},
            {"event": "enter", "at": 5, "symbol": "db.query", "kind": "builtin", "args": ["SELECT 1"]},
            {"event": "leave", "at": 9},
            {"event": "compile_start", "at": 10},
            {"event": "compile_end", "at": 12},
            {"event": "leave", "at": 20}
        ]
    }"#;

    #[test]
    fn test_parse_script() {
        let script: HostScript = serde_json::from_str(SCRIPT).unwrap();
        assert_eq!(script.flags, vec!["gather_cpu_time".to_string()]);
        assert_eq!(script.events.len(), 6);
        match &script.events[1] {
            HostEvent::Enter { symbol, kind, args, .. } => {
                assert_eq!(symbol.as_deref(), Some("db.query"));
                assert_eq!(*kind, CallKind::Builtin);
                assert_eq!(args[0].as_str(), Some("SELECT 1"));
            }
            other => panic!("expected enter, got {:?}", other),
        }
        assert_eq!(script.end_time(), 20);
        assert!(script.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_time_reversal() {
        let script = HostScript {
            flags: vec![],
            events: vec![
                HostEvent::CompileStart { at: 10 },
                HostEvent::CompileEnd { at: 5 },
            ],
        };
        assert_eq!(
            script.validate(),
            Err(ScriptError::TimeReversal { index: 1, at: 5, previous: 10 })
        );
    }

    #[test]
    fn test_validate_rejects_unmatched_leave() {
        let script = HostScript {
            flags: vec![],
            events: vec![HostEvent::Leave { at: 1, cpu: None, memory: None }],
        };
        assert_eq!(script.validate(), Err(ScriptError::UnmatchedLeave { index: 0 }));
    }
}
