//! Replay of recorded host notifications
//!
//! Drives an [`Engine`] on a [`ManualHost`] whose clocks are set from each
//! event's timestamps, so a recorded run always yields the same report.

use crate::engine::{CompileToken, Engine, HookToken, HostCall, SessionOptions};
use crate::error::AgentError;
use crate::host::ManualHost;
use callspan_shared::{Flags, HostEvent, HostScript, SessionReport};
use tracing::{debug, warn};

/// Replays one script into one session
pub struct Replayer {
    engine: Engine<ManualHost>,
    calls: Vec<HookToken>,
    compiles: Vec<CompileToken>,
    violations: usize,
}

impl Default for Replayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replayer {
    pub fn new() -> Self {
        Self {
            engine: Engine::new(ManualHost::new()),
            calls: Vec::new(),
            compiles: Vec::new(),
            violations: 0,
        }
    }

    pub fn engine(&self) -> &Engine<ManualHost> {
        &self.engine
    }

    /// Stack violations reported by the engine so far
    pub fn violations(&self) -> usize {
        self.violations
    }

    /// Validate `script`, run it and return the session report.
    ///
    /// `extra_flags` are merged with the script's own flags.
    pub fn run(
        &mut self,
        script: &HostScript,
        extra_flags: Flags,
        options: SessionOptions,
    ) -> Result<SessionReport, AgentError> {
        script.validate()?;
        let flags = Flags::from_names(&script.flags)? | extra_flags;

        let start = script.events.first().map(HostEvent::at).unwrap_or(0);
        self.engine.host().set_wall(start);
        self.engine.begin_session(flags, options)?;

        for event in &script.events {
            self.apply(event);
        }

        self.engine.host().set_wall(script.end_time());
        let report = self
            .engine
            .end_session()
            .ok_or_else(|| AgentError::Invalid("session vanished during replay".to_string()))?;

        debug!(
            "Replayed {} events ({} stack violations)",
            script.events.len(),
            self.violations
        );
        self.calls.clear();
        self.compiles.clear();
        Ok(report)
    }

    fn apply(&mut self, event: &HostEvent) {
        let host = self.engine.host();
        host.set_wall(event.at());

        match event {
            HostEvent::Enter {
                symbol,
                kind,
                args,
                receiver,
                cpu,
                memory,
                ..
            } => {
                set_resources(host, *cpu, *memory);
                let call = HostCall {
                    symbol: symbol.as_deref(),
                    kind: *kind,
                    args,
                    receiver: receiver.as_ref(),
                };
                let token = self.engine.on_call_enter(call);
                self.calls.push(token);
            }
            HostEvent::Leave { cpu, memory, .. } => {
                set_resources(host, *cpu, *memory);
                let Some(token) = self.calls.pop() else {
                    return;
                };
                if let Err(e) = self.engine.on_call_leave(token) {
                    warn!("Replay continues after {}", e);
                    self.violations += 1;
                }
            }
            HostEvent::CompileStart { .. } => {
                let token = self.engine.on_compile_unit_start();
                self.compiles.push(token);
            }
            HostEvent::CompileEnd { .. } => {
                if let Some(token) = self.compiles.pop() {
                    self.engine.on_compile_unit_end(token);
                }
            }
        }
    }
}

fn set_resources(host: &ManualHost, cpu: Option<u64>, memory: Option<i64>) {
    if let Some(cpu) = cpu {
        host.set_cpu(cpu);
    }
    if let Some(memory) = memory {
        host.set_memory(memory);
    }
}

/// Replay `script` in a fresh engine
pub fn replay(script: &HostScript, options: SessionOptions) -> Result<SessionReport, AgentError> {
    Replayer::new().run(script, Flags::empty(), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use callspan_shared::CallKind;

    fn enter(at: u64, symbol: &str) -> HostEvent {
        HostEvent::Enter {
            at,
            symbol: Some(symbol.to_string()),
            kind: CallKind::Userland,
            args: Vec::new(),
            receiver: None,
            cpu: None,
            memory: None,
        }
    }

    fn leave(at: u64) -> HostEvent {
        HostEvent::Leave {
            at,
            cpu: None,
            memory: None,
        }
    }

    #[test]
    fn test_replay_nested_calls() {
        let script = HostScript {
            flags: Vec::new(),
            events: vec![
                enter(100, "main()"),
                enter(110, "foo"),
                leave(10_110),
                leave(10_200),
            ],
        };

        let report = replay(&script, SessionOptions::default()).unwrap();
        assert_eq!(report.stats["main()==>foo"].calls, 1);
        assert_eq!(report.stats["main()==>foo"].wall_us, 10_000);
        assert_eq!(report.stats["main()"].wall_us, 10_100);
        assert_eq!(report.duration_us, 10_100);
    }

    #[test]
    fn test_replay_records_cpu_and_memory() {
        let script = HostScript {
            flags: vec!["gather_cpu_time".into(), "gather_memory".into()],
            events: vec![
                HostEvent::Enter {
                    at: 0,
                    symbol: Some("alloc".into()),
                    kind: CallKind::Userland,
                    args: Vec::new(),
                    receiver: None,
                    cpu: Some(1_000),
                    memory: Some(4_096),
                },
                HostEvent::Leave {
                    at: 50,
                    cpu: Some(1_040),
                    memory: Some(6_144),
                },
            ],
        };

        let report = replay(&script, SessionOptions::default()).unwrap();
        let entry = &report.stats["alloc"];
        assert_eq!(entry.cpu_us, Some(40));
        assert_eq!(entry.mem_delta, Some(2_048));
        assert_eq!(entry.peak_mem_delta, Some(2_048));
    }

    #[test]
    fn test_replay_closes_unfinished_calls() {
        let script = HostScript {
            flags: Vec::new(),
            events: vec![enter(0, "main()"), enter(5, "worker")],
        };
        let mut replayer = Replayer::new();
        let report = replayer
            .run(&script, Flags::empty(), SessionOptions::default())
            .unwrap();
        assert_eq!(report.stats["main()==>worker"].calls, 1);
        assert_eq!(replayer.violations(), 0);
        assert_eq!(replayer.engine().stack_depth(), 0);
    }

    #[test]
    fn test_replay_rejects_bad_script() {
        let script = HostScript {
            flags: Vec::new(),
            events: vec![leave(0)],
        };
        assert!(matches!(
            replay(&script, SessionOptions::default()),
            Err(AgentError::Script(_))
        ));

        let script = HostScript {
            flags: vec!["bogus".into()],
            events: Vec::new(),
        };
        assert!(matches!(
            replay(&script, SessionOptions::default()),
            Err(AgentError::Flag(_))
        ));
    }

    #[test]
    fn test_replayer_is_reusable() {
        let script = HostScript {
            flags: Vec::new(),
            events: vec![enter(0, "a"), leave(3)],
        };
        let mut replayer = Replayer::new();
        replayer
            .run(&script, Flags::empty(), SessionOptions::default())
            .unwrap();
        let second = replayer
            .run(&script, Flags::NO_SPANS, SessionOptions::default())
            .unwrap();
        assert_eq!(second.stats["a"].calls, 1);
        assert!(second.spans.is_empty());
    }
}
