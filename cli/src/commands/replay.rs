//! Replay command implementation

use crate::output;
use anyhow::{Context, Result};
use callspan_agent::output::{binary, json};
use callspan_agent::{AgentConfig, Replayer};
use callspan_shared::{Flags, HostScript};
use clap::Args;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Recorded host script (JSON)
    pub script: PathBuf,

    /// Agent configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Extra session flags, e.g. gather_cpu_time (repeatable)
    #[arg(short, long = "flag")]
    pub flags: Vec<String>,

    /// Write the report as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Write the report in the binary wire format
    #[arg(long)]
    pub bin: Option<PathBuf>,

    /// Number of stats entries to print
    #[arg(short, long, default_value = "20")]
    pub top: usize,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(args: ReplayArgs) -> Result<()> {
    let config = AgentConfig::load(args.config.as_deref()).context("Invalid configuration")?;
    let flags = config.flags()? | Flags::from_names(&args.flags)?;

    let file = File::open(&args.script)
        .with_context(|| format!("Failed to open script: {}", args.script.display()))?;
    let script: HostScript = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse script: {}", args.script.display()))?;
    info!(
        "Replaying {} events from {}",
        script.events.len(),
        args.script.display()
    );

    let mut replayer = Replayer::new();
    let report = replayer.run(&script, flags, config.session_options())?;
    if replayer.violations() > 0 {
        output::warning(&format!(
            "{} call stack violation(s) ignored",
            replayer.violations()
        ));
    }

    if let Some(path) = &args.json {
        json::generate_json(&report, path)?;
        output::success(&format!("JSON report written to {}", path.display()));
    }
    if let Some(path) = &args.bin {
        binary::generate_binary(&report, path)?;
        output::success(&format!("Binary report written to {}", path.display()));
    }

    output::print_report(&report, args.top);
    Ok(())
}
