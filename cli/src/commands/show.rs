//! Show command implementation

use crate::output;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Report file written by `replay --json` or `replay --bin`
    pub report: PathBuf,

    /// Number of stats entries to print
    #[arg(short, long, default_value = "20")]
    pub top: usize,

    /// Also list every span
    #[arg(long)]
    pub spans: bool,
}

pub fn run(args: ShowArgs) -> Result<()> {
    let report = callspan_agent::output::read_report(&args.report)?;
    output::print_report(&report, args.top);
    if args.spans {
        output::print_spans(&report);
    }
    Ok(())
}
