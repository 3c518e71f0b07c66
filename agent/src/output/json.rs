//! JSON output
//!
//! Writes a session report as pretty-printed JSON and reads it back

use anyhow::{Context, Result};
use callspan_shared::SessionReport;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// Write `report` to `output_path` as JSON
pub fn generate_json(report: &SessionReport, output_path: &Path) -> Result<()> {
    info!("Generating JSON output: {}", output_path.display());

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;

    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, report)
        .context("Failed to serialize session report to JSON")?;

    info!("JSON output written to {}", output_path.display());

    Ok(())
}

/// Read a report written by [`generate_json`]
pub fn read_json(path: &Path) -> Result<SessionReport> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open report: {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse JSON report: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use callspan_shared::{CompileStats, Flags, Span, SpanId, StatsEntry};

    fn report() -> SessionReport {
        let mut stats = callspan_shared::StatsTable::new();
        stats.insert(
            "main()==>foo".to_string(),
            StatsEntry {
                calls: 3,
                wall_us: 1_200,
                ..StatsEntry::default()
            },
        );
        let mut span = Span::new(SpanId(0), "app");
        span.starts.push(0.0);
        span.stops.push(1_500.0);

        SessionReport {
            flags: Flags::empty(),
            started_at_ns: 0,
            duration_us: 1_500,
            stats,
            spans: vec![span],
            transaction_name: None,
            exception: None,
            compile: CompileStats::default(),
            dropped_spans: 0,
        }
    }

    #[test]
    fn test_generate_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_path = temp_dir.path().join("report.json");

        generate_json(&report(), &output_path).unwrap();
        assert!(output_path.exists());

        // Stats use the short field names
        let contents = std::fs::read_to_string(&output_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["stats"]["main()==>foo"]["ct"], 3);
        assert_eq!(parsed["spans"][0]["n"], "app");

        assert_eq!(read_json(&output_path).unwrap(), report());
    }

    #[test]
    fn test_read_json_missing_file() {
        assert!(read_json(Path::new("/nonexistent/report.json")).is_err());
    }
}
