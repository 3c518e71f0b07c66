//! Binary output
//!
//! Session reports in the versioned bincode envelope

use anyhow::{Context, Result};
use callspan_shared::protocol::wire::ReportEnvelope;
use callspan_shared::SessionReport;
use std::path::Path;
use tracing::info;

/// Write `report` to `output_path` inside a wire envelope
pub fn generate_binary(report: &SessionReport, output_path: &Path) -> Result<()> {
    let bytes = ReportEnvelope::new(report.clone())
        .to_bytes()
        .context("Failed to encode session report")?;
    std::fs::write(output_path, &bytes)
        .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;

    info!(
        "Binary output written to {} ({} bytes)",
        output_path.display(),
        bytes.len()
    );
    Ok(())
}

/// Read a report written by [`generate_binary`]
pub fn read_binary(path: &Path) -> Result<SessionReport> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    let envelope = ReportEnvelope::from_bytes(&bytes)
        .with_context(|| format!("Failed to decode report: {}", path.display()))?;
    Ok(envelope.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use callspan_shared::{CompileStats, Flags, Span, SpanId};

    #[test]
    fn test_binary_file_round_trip() {
        let mut span = Span::new(SpanId(0), "app");
        span.annotations.insert("cpu".into(), "12".into());
        let report = SessionReport {
            flags: Flags::GATHER_MEMORY,
            started_at_ns: 42,
            duration_us: 7,
            stats: Default::default(),
            spans: vec![span],
            transaction_name: Some("home".into()),
            exception: None,
            compile: CompileStats::default(),
            dropped_spans: 3,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.bin");
        generate_binary(&report, &path).unwrap();
        assert_eq!(read_binary(&path).unwrap(), report);
    }

    #[test]
    fn test_read_binary_rejects_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.bin");
        std::fs::write(&path, b"{\"flags\": 0}").unwrap();
        assert!(read_binary(&path).is_err());
    }
}
