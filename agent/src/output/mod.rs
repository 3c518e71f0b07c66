//! Report output formats

pub mod binary;
pub mod json;

use anyhow::{Context, Result};
use callspan_shared::SessionReport;
use std::path::Path;

/// Load a report written in either format. JSON is recognized by its
/// leading `{`.
pub fn read_report(path: &Path) -> Result<SessionReport> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => json::read_json(path),
        _ => binary::read_binary(path),
    }
}
