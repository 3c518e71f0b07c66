//! Wire envelope for session reports.
//!
//! Uses bincode with an explicit config so producer and consumer always use
//! the same encoding (fixint for lengths and enums). Payloads written with
//! bincode's default varint encoding are still accepted on decode.

use crate::types::report::SessionReport;
use anyhow::Result;
use bincode::Options;

/// Envelope version
pub const PROTOCOL_VERSION: u32 = 1;

fn wire_bincode() -> impl bincode::config::Options {
    bincode::config::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// Versioned report envelope
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReportEnvelope {
    pub version: u32,
    pub report: SessionReport,
}

impl ReportEnvelope {
    pub fn new(report: SessionReport) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            report,
        }
    }

    /// Serialize to bytes (bincode, fixint encoding).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        wire_bincode().serialize(self).map_err(Into::into)
    }

    /// Deserialize from bytes, validating the envelope version.
    ///
    /// Tries fixint first, then bincode's default varint encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if let Ok(envelope) = wire_bincode().deserialize::<Self>(bytes) {
            if envelope.version == PROTOCOL_VERSION {
                return Ok(envelope);
            }
        }
        if let Ok(envelope) = bincode::DefaultOptions::new().deserialize::<Self>(bytes) {
            if envelope.version == PROTOCOL_VERSION {
                return Ok(envelope);
            }
        }
        anyhow::bail!("failed to decode report envelope (version {})", PROTOCOL_VERSION)
    }
}
