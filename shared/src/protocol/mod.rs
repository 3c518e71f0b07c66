//! Binary handoff format for session reports
//!
//! The glue layer that collects reports from the engine ships them as a
//! versioned bincode envelope.

pub mod wire;
