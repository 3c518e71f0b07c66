//! Shared types and utilities for callspan
//!
//! This crate contains the data structures exchanged between the profiling
//! engine, the replay CLI and whatever glue layer consumes session reports.

pub mod protocol;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{events::*, flags::*, report::*, span::*, stats::*, value::*};
