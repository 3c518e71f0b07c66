//! Data model shared by the engine and its consumers

pub mod events;
pub mod flags;
pub mod report;
pub mod span;
pub mod stats;
pub mod value;
