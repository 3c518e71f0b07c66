//! Call collection: frame pool, symbol filter, call stack and stats

pub mod pool;
pub mod stack;
pub mod stats;
pub mod symbols;

pub use stack::{CallStack, FrameHandle};
pub use stats::StatsAggregator;
pub use symbols::{inline_hash, FilterMode, SymbolFilter, ROOT_SYMBOL};
