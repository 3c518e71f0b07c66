//! Trace spans: the bounded span list, the extractor registry and the
//! generic extractors

pub mod builtin;
pub mod registry;
pub mod tree;

pub use builtin::{ExtractorRule, GenericExtractor, RuleKind};
pub use registry::{
    CallContext, ExtractResult, Extractor, ExtractorRegistry, SpanDraft, WatchCallback,
};
pub use tree::{SpanTree, MAX_ANNOTATION_LEN, MAX_SPANS};
