//! Generic extractors
//!
//! A handful of parameterized extractors cover the usual shapes of library
//! instrumentation: a span per call, a span annotated from an argument, a
//! span shared by title. They are built from [`ExtractorRule`]s in the agent
//! configuration or picked by category hint in `register_watch`.

use crate::error::AgentError;
use crate::spans::registry::{CallContext, ExtractResult, Extractor, SpanDraft};
use callspan_shared::utils::{base_filename, url_summary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenericExtractor {
    /// New span titled with the symbol
    Call { category: String },
    /// New span annotated with one string argument
    Argument {
        category: String,
        key: String,
        index: usize,
    },
    /// Span shared by every call with the same string argument
    Cached { category: String, index: usize },
    /// Span shared by template, titled with the short file name
    View { category: String, index: usize },
    /// Span shared by receiver class
    Receiver { category: String },
    /// Span shared by every call of the symbol
    Fixed { category: String, title: String },
    /// `http` span annotated with a sanitized URL
    Url { index: usize },
}

impl GenericExtractor {
    /// Extractor picked by a watch category hint
    pub fn for_hint(hint: &str) -> Self {
        match hint {
            "view" => GenericExtractor::View {
                category: "view".to_string(),
                index: 0,
            },
            "event" => GenericExtractor::Cached {
                category: "event".to_string(),
                index: 0,
            },
            _ => GenericExtractor::Call {
                category: "php".to_string(),
            },
        }
    }
}

impl Extractor for GenericExtractor {
    fn extract(&self, call: &CallContext<'_>) -> ExtractResult {
        let draft = match self {
            GenericExtractor::Call { category } => {
                SpanDraft::new(category.as_str()).with_annotation("title", call.symbol)
            }
            GenericExtractor::Argument {
                category,
                key,
                index,
            } => {
                let value = call.str_arg(*index)?;
                SpanDraft::new(category.as_str()).with_annotation(key.as_str(), value)
            }
            GenericExtractor::Cached { category, index } => {
                SpanDraft::cached(category.as_str(), call.str_arg(*index)?)
            }
            GenericExtractor::View { category, index } => {
                SpanDraft::cached(category.as_str(), base_filename(call.str_arg(*index)?))
            }
            GenericExtractor::Receiver { category } => {
                SpanDraft::cached(category.as_str(), call.receiver_class()?)
            }
            GenericExtractor::Fixed { category, title } => {
                SpanDraft::cached(category.as_str(), title.as_str())
            }
            GenericExtractor::Url { index } => {
                let raw = call.str_arg(*index)?;
                // Local paths and stream wrappers without a scheme are not HTTP calls
                let Some(url) = url_summary(raw) else {
                    return Ok(None);
                };
                SpanDraft::new("http").with_annotation("url", url)
            }
        };
        Ok(Some(draft))
    }
}

/// Shape of a configured extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Call,
    Argument,
    Cached,
    View,
    Receiver,
    Fixed,
    Url,
}

/// One configured extractor bound to a set of symbols
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorRule {
    pub kind: RuleKind,

    /// Fully-qualified symbols the extractor is bound to
    pub symbols: Vec<String>,

    #[serde(default)]
    pub category: Option<String>,

    /// Positional argument to read
    #[serde(default)]
    pub index: usize,

    /// Annotation key (`argument` rules)
    #[serde(default)]
    pub key: Option<String>,

    /// Constant title (`fixed` rules)
    #[serde(default)]
    pub title: Option<String>,
}

impl ExtractorRule {
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.symbols.is_empty() || self.symbols.iter().any(|s| s.is_empty()) {
            return Err(AgentError::Invalid(format!(
                "{:?} extractor rule needs at least one non-empty symbol",
                self.kind
            )));
        }
        if self.category.as_deref() == Some("") {
            return Err(AgentError::Invalid("extractor category is empty".to_string()));
        }

        let missing = match self.kind {
            RuleKind::Argument if self.key.is_none() => Some("key"),
            RuleKind::Cached if self.category.is_none() => Some("category"),
            RuleKind::Fixed if self.category.is_none() => Some("category"),
            RuleKind::Fixed if self.title.is_none() => Some("title"),
            _ => None,
        };
        match missing {
            Some(field) => Err(AgentError::Invalid(format!(
                "{:?} extractor rule for {} is missing `{}`",
                self.kind, self.symbols[0], field
            ))),
            None => Ok(()),
        }
    }

    /// Build the extractor this rule describes
    pub fn build(&self) -> Result<GenericExtractor, AgentError> {
        self.validate()?;

        let category = |default: &str| self.category.clone().unwrap_or_else(|| default.to_string());
        let extractor = match self.kind {
            RuleKind::Call => GenericExtractor::Call {
                category: category("php"),
            },
            RuleKind::Argument => {
                let key = self.key.clone().unwrap_or_default();
                GenericExtractor::Argument {
                    category: category(&key),
                    key,
                    index: self.index,
                }
            }
            RuleKind::Cached => GenericExtractor::Cached {
                category: category("php"),
                index: self.index,
            },
            RuleKind::View => GenericExtractor::View {
                category: category("view"),
                index: self.index,
            },
            RuleKind::Receiver => GenericExtractor::Receiver {
                category: category("view"),
            },
            RuleKind::Fixed => GenericExtractor::Fixed {
                category: category("php"),
                title: self.title.clone().unwrap_or_default(),
            },
            RuleKind::Url => GenericExtractor::Url { index: self.index },
        };
        Ok(extractor)
    }

    /// `(symbol, extractor)` pairs ready for registration
    pub fn bindings(&self) -> Result<Vec<(String, Arc<dyn Extractor>)>, AgentError> {
        let extractor: Arc<dyn Extractor> = Arc::new(self.build()?);
        Ok(self
            .symbols
            .iter()
            .map(|s| (s.clone(), Arc::clone(&extractor)))
            .collect())
    }
}
