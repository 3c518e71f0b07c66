//! Symbol hashing and the ignore/include filter
//!
//! Every symbol is reduced to an 8-bit hash. The filter keeps one bit per
//! hash bucket so most lookups are rejected without a string comparison;
//! only a bitmap hit falls through to the exact name list.

use crate::error::AgentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Entry point of the monitored program; never dropped by a whitelist
pub const ROOT_SYMBOL: &str = "main()";

/// 8-bit multiplicative string hash (`h = h * 33 + byte`)
#[inline]
pub fn inline_hash(symbol: &str) -> u8 {
    symbol
        .bytes()
        .fold(0u8, |h, b| (h << 5).wrapping_add(h).wrapping_add(b))
}

/// How the configured name list is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Profile everything
    #[default]
    Disabled,
    /// Drop listed symbols
    Blacklist,
    /// Drop everything except listed symbols and the root symbol
    Whitelist,
}

impl FromStr for FilterMode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "none" | "off" => Ok(FilterMode::Disabled),
            "blacklist" | "ignore" => Ok(FilterMode::Blacklist),
            "whitelist" | "include" => Ok(FilterMode::Whitelist),
            _ => Err(AgentError::FilterMode(s.to_string())),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterMode::Disabled => "disabled",
            FilterMode::Blacklist => "blacklist",
            FilterMode::Whitelist => "whitelist",
        };
        f.write_str(name)
    }
}

/// Bitmap plus exact list over symbol names
#[derive(Debug, Clone, Default)]
pub struct SymbolFilter {
    mode: FilterMode,
    bitmap: [u8; 32],
    names: Vec<String>,
}

impl SymbolFilter {
    /// A filter that keeps every symbol
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Build a filter. An empty name list disables filtering in either mode.
    pub fn new<I, S>(mode: FilterMode, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self {
            mode,
            ..Self::default()
        };

        for name in names {
            let name = name.as_ref();
            if name.is_empty() || filter.names.iter().any(|n| n == name) {
                continue;
            }
            let hash = inline_hash(name);
            filter.bitmap[(hash >> 3) as usize] |= 1 << (hash & 7);
            filter.names.push(name.to_string());
        }

        if filter.names.is_empty() {
            filter.mode = FilterMode::Disabled;
        }

        debug!(
            "Built symbol filter: mode={}, names={}",
            filter.mode,
            filter.names.len()
        );
        filter
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Bitmap check only; `false` means the symbol is definitely not listed
    #[inline]
    pub fn may_contain(&self, hash: u8) -> bool {
        self.bitmap[(hash >> 3) as usize] & (1 << (hash & 7)) != 0
    }

    /// Exact membership, short-circuited by the bitmap
    pub fn contains(&self, hash: u8, symbol: &str) -> bool {
        self.may_contain(hash) && self.names.iter().any(|n| n == symbol)
    }

    /// Whether a call to `symbol` should be profiled
    #[inline]
    pub fn should_profile(&self, hash: u8, symbol: &str) -> bool {
        match self.mode {
            FilterMode::Disabled => true,
            FilterMode::Blacklist => !self.contains(hash, symbol),
            FilterMode::Whitelist => symbol == ROOT_SYMBOL || self.contains(hash, symbol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keeps(filter: &SymbolFilter, symbol: &str) -> bool {
        filter.should_profile(inline_hash(symbol), symbol)
    }

    #[test]
    fn test_inline_hash_wraps() {
        assert_eq!(inline_hash(""), 0);
        assert_eq!(inline_hash("a"), b'a');
        // 'a' * 33 + 'b' = 3299 = 0xce3
        assert_eq!(inline_hash("ab"), 0xe3);
    }

    #[test]
    fn test_disabled_keeps_everything() {
        let filter = SymbolFilter::disabled();
        assert!(keeps(&filter, "foo"));
        assert!(keeps(&filter, ROOT_SYMBOL));
    }

    #[test]
    fn test_blacklist() {
        let filter = SymbolFilter::new(FilterMode::Blacklist, ["strlen", "count"]);
        assert!(!keeps(&filter, "strlen"));
        assert!(!keeps(&filter, "count"));
        assert!(keeps(&filter, "foo"));
        assert!(keeps(&filter, ROOT_SYMBOL));
    }

    #[test]
    fn test_blacklist_can_drop_root_when_listed() {
        let filter = SymbolFilter::new(FilterMode::Blacklist, [ROOT_SYMBOL]);
        assert!(!keeps(&filter, ROOT_SYMBOL));
    }

    #[test]
    fn test_whitelist_keeps_root() {
        let filter = SymbolFilter::new(FilterMode::Whitelist, ["foo"]);
        assert!(keeps(&filter, "foo"));
        assert!(keeps(&filter, ROOT_SYMBOL));
        assert!(!keeps(&filter, "bar"));
    }

    #[test]
    fn test_hash_collision_falls_back_to_exact_list() {
        // Find a different name sharing the bucket of "foo"
        let target = inline_hash("foo");
        let twin = (0..10_000)
            .map(|i| format!("f{}", i))
            .find(|s| inline_hash(s) == target && s != "foo")
            .unwrap();

        let filter = SymbolFilter::new(FilterMode::Blacklist, ["foo"]);
        assert!(filter.may_contain(inline_hash(&twin)));
        assert!(keeps(&filter, &twin));
    }

    #[test]
    fn test_empty_list_disables() {
        let filter = SymbolFilter::new(FilterMode::Whitelist, Vec::<String>::new());
        assert_eq!(filter.mode(), FilterMode::Disabled);
        assert!(keeps(&filter, "anything"));
    }

    #[test]
    fn test_filter_mode_from_str() {
        assert_eq!("Whitelist".parse::<FilterMode>().unwrap(), FilterMode::Whitelist);
        assert_eq!("ignore".parse::<FilterMode>().unwrap(), FilterMode::Blacklist);
        assert!("sometimes".parse::<FilterMode>().is_err());
    }
}
