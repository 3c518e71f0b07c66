//! Session feature flags
//!
//! Bit values match the profiler's historical flag constants so that callers
//! passing raw integers keep working.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use thiserror::Error;

/// Bitmask of session toggles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u32);

impl Flags {
    /// Do not profile builtin (runtime-provided) functions
    pub const NO_BUILTIN_CALLS: Flags = Flags(0x0001);
    /// Gather CPU time per call
    pub const GATHER_CPU_TIME: Flags = Flags(0x0002);
    /// Gather memory and peak memory deltas per call
    pub const GATHER_MEMORY: Flags = Flags(0x0004);
    /// Do not profile userland functions
    pub const NO_USERLAND_CALLS: Flags = Flags(0x0008);
    /// Ignore compile-unit notifications
    pub const NO_COMPILE_TRACKING: Flags = Flags(0x0010);
    /// Disable the span tree and the extractor registry
    pub const NO_SPANS: Flags = Flags(0x0020);
    /// Disable recursion tracking and the hierarchical stats table
    pub const NO_HIERARCHICAL_STATS: Flags = Flags(0x0040);

    const ALL: [(&'static str, Flags); 7] = [
        ("no_builtin_calls", Flags::NO_BUILTIN_CALLS),
        ("gather_cpu_time", Flags::GATHER_CPU_TIME),
        ("gather_memory", Flags::GATHER_MEMORY),
        ("no_userland_calls", Flags::NO_USERLAND_CALLS),
        ("no_compile_tracking", Flags::NO_COMPILE_TRACKING),
        ("no_spans", Flags::NO_SPANS),
        ("no_hierarchical_stats", Flags::NO_HIERARCHICAL_STATS),
    ];

    /// No flags set
    pub const fn empty() -> Self {
        Flags(0)
    }

    /// Build from a raw bitmask; unknown bits are dropped
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Flags(bits & 0x007f)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    /// Parse a list of flag names, combining them into one mask
    pub fn from_names<I, S>(names: I) -> Result<Self, FlagParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .try_fold(Flags::empty(), |acc, name| Ok(acc | name.as_ref().parse()?))
    }

    /// Names of the flags that are set, in bit order
    pub fn names(self) -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

/// Unknown flag name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown profiler flag: {0}")]
pub struct FlagParseError(pub String);

impl FromStr for Flags {
    type Err = FlagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, flag)| *flag)
            .ok_or_else(|| FlagParseError(s.to_string()))
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_names_parse() {
        assert_eq!("gather_cpu_time".parse::<Flags>().unwrap(), Flags::GATHER_CPU_TIME);
        assert_eq!("NO-SPANS".parse::<Flags>().unwrap(), Flags::NO_SPANS);
        assert!("turbo".parse::<Flags>().is_err());
    }

    #[test]
    fn test_from_names_combines() {
        let flags = Flags::from_names(["gather_memory", "no_spans"]).unwrap();
        assert!(flags.contains(Flags::GATHER_MEMORY));
        assert!(flags.contains(Flags::NO_SPANS));
        assert!(!flags.contains(Flags::GATHER_CPU_TIME));
        assert_eq!(flags.bits(), 0x24);
    }

    #[test]
    fn test_truncate_drops_unknown_bits() {
        let flags = Flags::from_bits_truncate(0xff02);
        assert_eq!(flags, Flags::GATHER_CPU_TIME);
    }

    #[test]
    fn test_display() {
        assert_eq!(Flags::empty().to_string(), "none");
        let flags = Flags::NO_BUILTIN_CALLS | Flags::NO_SPANS;
        assert_eq!(flags.to_string(), "no_builtin_calls|no_spans");
    }
}
