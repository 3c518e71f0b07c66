//! Host adapter: the clocks and counters the engine reads at call boundaries
//!
//! The engine never reads time or memory directly. Everything goes through a
//! `HostAdapter` registered once when the engine is built, so a runtime
//! binding, a test, or the replay tool can supply its own notion of time.

use std::cell::Cell;
use std::time::Instant;

/// Garbage-collector counters reported by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcCounters {
    /// Number of collection runs so far
    pub runs: u64,
    /// Number of collected items so far
    pub collected: u64,
}

/// Timing and memory primitives consumed by the engine.
///
/// Units must be consistent for the lifetime of a session: microseconds for
/// clocks, bytes for memory.
pub trait HostAdapter {
    /// Monotonic wall clock in microseconds
    fn now_wall_us(&self) -> u64;

    /// CPU time consumed by the monitored program in microseconds
    fn now_cpu_us(&self) -> u64;

    /// Current memory usage in bytes
    fn memory_usage(&self) -> i64;

    /// Peak memory usage in bytes
    fn memory_peak(&self) -> i64;

    /// Collector counters, if the host has a collector
    fn gc_counters(&self) -> Option<GcCounters> {
        None
    }
}

/// Host backed by the operating system's clocks
#[derive(Debug, Clone)]
pub struct SystemHost {
    epoch: Instant,
}

impl SystemHost {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostAdapter for SystemHost {
    fn now_wall_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn now_cpu_us(&self) -> u64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
        let ret = unsafe { libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, &mut ts) };
        if ret != 0 {
            return 0;
        }
        ts.tv_sec as u64 * 1_000_000 + ts.tv_nsec as u64 / 1_000
    }

    fn memory_usage(&self) -> i64 {
        resident_bytes().unwrap_or(0)
    }

    fn memory_peak(&self) -> i64 {
        // SAFETY: rusage is plain old data; zeroed is a valid initial value.
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        // SAFETY: `usage` is a valid, writable rusage struct.
        let ret = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
        if ret != 0 {
            return 0;
        }
        // ru_maxrss is reported in kilobytes on Linux and bytes on macOS
        if cfg!(target_os = "macos") {
            usage.ru_maxrss as i64
        } else {
            usage.ru_maxrss as i64 * 1024
        }
    }
}

#[cfg(target_os = "linux")]
fn resident_bytes() -> Option<i64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: i64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    // SAFETY: sysconf has no memory-safety preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    Some(pages * page_size as i64)
}

#[cfg(not(target_os = "linux"))]
fn resident_bytes() -> Option<i64> {
    None
}

/// Host whose clocks only move when told to.
///
/// Used by tests and by the replay tool, which feeds recorded timestamps.
#[derive(Debug, Default)]
pub struct ManualHost {
    wall: Cell<u64>,
    cpu: Cell<u64>,
    memory: Cell<i64>,
    peak: Cell<i64>,
    gc: Cell<Option<GcCounters>>,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_wall(&self, us: u64) {
        self.wall.set(us);
    }

    /// Move the wall clock forward
    pub fn advance(&self, us: u64) {
        self.wall.set(self.wall.get() + us);
    }

    pub fn set_cpu(&self, us: u64) {
        self.cpu.set(us);
    }

    pub fn advance_cpu(&self, us: u64) {
        self.cpu.set(self.cpu.get() + us);
    }

    /// Set current memory usage; the peak follows upward moves
    pub fn set_memory(&self, bytes: i64) {
        self.memory.set(bytes);
        if bytes > self.peak.get() {
            self.peak.set(bytes);
        }
    }

    pub fn set_gc(&self, counters: GcCounters) {
        self.gc.set(Some(counters));
    }
}

impl HostAdapter for ManualHost {
    fn now_wall_us(&self) -> u64 {
        self.wall.get()
    }

    fn now_cpu_us(&self) -> u64 {
        self.cpu.get()
    }

    fn memory_usage(&self) -> i64 {
        self.memory.get()
    }

    fn memory_peak(&self) -> i64 {
        self.peak.get()
    }

    fn gc_counters(&self) -> Option<GcCounters> {
        self.gc.get()
    }
}
