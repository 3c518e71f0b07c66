//! Active call stack
//!
//! Frames live in the pool and link to their caller through `prev`. Pops
//! must match the current top exactly; anything else is reported as a
//! [`StackViolation`] and leaves the stack as it was.

use super::pool::{Frame, FramePool};
use crate::error::StackViolation;
use callspan_shared::utils::truncate_str;
use callspan_shared::STACK_DELIMITER;
use std::fmt::Write;

pub use super::pool::FrameHandle;

/// Size of the buffer qualified names are built in
pub const SCRATCH_BUF_LEN: usize = 512;

/// Linked stack of active frames with per-bucket recursion counters
#[derive(Debug)]
pub struct CallStack {
    pool: FramePool,
    top: Option<FrameHandle>,
    depth: usize,
    /// Active frames per symbol hash bucket
    buckets: [u32; 256],
    scratch: String,
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStack {
    pub fn new() -> Self {
        Self {
            pool: FramePool::new(),
            top: None,
            depth: 0,
            buckets: [0; 256],
            scratch: String::with_capacity(SCRATCH_BUF_LEN),
        }
    }

    pub fn top(&self) -> Option<FrameHandle> {
        self.top
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }

    pub fn frame(&self, handle: FrameHandle) -> Option<&Frame> {
        self.pool.get(handle)
    }

    pub fn frame_mut(&mut self, handle: FrameHandle) -> Option<&mut Frame> {
        self.pool.get_mut(handle)
    }

    /// Active frames on the given hash bucket
    pub fn bucket_count(&self, hash: u8) -> u32 {
        self.buckets[hash as usize]
    }

    /// Push a frame for `symbol`.
    ///
    /// With `track_recursion` the recursion level is derived from the
    /// nearest active frame with the same symbol. The scan is skipped when
    /// no active frame shares the hash bucket.
    pub fn push(&mut self, symbol: &str, hash: u8, track_recursion: bool) -> FrameHandle {
        let mut level = 0;
        if track_recursion {
            if self.buckets[hash as usize] > 0 {
                level = self.find_recursion_level(symbol);
            }
            self.buckets[hash as usize] += 1;
        }

        let prev = self.top.map(FrameHandle::index);
        let handle = self.pool.acquire(symbol, hash, prev);
        if let Some(frame) = self.pool.get_mut(handle) {
            frame.recursion_level = level;
            frame.counted = track_recursion;
        }

        self.top = Some(handle);
        self.depth += 1;
        handle
    }

    fn find_recursion_level(&self, symbol: &str) -> u32 {
        let mut cursor = self.top.and_then(|h| self.pool.get(h));
        while let Some(frame) = cursor {
            if frame.symbol == symbol {
                return frame.recursion_level + 1;
            }
            cursor = frame.prev.and_then(|i| self.pool.slot(i));
        }
        0
    }

    /// Confirm `handle` is the current top
    pub fn check_top(&self, handle: FrameHandle) -> Result<&Frame, StackViolation> {
        let violation = StackViolation {
            expected: self.top,
            got: handle,
        };
        if self.top != Some(handle) {
            return Err(violation);
        }
        self.pool.get(handle).ok_or(violation)
    }

    /// `caller==>callee` name of the frame, recursion levels appended as
    /// `@n`. Names longer than the scratch buffer are cut.
    pub fn qualified_name(&mut self, handle: FrameHandle) -> &str {
        self.scratch.clear();
        let Some(frame) = self.pool.get(handle) else {
            return &self.scratch;
        };

        if let Some(caller) = frame.prev.and_then(|i| self.pool.slot(i)) {
            push_entry_name(&mut self.scratch, caller);
            self.scratch.push_str(STACK_DELIMITER);
        }
        push_entry_name(&mut self.scratch, frame);

        let keep = truncate_str(&self.scratch, SCRATCH_BUF_LEN).len();
        self.scratch.truncate(keep);
        &self.scratch
    }

    /// Pop the top frame and return its slot to the pool
    pub fn pop(&mut self, handle: FrameHandle) -> Result<(), StackViolation> {
        let (hash, counted, prev) = {
            let frame = self.check_top(handle)?;
            (frame.hash, frame.counted, frame.prev)
        };

        if counted {
            let bucket = &mut self.buckets[hash as usize];
            *bucket = bucket.saturating_sub(1);
        }

        self.top = prev.and_then(|i| self.pool.handle_at(i));
        self.depth -= 1;
        self.pool.release(handle);
        Ok(())
    }

    /// Symbols from the top of the stack down
    pub fn symbols(&self) -> Vec<&str> {
        let mut out = Vec::with_capacity(self.depth);
        let mut cursor = self.top.and_then(|h| self.pool.get(h));
        while let Some(frame) = cursor {
            out.push(frame.symbol.as_str());
            cursor = frame.prev.and_then(|i| self.pool.slot(i));
        }
        out
    }

    /// Forget all frames and counters, keeping pooled slots for reuse
    pub fn reset(&mut self) {
        while let Some(top) = self.top {
            if self.pop(top).is_err() {
                break;
            }
        }
        self.top = None;
        self.depth = 0;
        self.buckets = [0; 256];
    }

    /// Release the pooled slots as well
    pub fn release_pool(&mut self) {
        self.reset();
        self.pool.clear();
    }

    pub fn pool(&self) -> &FramePool {
        &self.pool
    }
}

fn push_entry_name(buf: &mut String, frame: &Frame) {
    buf.push_str(&frame.symbol);
    if frame.recursion_level > 0 {
        let _ = write!(buf, "@{}", frame.recursion_level);
    }
}
