//! Frame pool
//!
//! Slab of call-frame records reused across calls and sessions. Released
//! slots go onto a free list and keep their symbol buffer, so steady-state
//! enter/leave does not touch the allocator. Handles carry a generation
//! number; a handle to a released slot no longer resolves.

use callspan_shared::SpanId;

/// Handle to an active frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle {
    index: u32,
    generation: u32,
}

impl FrameHandle {
    pub fn index(self) -> u32 {
        self.index
    }
}

/// One active call
#[derive(Debug, Default)]
pub struct Frame {
    pub symbol: String,
    pub recursion_level: u32,
    /// Wall clock at entry, host microseconds
    pub wall_start: u64,
    pub cpu_start: Option<u64>,
    pub mem_start: Option<i64>,
    pub peak_mem_start: Option<i64>,
    pub hash: u8,
    pub span: Option<SpanId>,
    /// Slot index of the calling frame
    pub prev: Option<u32>,
    /// Whether this frame bumped its recursion bucket counter
    pub(crate) counted: bool,
    generation: u32,
}

impl Frame {
    /// Overwrite every field for a new call; reuses the symbol buffer
    fn init(&mut self, symbol: &str, hash: u8, prev: Option<u32>) {
        self.symbol.clear();
        self.symbol.push_str(symbol);
        self.recursion_level = 0;
        self.wall_start = 0;
        self.cpu_start = None;
        self.mem_start = None;
        self.peak_mem_start = None;
        self.hash = hash;
        self.span = None;
        self.prev = prev;
        self.counted = false;
    }
}

/// Slab allocator for frames
#[derive(Debug, Default)]
pub struct FramePool {
    slots: Vec<Frame>,
    free: Vec<u32>,
}

impl FramePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a slot and initialize it for `symbol`
    pub fn acquire(&mut self, symbol: &str, hash: u8, prev: Option<u32>) -> FrameHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Frame::default());
                (self.slots.len() - 1) as u32
            }
        };

        let frame = &mut self.slots[index as usize];
        frame.init(symbol, hash, prev);
        FrameHandle {
            index,
            generation: frame.generation,
        }
    }

    /// Return a slot to the free list. Stale handles are ignored.
    pub fn release(&mut self, handle: FrameHandle) -> bool {
        match self.slots.get_mut(handle.index as usize) {
            Some(frame) if frame.generation == handle.generation => {
                frame.generation = frame.generation.wrapping_add(1);
                self.free.push(handle.index);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, handle: FrameHandle) -> Option<&Frame> {
        self.slots
            .get(handle.index as usize)
            .filter(|f| f.generation == handle.generation)
    }

    pub fn get_mut(&mut self, handle: FrameHandle) -> Option<&mut Frame> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|f| f.generation == handle.generation)
    }

    /// Frame by raw slot index, used when following `prev` links
    pub fn slot(&self, index: u32) -> Option<&Frame> {
        self.slots.get(index as usize)
    }

    /// Handle for the frame currently occupying `index`
    pub fn handle_at(&self, index: u32) -> Option<FrameHandle> {
        self.slots.get(index as usize).map(|f| FrameHandle {
            index,
            generation: f.generation,
        })
    }

    /// Slots handed out and not yet released
    pub fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Total slots ever allocated
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Drop every slot. Outstanding handles become invalid.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release_reuses_slot() {
        let mut pool = FramePool::new();
        let a = pool.acquire("foo", 1, None);
        assert_eq!(pool.in_use(), 1);
        assert!(pool.release(a));

        let b = pool.acquire("bar", 2, None);
        assert_eq!(a.index(), b.index());
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.get(b).map(|f| f.symbol.as_str()), Some("bar"));
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let mut pool = FramePool::new();
        let a = pool.acquire("foo", 1, None);
        pool.release(a);
        let _b = pool.acquire("bar", 2, None);

        assert!(pool.get(a).is_none());
        assert!(!pool.release(a));
        assert_eq!(pool.in_use(), 1);
    }

    #[test]
    fn test_reused_frame_is_fully_reset() {
        let mut pool = FramePool::new();
        let a = pool.acquire("foo", 1, None);
        {
            let frame = pool.get_mut(a).unwrap();
            frame.recursion_level = 4;
            frame.cpu_start = Some(10);
            frame.span = Some(SpanId(3));
        }
        pool.release(a);

        let b = pool.acquire("x", 9, Some(0));
        let frame = pool.get(b).unwrap();
        assert_eq!(frame.recursion_level, 0);
        assert_eq!(frame.cpu_start, None);
        assert_eq!(frame.span, None);
        assert_eq!(frame.prev, Some(0));
        assert_eq!(frame.hash, 9);
    }
}
