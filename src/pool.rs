//! Reusable canonical frame buffers.
//!
//! Readback completions arrive every frame and each needs a full-size copy
//! of the transferred pixels. [`FramePool`] keeps a bounded set of
//! [`FrameBuffer`]s alive so that steady-state capture performs no heap
//! allocation: a buffer returned by dispatch is handed to the next ingest
//! with its storage intact.
//!
//! # Ownership
//!
//! A buffer is owned by exactly one party at a time: the pool (free list),
//! the ingest path while it copies, the ready queue, or a dispatch call.
//! The pool only counts buffers it handed out; it never holds references to
//! them.

use crate::format::{PixelFormat, CANONICAL_BYTES_PER_PIXEL, CANONICAL_FORMAT};

/// A canonical-format frame buffer.
#[derive(Debug)]
pub struct FrameBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    sequence: u64,
}

impl FrameBuffer {
    /// Allocate a zeroed buffer for a `width × height` frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; frame_len(width, height)],
            width,
            height,
            sequence: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row, always `width * 4`.
    pub fn stride(&self) -> u32 {
        self.width * CANONICAL_BYTES_PER_PIXEL
    }

    pub fn format(&self) -> PixelFormat {
        CANONICAL_FORMAT
    }

    /// Readback sequence number of the frame currently stored.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Pixels as `[b, g, r, a]` quadruples.
    pub fn pixels(&self) -> &[[u8; 4]] {
        bytemuck::cast_slice(&self.data)
    }

    /// Storage capacity in bytes, which may exceed the current frame size.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Re-shape for a new frame size, keeping the allocation where possible.
    pub(crate) fn reshape(&mut self, width: u32, height: u32) {
        if self.width != width || self.height != height {
            self.data.resize(frame_len(width, height), 0);
            self.width = width;
            self.height = height;
        }
    }
}

fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * CANONICAL_BYTES_PER_PIXEL as usize
}

/// Bounded pool of [`FrameBuffer`]s.
#[derive(Debug)]
pub struct FramePool {
    free: Vec<FrameBuffer>,
    capacity: usize,
    allocated: usize,
}

impl FramePool {
    /// Create an empty pool that will hand out at most `capacity` buffers.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            free: Vec::with_capacity(capacity),
            capacity,
            allocated: 0,
        }
    }

    /// Maximum number of live buffers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live buffers, free or checked out.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Number of buffers waiting in the free list.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Number of buffers currently checked out.
    pub fn checked_out(&self) -> usize {
        self.allocated - self.free.len()
    }

    /// Take a buffer shaped for `width × height`.
    ///
    /// Reuses a free buffer when one exists, allocates while under capacity,
    /// and returns `None` once every buffer is checked out.
    pub fn acquire(&mut self, width: u32, height: u32) -> Option<FrameBuffer> {
        if let Some(mut buffer) = self.free.pop() {
            buffer.reshape(width, height);
            return Some(buffer);
        }

        if self.allocated < self.capacity {
            self.allocated += 1;
            log::trace!(
                "FramePool: allocating buffer {}/{} ({}x{})",
                self.allocated,
                self.capacity,
                width,
                height
            );
            return Some(FrameBuffer::new(width, height));
        }

        None
    }

    /// Return a checked-out buffer for reuse.
    ///
    /// Buffers beyond what the pool handed out are dropped rather than kept.
    pub fn release(&mut self, buffer: FrameBuffer) {
        if self.free.len() < self.allocated {
            self.free.push(buffer);
        }
    }

    /// Drop all free buffers, releasing their memory.
    ///
    /// Buffers still checked out stay counted until they are released.
    pub fn shrink(&mut self) {
        self.allocated -= self.free.len();
        self.free.clear();
    }
}
