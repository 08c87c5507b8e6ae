//! Frame exchange shared by the render side and the consumer side.
//!
//! The render side (stage execution and readback completion) and the
//! consumer side (dispatch) may run on different threads. Everything they
//! share lives behind one lock that is held only to move a buffer between
//! owners; pixel copies and consumer callbacks run outside it.
//!
//! Each activation opens a new generation. Requests carry the generation
//! they were issued in, so completions arriving after deactivation (or after
//! a re-activation) are recognized as stale and never touch the queue.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::pool::{FrameBuffer, FramePool};
use crate::readback::ReadbackRequest;
use crate::stats::{CaptureCounters, CaptureStats};

#[derive(Debug)]
struct ExchangeState {
    pool: FramePool,
    ready: VecDeque<FrameBuffer>,
    active: bool,
    generation: u64,
    in_flight: usize,
    next_sequence: u64,
}

impl ExchangeState {
    fn is_current(&self, request: &ReadbackRequest) -> bool {
        self.active && request.generation == self.generation
    }
}

/// Pool, ready queue and activation state shared between capture roles.
#[derive(Debug)]
pub struct FrameExchange {
    state: Mutex<ExchangeState>,
    counters: CaptureCounters,
}

/// Buffer checked out for an ingest copy.
pub(crate) struct IngestSlot {
    pub buffer: FrameBuffer,
    /// An unsent frame was recycled to free this buffer
    pub dropped_oldest: bool,
}

/// Result of [`FrameExchange::checkout`].
pub(crate) enum Checkout {
    Slot(IngestSlot),
    /// The request's activation has ended
    Stale,
    /// Every buffer is checked out by a consumer
    Exhausted,
}

impl Checkout {
    #[cfg(test)]
    fn slot(self) -> Option<IngestSlot> {
        match self {
            Checkout::Slot(slot) => Some(slot),
            _ => None,
        }
    }
}

impl FrameExchange {
    pub(crate) fn new(pool_capacity: usize) -> Self {
        let pool = FramePool::new(pool_capacity);
        let ready = VecDeque::with_capacity(pool.capacity());
        Self {
            state: Mutex::new(ExchangeState {
                pool,
                ready,
                active: false,
                generation: 0,
                in_flight: 0,
                next_sequence: 0,
            }),
            counters: CaptureCounters::default(),
        }
    }

    /// Start a new activation and return its generation.
    pub(crate) fn open(&self) -> u64 {
        let mut state = self.state.lock();
        state.generation += 1;
        state.active = true;
        state.in_flight = 0;
        state.generation
    }

    /// End the current activation, discarding queued frames and free buffers.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        if !state.active {
            return;
        }
        state.active = false;
        state.generation += 1;
        state.in_flight = 0;

        let ExchangeState { pool, ready, .. } = &mut *state;
        for buffer in ready.drain(..) {
            pool.release(buffer);
        }
        pool.shrink();
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().active
    }

    /// Register a new readback, unless capture is closed or `max_in_flight`
    /// readbacks are already pending.
    pub(crate) fn begin_readback(
        &self,
        width: u32,
        height: u32,
        max_in_flight: usize,
    ) -> Option<ReadbackRequest> {
        let mut state = self.state.lock();
        if !state.active {
            return None;
        }
        if state.in_flight >= max_in_flight {
            drop(state);
            self.counters.record_skipped();
            return None;
        }

        state.in_flight += 1;
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        let request = ReadbackRequest {
            sequence,
            generation: state.generation,
            width,
            height,
        };
        drop(state);

        self.counters.record_submitted();
        Some(request)
    }

    /// Retire a request. Returns `false` if it belongs to an ended activation.
    pub(crate) fn finish_readback(&self, request: &ReadbackRequest) -> bool {
        let mut state = self.state.lock();
        if !state.is_current(request) {
            return false;
        }
        state.in_flight = state.in_flight.saturating_sub(1);
        true
    }

    /// Take a buffer for ingesting `request`.
    ///
    /// When every buffer is already queued, the oldest queued frame is
    /// recycled so the newest readback is never lost. If every buffer is
    /// held by consumers instead, the new frame has nowhere to go.
    pub(crate) fn checkout(&self, request: &ReadbackRequest) -> Checkout {
        let mut state = self.state.lock();
        if !state.is_current(request) {
            return Checkout::Stale;
        }

        if let Some(buffer) = state.pool.acquire(request.width, request.height) {
            return Checkout::Slot(IngestSlot {
                buffer,
                dropped_oldest: false,
            });
        }

        let Some(mut buffer) = state.ready.pop_front() else {
            return Checkout::Exhausted;
        };
        drop(state);

        buffer.reshape(request.width, request.height);
        self.counters.record_dropped();
        Checkout::Slot(IngestSlot {
            buffer,
            dropped_oldest: true,
        })
    }

    /// Append a filled buffer to the ready queue.
    ///
    /// If the activation ended while the buffer was being filled, it goes back
    /// to the pool instead and `false` is returned.
    pub(crate) fn publish(&self, request: &ReadbackRequest, buffer: FrameBuffer) -> bool {
        let mut state = self.state.lock();
        if !state.is_current(request) {
            state.pool.release(buffer);
            return false;
        }
        debug_assert!(state.ready.len() < state.pool.capacity());
        state.ready.push_back(buffer);
        true
    }

    /// Remove the oldest ready frame.
    pub(crate) fn take_ready(&self) -> Option<FrameBuffer> {
        self.state.lock().ready.pop_front()
    }

    /// Return a dispatched buffer to the pool.
    pub(crate) fn recycle(&self, buffer: FrameBuffer) {
        self.state.lock().pool.release(buffer);
    }

    pub(crate) fn counters(&self) -> &CaptureCounters {
        &self.counters
    }

    pub fn stats(&self) -> CaptureStats {
        self.counters.snapshot()
    }

    /// Frames waiting for dispatch.
    pub fn ready_len(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// Readbacks issued in the current activation and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Live buffers, whether free, queued or checked out.
    pub fn pool_allocated(&self) -> usize {
        self.state.lock().pool.allocated()
    }

    /// Buffers sitting in the pool's free list.
    pub fn pool_available(&self) -> usize {
        self.state.lock().pool.available()
    }

    pub fn pool_capacity(&self) -> usize {
        self.state.lock().pool.capacity()
    }
}
