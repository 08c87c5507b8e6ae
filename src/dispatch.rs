//! Outbound frame dispatch
//!
//! The outbound consumer pulls frames on its own schedule. Each pull hands out
//! the oldest ready frame as a borrowed [`FrameDescriptor`] and returns the
//! buffer to the pool once the consumer is done with it.

use std::sync::Arc;

use crate::exchange::FrameExchange;
use crate::format::PixelFormat;
use crate::pool::FrameBuffer;

/// Zero-copy view of one captured frame.
///
/// Only valid for the duration of the dispatch call that produced it.
#[derive(Debug, Clone, Copy)]
pub struct FrameDescriptor<'a> {
    pub bytes: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes per row, `width * 4`
    pub stride: u32,
    pub format: PixelFormat,
    /// Readback sequence number, increasing across the capture's lifetime
    pub sequence: u64,
}

impl<'a> FrameDescriptor<'a> {
    fn from_buffer(buffer: &'a FrameBuffer) -> Self {
        Self {
            bytes: buffer.bytes(),
            width: buffer.width(),
            height: buffer.height(),
            stride: buffer.stride(),
            format: buffer.format(),
            sequence: buffer.sequence(),
        }
    }

    /// Pixels as `[b, g, r, a]` quadruples.
    pub fn pixels(&self) -> &'a [[u8; 4]] {
        bytemuck::cast_slice(self.bytes)
    }

    /// Bytes of row `y`.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride as usize;
        &self.bytes[start..start + self.stride as usize]
    }
}

/// Object-style consumer of captured frames.
pub trait FrameSink {
    fn on_frame(&mut self, frame: &FrameDescriptor<'_>);
}

impl<F> FrameSink for F
where
    F: FnMut(&FrameDescriptor<'_>),
{
    fn on_frame(&mut self, frame: &FrameDescriptor<'_>) {
        self(frame)
    }
}

/// Returns the buffer to the pool even if the consumer panics.
struct Checkout<'a> {
    exchange: &'a FrameExchange,
    buffer: Option<FrameBuffer>,
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.exchange.recycle(buffer);
        }
    }
}

/// Pull-side handle onto a capture's ready queue.
///
/// Cheap to clone and safe to move to the consumer's thread.
#[derive(Debug, Clone)]
pub struct FrameDispatch {
    exchange: Arc<FrameExchange>,
}

impl FrameDispatch {
    pub(crate) fn new(exchange: Arc<FrameExchange>) -> Self {
        Self { exchange }
    }

    /// Serve the oldest ready frame to `consumer`.
    ///
    /// Returns `None` without touching the pool when no frame is ready.
    pub fn request_frame<R, F>(&self, consumer: F) -> Option<R>
    where
        F: FnOnce(&FrameDescriptor<'_>) -> R,
    {
        let checkout = Checkout {
            exchange: &self.exchange,
            buffer: Some(self.exchange.take_ready()?),
        };

        let result = match checkout.buffer.as_ref() {
            Some(buffer) => consumer(&FrameDescriptor::from_buffer(buffer)),
            None => return None,
        };
        self.exchange.counters().record_dispatched();
        Some(result)
    }

    /// Serve the oldest ready frame to `sink`. Returns whether a frame was sent.
    pub fn dispatch_to(&self, sink: &mut dyn FrameSink) -> bool {
        self.request_frame(|frame| sink.on_frame(frame)).is_some()
    }

    /// Frames waiting to be pulled.
    pub fn pending(&self) -> usize {
        self.exchange.ready_len()
    }
}
