//! Readback completion handling
//!
//! [`FrameIngest`] is the receiving end of every readback callback. It copies
//! the transferred pixels into a pooled [`FrameBuffer`](crate::pool::FrameBuffer)
//! while the host memory is still valid and appends the buffer to the ready
//! queue.

use std::sync::Arc;

use crate::exchange::{Checkout, FrameExchange};
use crate::format::CANONICAL_BYTES_PER_PIXEL;
use crate::pipeline::{ReadbackData, ReadbackResult};
use crate::pool::FrameBuffer;
use crate::readback::ReadbackRequest;

/// What happened to one completed readback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The frame was appended to the ready queue
    Queued,
    /// The frame was queued after recycling the oldest unsent frame
    QueuedDroppingOldest,
    /// Consumers hold every buffer; the frame was discarded
    Dropped,
    /// The host reported an error; no frame this cycle
    Failed,
    /// The activation that issued the request has ended
    Stale,
}

impl IngestOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, IngestOutcome::Queued | IngestOutcome::QueuedDroppingOldest)
    }
}

/// Completion handler shared by all readbacks of one capture.
#[derive(Debug, Clone)]
pub struct FrameIngest {
    exchange: Arc<FrameExchange>,
}

impl FrameIngest {
    pub(crate) fn new(exchange: Arc<FrameExchange>) -> Self {
        Self { exchange }
    }

    /// Consume the result of `request`.
    ///
    /// # Panics
    ///
    /// Panics if a successful transfer holds fewer bytes than the requested
    /// frame needs, or rows closer together than one row of pixels. Either
    /// means the host and the capture layout disagree.
    pub fn complete(&self, request: ReadbackRequest, result: ReadbackResult<'_>) -> IngestOutcome {
        let counters = self.exchange.counters();

        if !self.exchange.finish_readback(&request) {
            log::debug!(
                "FrameIngest: ignoring completion of readback {} from an ended activation",
                request.sequence
            );
            counters.record_stale();
            return IngestOutcome::Stale;
        }

        let data = match result {
            Ok(data) => data,
            Err(err) => {
                log::debug!("FrameIngest: readback {} failed: {}", request.sequence, err);
                counters.record_failed();
                return IngestOutcome::Failed;
            }
        };

        validate(&request, &data);

        let slot = match self.exchange.checkout(&request) {
            Checkout::Slot(slot) => slot,
            Checkout::Stale => {
                counters.record_stale();
                return IngestOutcome::Stale;
            }
            Checkout::Exhausted => {
                log::debug!(
                    "FrameIngest: all frame buffers are held by consumers, dropping readback {}",
                    request.sequence
                );
                counters.record_dropped();
                return IngestOutcome::Dropped;
            }
        };

        let mut buffer = slot.buffer;
        copy_rows(&data, &mut buffer);
        buffer.set_sequence(request.sequence);

        if !self.exchange.publish(&request, buffer) {
            log::debug!(
                "FrameIngest: capture ended while copying readback {}",
                request.sequence
            );
            counters.record_stale();
            return IngestOutcome::Stale;
        }

        counters.record_completed();
        if slot.dropped_oldest {
            log::debug!(
                "FrameIngest: frame pool exhausted, dropped oldest queued frame for readback {}",
                request.sequence
            );
            IngestOutcome::QueuedDroppingOldest
        } else {
            IngestOutcome::Queued
        }
    }

    /// Retire `request` whose callback was dropped by the host without running.
    ///
    /// Frees its in-flight slot and counts it as failed.
    pub fn abandon(&self, request: ReadbackRequest) -> IngestOutcome {
        let counters = self.exchange.counters();
        if !self.exchange.finish_readback(&request) {
            counters.record_stale();
            return IngestOutcome::Stale;
        }

        log::debug!(
            "FrameIngest: readback {} was abandoned by the host",
            request.sequence
        );
        counters.record_failed();
        IngestOutcome::Failed
    }
}

fn validate(request: &ReadbackRequest, data: &ReadbackData<'_>) {
    let row_bytes = request.width as usize * CANONICAL_BYTES_PER_PIXEL as usize;
    let pitch = data.row_pitch() as usize;
    assert!(
        pitch >= row_bytes,
        "readback {} row pitch {} is shorter than a {}-pixel row",
        request.sequence,
        pitch,
        request.width
    );

    let required = pitch * (request.height as usize).saturating_sub(1) + row_bytes;
    assert!(
        data.len() >= required,
        "readback {} delivered {} bytes, a {}x{} frame needs {}",
        request.sequence,
        data.len(),
        request.width,
        request.height,
        required
    );
}

fn copy_rows(data: &ReadbackData<'_>, buffer: &mut FrameBuffer) {
    let row_bytes = buffer.stride() as usize;
    let pitch = data.row_pitch() as usize;
    let src = data.bytes();
    let dst = buffer.bytes_mut();

    if pitch == row_bytes {
        dst.copy_from_slice(&src[..dst.len()]);
        return;
    }

    for (row, out) in dst.chunks_exact_mut(row_bytes).enumerate() {
        let start = row * pitch;
        out.copy_from_slice(&src[start..start + row_bytes]);
    }
}
