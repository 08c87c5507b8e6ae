//! GPU readback scheduling
//!
//! [`ReadbackScheduler`] owns the host resources of an active capture: one
//! intermediate surface sized to the capture layout and one stage installed
//! at the configured trigger point. Every frame the stage blits the live
//! target into the surface and starts an asynchronous transfer whose
//! completion is routed to [`FrameIngest`].

use std::sync::Arc;

use crate::error::{CaptureError, CaptureResult};
use crate::exchange::FrameExchange;
use crate::format::CANONICAL_FORMAT;
use crate::ingest::FrameIngest;
use crate::layout::CaptureLayout;
use crate::pipeline::{
    BlitOperation, CaptureHost, CaptureStage, ReadbackResult, StageCommands, StageId,
    SurfaceDescriptor, SurfaceHandle, TriggerPoint,
};

/// One submitted readback, correlating a transfer with its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadbackRequest {
    /// Monotonic frame number
    pub sequence: u64,
    /// Activation the request was issued in
    pub generation: u64,
    pub width: u32,
    pub height: u32,
}

/// Installs and tears down the per-frame readback stage.
#[derive(Debug)]
pub struct ReadbackScheduler {
    trigger: TriggerPoint,
    label: String,
    stage: Option<StageId>,
    surface: Option<SurfaceHandle>,
}

impl ReadbackScheduler {
    pub fn new(trigger: TriggerPoint, label: impl Into<String>) -> Self {
        Self {
            trigger,
            label: label.into(),
            stage: None,
            surface: None,
        }
    }

    pub fn trigger(&self) -> TriggerPoint {
        self.trigger
    }

    pub fn is_installed(&self) -> bool {
        self.stage.is_some()
    }

    pub fn surface(&self) -> Option<SurfaceHandle> {
        self.surface
    }

    /// Allocate the intermediate surface and install the readback stage.
    pub(crate) fn install<H: CaptureHost + ?Sized>(
        &mut self,
        host: &mut H,
        layout: &CaptureLayout,
        exchange: &Arc<FrameExchange>,
        max_in_flight: usize,
    ) -> CaptureResult<()> {
        if self.stage.is_some() {
            return Err(CaptureError::AlreadyInitialized);
        }

        let surface = host.create_surface(&SurfaceDescriptor {
            label: Some(format!("{} readback surface", self.label)),
            width: layout.width,
            height: layout.height,
            format: CANONICAL_FORMAT,
        })?;

        let stage = ReadbackStage {
            name: format!("{} readback", self.label),
            blit: layout.blit(surface),
            width: layout.width,
            height: layout.height,
            max_in_flight: max_in_flight.max(1),
            exchange: exchange.clone(),
            ingest: FrameIngest::new(exchange.clone()),
        };

        let stage = match host.install_stage(self.trigger, Box::new(stage)) {
            Ok(id) => id,
            Err(err) => {
                host.destroy_surface(surface);
                return Err(err);
            }
        };

        log::debug!(
            "ReadbackScheduler: installed stage {:?} at {} ({}x{})",
            stage,
            self.trigger.name(),
            layout.width,
            layout.height
        );
        self.stage = Some(stage);
        self.surface = Some(surface);
        Ok(())
    }

    /// Remove the stage and release the surface. Safe to call repeatedly.
    pub(crate) fn teardown<H: CaptureHost + ?Sized>(&mut self, host: &mut H) {
        if let Some(stage) = self.stage.take() {
            host.uninstall_stage(stage);
        }
        if let Some(surface) = self.surface.take() {
            host.destroy_surface(surface);
        }
    }
}

/// Per-frame blit and transfer.
struct ReadbackStage {
    name: String,
    blit: BlitOperation,
    width: u32,
    height: u32,
    max_in_flight: usize,
    exchange: Arc<FrameExchange>,
    ingest: FrameIngest,
}

impl CaptureStage for ReadbackStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, commands: &mut dyn StageCommands) {
        let Some(request) =
            self.exchange
                .begin_readback(self.width, self.height, self.max_in_flight)
        else {
            log::trace!("{}: readback skipped this frame", self.name);
            return;
        };

        commands.blit(&self.blit);

        let pending = PendingCompletion {
            ingest: self.ingest.clone(),
            request: Some(request),
        };
        commands.readback(
            self.blit.destination,
            CANONICAL_FORMAT,
            Box::new(move |result: ReadbackResult<'_>| pending.complete(result)),
        );
    }
}

/// Owned by a readback callback. Releases the in-flight slot even if the
/// host drops the callback without calling it.
struct PendingCompletion {
    ingest: FrameIngest,
    request: Option<ReadbackRequest>,
}

impl PendingCompletion {
    fn complete(mut self, result: ReadbackResult<'_>) {
        if let Some(request) = self.request.take() {
            self.ingest.complete(request, result);
        }
    }
}

impl Drop for PendingCompletion {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            self.ingest.abandon(request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReadbackError;
    use crate::format::PixelFormat;
    use crate::layout;
    use crate::pipeline::{ReadbackCallback, ReadbackData};
    use crate::source::SourceDescriptor;

    #[derive(Default)]
    struct RecordingHost {
        next_id: u64,
        stages: Vec<(StageId, Box<dyn CaptureStage>)>,
        surfaces: Vec<SurfaceHandle>,
        reject_stages: bool,
    }

    impl CaptureHost for RecordingHost {
        fn output(&self) -> Option<SourceDescriptor> {
            Some(SourceDescriptor::mono(2, 2))
        }

        fn install_stage(
            &mut self,
            _trigger: TriggerPoint,
            stage: Box<dyn CaptureStage>,
        ) -> CaptureResult<StageId> {
            if self.reject_stages {
                return Err(CaptureError::Backend("stage table full".to_string()));
            }
            self.next_id += 1;
            let id = StageId::new(self.next_id);
            self.stages.push((id, stage));
            Ok(id)
        }

        fn uninstall_stage(&mut self, stage: StageId) {
            self.stages.retain(|(id, _)| *id != stage);
        }

        fn create_surface(&mut self, _desc: &SurfaceDescriptor) -> CaptureResult<SurfaceHandle> {
            self.next_id += 1;
            let handle = SurfaceHandle::new(self.next_id);
            self.surfaces.push(handle);
            Ok(handle)
        }

        fn destroy_surface(&mut self, surface: SurfaceHandle) {
            self.surfaces.retain(|s| *s != surface);
        }
    }

    #[derive(Default)]
    struct Recorder {
        blits: Vec<BlitOperation>,
        readbacks: Vec<(SurfaceHandle, PixelFormat, ReadbackCallback)>,
    }

    impl StageCommands for Recorder {
        fn blit(&mut self, blit: &BlitOperation) {
            self.blits.push(blit.clone());
        }

        fn readback(&mut self, surface: SurfaceHandle, format: PixelFormat, on_complete: ReadbackCallback) {
            self.readbacks.push((surface, format, on_complete));
        }
    }

    fn setup() -> (RecordingHost, ReadbackScheduler, Arc<FrameExchange>, CaptureLayout) {
        let exchange = Arc::new(FrameExchange::new(2));
        exchange.open();
        let layout = layout::resolve(&SourceDescriptor::mono(2, 2)).unwrap();
        (
            RecordingHost::default(),
            ReadbackScheduler::new(TriggerPoint::AfterRendering, "test"),
            exchange,
            layout,
        )
    }

    #[test]
    fn test_install_twice_fails() {
        let (mut host, mut scheduler, exchange, layout) = setup();
        scheduler.install(&mut host, &layout, &exchange, 3).unwrap();
        assert_eq!(
            scheduler.install(&mut host, &layout, &exchange, 3),
            Err(CaptureError::AlreadyInitialized)
        );
        assert_eq!(host.stages.len(), 1);
        assert_eq!(host.surfaces.len(), 1);
    }

    #[test]
    fn test_failed_stage_install_releases_surface() {
        let (mut host, mut scheduler, exchange, layout) = setup();
        host.reject_stages = true;
        assert!(matches!(
            scheduler.install(&mut host, &layout, &exchange, 3),
            Err(CaptureError::Backend(_))
        ));
        assert!(host.surfaces.is_empty());
        assert!(!scheduler.is_installed());
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let (mut host, mut scheduler, exchange, layout) = setup();
        scheduler.install(&mut host, &layout, &exchange, 3).unwrap();
        scheduler.teardown(&mut host);
        scheduler.teardown(&mut host);
        assert!(host.stages.is_empty());
        assert!(host.surfaces.is_empty());
    }

    #[test]
    fn test_stage_blits_then_reads_back() {
        let (mut host, mut scheduler, exchange, layout) = setup();
        scheduler.install(&mut host, &layout, &exchange, 3).unwrap();

        let mut recorder = Recorder::default();
        host.stages[0].1.execute(&mut recorder);

        assert_eq!(recorder.blits, vec![layout.blit(scheduler.surface().unwrap())]);
        assert_eq!(recorder.readbacks.len(), 1);
        let (surface, format, callback) = recorder.readbacks.pop().unwrap();
        assert_eq!(Some(surface), scheduler.surface());
        assert_eq!(format, PixelFormat::Bgra8Unorm);

        let bytes = [9u8; 16];
        callback(Ok(ReadbackData::packed(&bytes, 2, 2)));
        assert_eq!(exchange.ready_len(), 1);
    }

    #[test]
    fn test_stage_respects_in_flight_cap() {
        let (mut host, mut scheduler, exchange, layout) = setup();
        scheduler.install(&mut host, &layout, &exchange, 1).unwrap();

        let mut recorder = Recorder::default();
        host.stages[0].1.execute(&mut recorder);
        host.stages[0].1.execute(&mut recorder);
        assert_eq!(recorder.readbacks.len(), 1);
        assert_eq!(recorder.blits.len(), 1);

        let (_, _, callback) = recorder.readbacks.pop().unwrap();
        callback(Err(ReadbackError::Cancelled));
        host.stages[0].1.execute(&mut recorder);
        assert_eq!(recorder.readbacks.len(), 1);
        assert_eq!(exchange.stats().skipped, 1);
    }

    #[test]
    fn test_dropped_callback_releases_slot() {
        let (mut host, mut scheduler, exchange, layout) = setup();
        scheduler.install(&mut host, &layout, &exchange, 1).unwrap();

        let mut recorder = Recorder::default();
        host.stages[0].1.execute(&mut recorder);
        assert_eq!(exchange.in_flight(), 1);

        // The host forgets the transfer without ever calling back.
        recorder.readbacks.clear();
        assert_eq!(exchange.in_flight(), 0);
        assert_eq!(exchange.stats().failed, 1);

        host.stages[0].1.execute(&mut recorder);
        assert_eq!(recorder.readbacks.len(), 1);
        assert_eq!(exchange.stats().skipped, 0);
    }
}
