//! Capture lifecycle
//!
//! [`FrameCapture`] owns everything one capture needs between activation and
//! deactivation: the resolved layout, the readback scheduler, and the frame
//! exchange (pool plus ready queue) shared with ingest and dispatch.
//!
//! ```ignore
//! let mut capture = FrameCapture::new(CaptureConfig::default());
//! capture.activate(&mut host)?;
//!
//! // Render thread, once per frame
//! capture.update(&mut host)?;
//!
//! // Outbound pipeline, on its own schedule
//! let dispatch = capture.dispatcher();
//! dispatch.request_frame(|frame| send(frame.bytes, frame.width, frame.height));
//! ```

use std::sync::Arc;

use crate::dispatch::{FrameDescriptor, FrameDispatch};
use crate::error::{CaptureError, CaptureResult};
use crate::exchange::FrameExchange;
use crate::layout::{self, CaptureLayout};
use crate::pipeline::CaptureHost;
use crate::readback::ReadbackScheduler;
use crate::source::SourceDescriptor;
use crate::stats::CaptureStats;
use crate::CaptureConfig;

/// Lifecycle state of a [`FrameCapture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureStatus {
    #[default]
    Inactive,
    /// Stage installed, frames are being read back
    Active,
    /// Activated, but the capture policy currently forbids reading back
    Suppressed,
}

/// Render-frame capture bound to one host.
pub struct FrameCapture {
    config: CaptureConfig,
    exchange: Arc<FrameExchange>,
    scheduler: ReadbackScheduler,
    layout: Option<CaptureLayout>,
    source: Option<SourceDescriptor>,
    status: CaptureStatus,
}

impl FrameCapture {
    pub fn new(config: CaptureConfig) -> Self {
        let exchange = Arc::new(FrameExchange::new(config.pool_capacity));
        let scheduler = ReadbackScheduler::new(config.trigger, config.label.clone());
        Self {
            config,
            exchange,
            scheduler,
            layout: None,
            source: None,
            status: CaptureStatus::Inactive,
        }
    }

    /// Start capturing the host's current output.
    ///
    /// Fails with [`CaptureError::MissingSource`] if the host has no output,
    /// [`CaptureError::UnsupportedConfiguration`] if the output cannot be
    /// flattened into one image, and [`CaptureError::AlreadyInitialized`] if
    /// capture is already running. On failure the capture stays inactive.
    pub fn activate<H: CaptureHost + ?Sized>(
        &mut self,
        host: &mut H,
    ) -> CaptureResult<CaptureStatus> {
        if self.status != CaptureStatus::Inactive {
            return Err(CaptureError::AlreadyInitialized);
        }

        let source = host.output().ok_or(CaptureError::MissingSource)?;
        self.start(host, source)
    }

    /// Stop capturing and release host resources.
    ///
    /// Calling this on an inactive capture does nothing.
    pub fn deactivate<H: CaptureHost + ?Sized>(&mut self, host: &mut H) {
        if self.status == CaptureStatus::Inactive {
            return;
        }

        self.stop(host);
        log::info!("FrameCapture '{}': deactivated", self.config.label);
    }

    /// Track changes of the host's output.
    ///
    /// Call once per frame on the thread that owns the host. A changed output
    /// rebuilds the layout and the readback resources; a vanished output
    /// deactivates the capture.
    pub fn update<H: CaptureHost + ?Sized>(
        &mut self,
        host: &mut H,
    ) -> CaptureResult<CaptureStatus> {
        if self.status == CaptureStatus::Inactive {
            return Ok(CaptureStatus::Inactive);
        }

        let Some(source) = host.output() else {
            log::warn!(
                "FrameCapture '{}': capture source disappeared, deactivating",
                self.config.label
            );
            self.stop(host);
            return Ok(CaptureStatus::Inactive);
        };

        if self.is_current_source(&source) {
            self.source = Some(source);
            return Ok(self.status);
        }

        log::info!(
            "FrameCapture '{}': output changed to {:?} {}x{}, rebuilding layout",
            self.config.label,
            source.stereo,
            source.width,
            source.height
        );
        self.stop(host);
        self.start(host, source)
    }

    /// The HMD flag only counts as a change while the skip policy reads it.
    fn is_current_source(&self, source: &SourceDescriptor) -> bool {
        let Some(current) = &self.source else {
            return false;
        };
        if self.config.policy.skip_when_hmd_active {
            return current == source;
        }
        *current
            == SourceDescriptor {
                hmd_active: current.hmd_active,
                ..source.clone()
            }
    }

    fn start<H: CaptureHost + ?Sized>(
        &mut self,
        host: &mut H,
        source: SourceDescriptor,
    ) -> CaptureResult<CaptureStatus> {
        if self.config.policy.skip_when_hmd_active && source.hmd_active {
            log::info!(
                "FrameCapture '{}': head-mounted display active, capture suppressed",
                self.config.label
            );
            self.source = Some(source);
            self.status = CaptureStatus::Suppressed;
            return Ok(self.status);
        }

        let layout = layout::resolve(&source)?;

        self.exchange.open();
        if let Err(err) =
            self.scheduler
                .install(host, &layout, &self.exchange, self.config.max_in_flight)
        {
            self.exchange.close();
            return Err(err);
        }

        log::info!(
            "FrameCapture '{}': capturing {}x{} at {} (scale {:?}, offset {:?}, slice {:?})",
            self.config.label,
            layout.width,
            layout.height,
            self.config.trigger.name(),
            layout.scale,
            layout.offset,
            layout.slice
        );

        self.layout = Some(layout);
        self.source = Some(source);
        self.status = CaptureStatus::Active;
        Ok(self.status)
    }

    fn stop<H: CaptureHost + ?Sized>(&mut self, host: &mut H) {
        self.scheduler.teardown(host);
        self.exchange.close();
        self.layout = None;
        self.source = None;
        self.status = CaptureStatus::Inactive;
    }

    /// Pull-side handle that can be moved to the outbound consumer.
    pub fn dispatcher(&self) -> FrameDispatch {
        FrameDispatch::new(self.exchange.clone())
    }

    /// Serve the oldest ready frame to `consumer`, see [`FrameDispatch::request_frame`].
    pub fn request_frame<R, F>(&self, consumer: F) -> Option<R>
    where
        F: FnOnce(&FrameDescriptor<'_>) -> R,
    {
        self.dispatcher().request_frame(consumer)
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == CaptureStatus::Active
    }

    /// Layout of the running capture.
    pub fn layout(&self) -> Option<&CaptureLayout> {
        self.layout.as_ref()
    }

    /// Output description the capture was last started from.
    pub fn source(&self) -> Option<&SourceDescriptor> {
        self.source.as_ref()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn stats(&self) -> CaptureStats {
        self.exchange.stats()
    }

    /// Shared pool and queue state.
    pub fn exchange(&self) -> &FrameExchange {
        &self.exchange
    }
}

impl Drop for FrameCapture {
    fn drop(&mut self) {
        // Stages left in the host find the exchange closed and stop reading back.
        self.exchange.close();
        if self.scheduler.is_installed() {
            log::debug!(
                "FrameCapture '{}': dropped without deactivate, stage left in host",
                self.config.label
            );
        }
    }
}
