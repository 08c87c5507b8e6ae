//! Render Capture - Live frame capture from a real-time renderer
//!
//! Copies the renderer's output into host memory every frame and hands the
//! frames to an outbound consumer (a video or real-time communication
//! pipeline) that pulls them on its own schedule.
//!
//! # Features
//! - Readback stage installed at a configurable point of the render pipeline
//! - Stereo and multi-view outputs flattened into a single image
//! - Non-blocking GPU-to-host transfers with bounded in-flight work
//! - Bounded, reusable frame pool with zero-copy dispatch
//! - Headless CPU host for tests and tools
//! - wgpu host behind the `wgpu-backend` feature
//!
//! # Roles
//!
//! Two independently clocked sides share one [`FrameCapture`]:
//! - the render side installs a [`pipeline::CaptureStage`] through a
//!   [`pipeline::CaptureHost`]; completed readbacks are copied into pooled
//!   buffers and queued;
//! - the consumer side calls [`FrameDispatch::request_frame`] and receives a
//!   borrowed [`FrameDescriptor`] of the oldest queued frame.

pub mod backend;
pub mod capture;
pub mod dispatch;
pub mod error;
pub mod exchange;
pub mod format;
pub mod ingest;
pub mod layout;
pub mod pipeline;
pub mod pool;
pub mod readback;
pub mod source;
pub mod stats;

pub use capture::{CaptureStatus, FrameCapture};
pub use dispatch::{FrameDescriptor, FrameDispatch, FrameSink};
pub use error::{CaptureError, CaptureResult, ReadbackError};
pub use format::PixelFormat;
pub use layout::CaptureLayout;
pub use pipeline::{CaptureHost, TriggerPoint};
pub use source::{CameraEyes, SourceDescriptor, StereoMode};
pub use stats::CaptureStats;

pub use backend::headless::HeadlessHost;
#[cfg(feature = "wgpu-backend")]
pub use backend::wgpu_backend::WgpuHost;

/// Conditions under which capture stays installed but reads nothing back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapturePolicy {
    /// Suppress capture while a head-mounted display is presenting
    pub skip_when_hmd_active: bool,
}

/// Configuration for a [`FrameCapture`]
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Point in the frame where the readback stage runs
    pub trigger: TriggerPoint,
    /// Maximum number of frame buffers alive at once
    pub pool_capacity: usize,
    /// Maximum readbacks submitted but not yet completed
    pub max_in_flight: usize,
    pub policy: CapturePolicy,
    /// Prefix for host debug labels
    pub label: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerPoint::AfterRendering,
            pool_capacity: 3,
            max_in_flight: 3,
            policy: CapturePolicy::default(),
            label: "Render Capture".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn with_trigger(mut self, trigger: TriggerPoint) -> Self {
        self.trigger = trigger;
        self
    }

    /// Values below one are raised to one.
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity.max(1);
        self
    }

    /// Values below one are raised to one.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_policy(mut self, policy: CapturePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.trigger, TriggerPoint::AfterRendering);
        assert_eq!(config.pool_capacity, 3);
        assert_eq!(config.max_in_flight, 3);
        assert!(!config.policy.skip_when_hmd_active);
    }

    #[test]
    fn test_config_builders_clamp() {
        let config = CaptureConfig::default()
            .with_pool_capacity(0)
            .with_max_in_flight(0)
            .with_trigger(TriggerPoint::AfterOpaque)
            .with_label("Preview");
        assert_eq!(config.pool_capacity, 1);
        assert_eq!(config.max_in_flight, 1);
        assert_eq!(config.trigger, TriggerPoint::AfterOpaque);
        assert_eq!(config.label, "Preview");
    }
}
