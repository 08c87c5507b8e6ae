//! Capture stage definitions

use glam::Vec2;

use crate::format::PixelFormat;
use crate::pipeline::host::{ReadbackCallback, SurfaceHandle};

/// Named point in a frame's execution order where a stage runs.
///
/// Hosts execute trigger points in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TriggerPoint {
    BeforeRendering,
    AfterOpaque,
    AfterTransparent,
    BeforePostProcessing,
    AfterPostProcessing,
    /// After all rendering, before presentation
    #[default]
    AfterRendering,
}

impl TriggerPoint {
    pub const ALL: [TriggerPoint; 6] = [
        TriggerPoint::BeforeRendering,
        TriggerPoint::AfterOpaque,
        TriggerPoint::AfterTransparent,
        TriggerPoint::BeforePostProcessing,
        TriggerPoint::AfterPostProcessing,
        TriggerPoint::AfterRendering,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TriggerPoint::BeforeRendering => "before-rendering",
            TriggerPoint::AfterOpaque => "after-opaque",
            TriggerPoint::AfterTransparent => "after-transparent",
            TriggerPoint::BeforePostProcessing => "before-post-processing",
            TriggerPoint::AfterPostProcessing => "after-post-processing",
            TriggerPoint::AfterRendering => "after-rendering",
        }
    }
}

/// Unique identifier for an installed stage, assigned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(u64);

impl StageId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Copy of the live render target into an intermediate surface.
///
/// Destination texel `d` (normalized to `[0, 1]`) samples source coordinate
/// `d * scale + offset`, so `scale = (0.5, 1)` with a zero offset selects the
/// left half of a side-by-side target.
#[derive(Debug, Clone, PartialEq)]
pub struct BlitOperation {
    pub destination: SurfaceHandle,
    pub scale: Vec2,
    pub offset: Vec2,
    /// Array slice to read from, `None` for non-array targets
    pub source_slice: Option<u32>,
    /// Array slice to write to, `None` for non-array surfaces
    pub destination_slice: Option<u32>,
    /// Previous destination contents may be thrown away before the copy
    pub discard_destination: bool,
}

impl BlitOperation {
    /// Full-frame copy with no scaling.
    pub fn full(destination: SurfaceHandle) -> Self {
        Self {
            destination,
            scale: Vec2::ONE,
            offset: Vec2::ZERO,
            source_slice: None,
            destination_slice: None,
            discard_destination: true,
        }
    }

    /// Map a normalized destination coordinate to a normalized source coordinate.
    pub fn source_uv(&self, destination_uv: Vec2) -> Vec2 {
        destination_uv * self.scale + self.offset
    }
}

/// Commands a stage may record while the host executes it.
pub trait StageCommands {
    /// Discard-and-copy from the live render target into a surface.
    fn blit(&mut self, blit: &BlitOperation);

    /// Start a non-blocking transfer of `surface` to host memory in `format`.
    ///
    /// `on_complete` is invoked exactly once if the transfer finishes or
    /// fails, possibly several frames later, or never if the host stops
    /// running. It must not be invoked from inside this call.
    fn readback(&mut self, surface: SurfaceHandle, format: PixelFormat, on_complete: ReadbackCallback);
}

/// A unit of work the host runs once per frame at its trigger point.
pub trait CaptureStage: Send {
    /// Get the stage name for debugging
    fn name(&self) -> &str;

    /// Record this frame's commands
    fn execute(&mut self, commands: &mut dyn StageCommands);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_order() {
        let mut sorted = TriggerPoint::ALL;
        sorted.reverse();
        sorted.sort();
        assert_eq!(sorted, TriggerPoint::ALL);
        assert_eq!(TriggerPoint::default(), TriggerPoint::AfterRendering);
    }

    #[test]
    fn test_blit_source_uv() {
        let mut blit = BlitOperation::full(SurfaceHandle::new(1));
        assert_eq!(blit.source_uv(Vec2::new(0.25, 0.75)), Vec2::new(0.25, 0.75));

        blit.scale = Vec2::new(0.5, 1.0);
        assert_eq!(blit.source_uv(Vec2::new(1.0, 1.0)), Vec2::new(0.5, 1.0));

        blit.offset = Vec2::new(0.5, 0.0);
        assert_eq!(blit.source_uv(Vec2::ZERO), Vec2::new(0.5, 0.0));
    }
}
