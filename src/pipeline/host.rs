//! Interface a renderer implements to host a capture

use crate::error::{CaptureResult, ReadbackError};
use crate::format::PixelFormat;
use crate::pipeline::stage::{CaptureStage, StageId, TriggerPoint};
use crate::source::SourceDescriptor;

/// Handle to an intermediate readback surface owned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Intermediate surface descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Host-visible pixel data of a finished readback.
///
/// The view borrows host memory that is only valid for the duration of the
/// completion callback. Rows are `row_pitch` bytes apart; hosts with row
/// alignment requirements may pad rows beyond `width * bytes_per_pixel`.
#[derive(Debug, Clone, Copy)]
pub struct ReadbackData<'a> {
    bytes: &'a [u8],
    width: u32,
    height: u32,
    row_pitch: u32,
}

impl<'a> ReadbackData<'a> {
    pub fn new(bytes: &'a [u8], width: u32, height: u32, row_pitch: u32) -> Self {
        Self {
            bytes,
            width,
            height,
            row_pitch,
        }
    }

    /// Tightly packed data (`row_pitch = width * 4`).
    pub fn packed(bytes: &'a [u8], width: u32, height: u32) -> Self {
        Self::new(bytes, width, height, width * 4)
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_pitch(&self) -> u32 {
        self.row_pitch
    }
}

pub type ReadbackResult<'a> = Result<ReadbackData<'a>, ReadbackError>;

/// Completion handler for one readback.
pub type ReadbackCallback = Box<dyn for<'a> FnOnce(ReadbackResult<'a>) + Send + 'static>;

/// A renderer able to run capture stages.
///
/// All methods are called from the thread that owns the host. Removal
/// methods must tolerate handles the host no longer knows about.
pub trait CaptureHost {
    /// Current output configuration, or `None` if the source no longer exists.
    fn output(&self) -> Option<SourceDescriptor>;

    /// Install a stage to run once per frame at `trigger`.
    fn install_stage(
        &mut self,
        trigger: TriggerPoint,
        stage: Box<dyn CaptureStage>,
    ) -> CaptureResult<StageId>;

    /// Remove an installed stage. Unknown ids are ignored.
    fn uninstall_stage(&mut self, stage: StageId);

    /// Allocate an intermediate surface.
    fn create_surface(&mut self, desc: &SurfaceDescriptor) -> CaptureResult<SurfaceHandle>;

    /// Release an intermediate surface. Unknown handles are ignored.
    fn destroy_surface(&mut self, surface: SurfaceHandle);
}
