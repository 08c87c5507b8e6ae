//! Description of the renderer output a capture reads from

use glam::UVec2;

use crate::format::{PixelFormat, CANONICAL_FORMAT};

/// How the renderer produces multiple views (eyes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StereoMode {
    /// Single view, no multi-view rendering.
    #[default]
    Mono,
    /// Both views packed side-by-side in one double-wide target.
    SinglePass,
    /// Views rendered as slices of an array target in one instanced pass.
    SinglePassInstanced,
    /// One full render pass per view, each into its own target.
    MultiPass,
}

impl StereoMode {
    pub fn is_multi_view(&self) -> bool {
        !matches!(self, StereoMode::Mono)
    }
}

/// Which views the capturing camera renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraEyes {
    #[default]
    Both,
    Left,
    Right,
}

/// Snapshot of the renderer output configuration.
///
/// Hosts report this through [`CaptureHost::output`](crate::pipeline::CaptureHost::output);
/// any change between two snapshots invalidates the capture layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    /// Output width in pixels before render scaling
    pub width: u32,
    /// Output height in pixels before render scaling
    pub height: u32,
    /// Render scale applied to the output size (1.0 = native)
    pub render_scale: f32,
    pub stereo: StereoMode,
    /// Per-eye width, meaningful only for multi-view rendering
    pub eye_width: u32,
    /// Per-eye height, meaningful only for multi-view rendering
    pub eye_height: u32,
    /// Native color format of the per-eye target
    pub native_format: PixelFormat,
    pub camera_eyes: CameraEyes,
    /// Whether the platform can blit individual array slices
    pub supports_array_blit: bool,
    /// Whether a head-mounted display is currently presenting
    pub hmd_active: bool,
}

impl SourceDescriptor {
    /// Single-view output of the given size in the canonical format.
    pub fn mono(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            render_scale: 1.0,
            stereo: StereoMode::Mono,
            eye_width: width,
            eye_height: height,
            native_format: CANONICAL_FORMAT,
            camera_eyes: CameraEyes::Both,
            supports_array_blit: true,
            hmd_active: false,
        }
    }

    /// Multi-view output with the given per-eye size.
    ///
    /// For [`StereoMode::SinglePass`] the full output is twice as wide as one eye.
    pub fn stereo(
        stereo: StereoMode,
        eye_width: u32,
        eye_height: u32,
        native_format: PixelFormat,
    ) -> Self {
        let width = match stereo {
            StereoMode::SinglePass => eye_width * 2,
            _ => eye_width,
        };
        Self {
            width,
            height: eye_height,
            render_scale: 1.0,
            stereo,
            eye_width,
            eye_height,
            native_format,
            camera_eyes: CameraEyes::Both,
            supports_array_blit: true,
            hmd_active: false,
        }
    }

    pub fn with_render_scale(mut self, render_scale: f32) -> Self {
        self.render_scale = render_scale;
        self
    }

    pub fn with_native_format(mut self, native_format: PixelFormat) -> Self {
        self.native_format = native_format;
        self
    }

    pub fn with_camera_eyes(mut self, camera_eyes: CameraEyes) -> Self {
        self.camera_eyes = camera_eyes;
        self
    }

    pub fn with_array_blit(mut self, supported: bool) -> Self {
        self.supports_array_blit = supported;
        self
    }

    pub fn with_hmd_active(mut self, active: bool) -> Self {
        self.hmd_active = active;
        self
    }

    /// Output size after render scaling; negative scales collapse to zero.
    pub fn scaled_size(&self) -> UVec2 {
        let scale = self.render_scale.max(0.0);
        UVec2::new(
            ((self.width as f32) * scale) as u32,
            ((self.height as f32) * scale) as u32,
        )
    }

    pub fn eye_size(&self) -> UVec2 {
        UVec2::new(self.eye_width, self.eye_height)
    }

    /// Size of the render target a host holds for this output.
    ///
    /// Side-by-side targets are twice as wide as one eye; every other
    /// multi-view target matches the per-eye size.
    pub fn target_size(&self) -> UVec2 {
        match self.stereo {
            StereoMode::Mono => self.scaled_size(),
            StereoMode::SinglePass => UVec2::new(self.eye_width * 2, self.eye_height),
            StereoMode::SinglePassInstanced | StereoMode::MultiPass => self.eye_size(),
        }
    }

    /// Number of array layers in the render target.
    pub fn target_layers(&self) -> u32 {
        match self.stereo {
            StereoMode::SinglePassInstanced => 2,
            _ => 1,
        }
    }

    /// Format texels are stored in on the render target.
    pub fn target_format(&self) -> PixelFormat {
        self.native_format
    }
}
