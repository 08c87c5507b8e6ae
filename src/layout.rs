//! Capture layout resolution
//!
//! Turns a [`SourceDescriptor`] into the region, scale, slice and format
//! needed to extract one flat image from the renderer output. Resolution is
//! pure: no GPU work happens here, and the result stays valid until the
//! source descriptor changes.

use glam::{UVec2, Vec2};

use crate::error::{CaptureError, CaptureResult};
use crate::format::{PixelFormat, CANONICAL_BYTES_PER_PIXEL, CANONICAL_FORMAT};
use crate::pipeline::{BlitOperation, SurfaceHandle};
use crate::source::{CameraEyes, SourceDescriptor, StereoMode};

/// Derived readback configuration for one activation.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureLayout {
    /// Readback width in pixels
    pub width: u32,
    /// Readback height in pixels
    pub height: u32,
    /// Native format of the region the blit reads from
    pub source_format: PixelFormat,
    pub scale: Vec2,
    pub offset: Vec2,
    /// Array slice used as both blit source and destination
    pub slice: Option<u32>,
}

impl CaptureLayout {
    fn full_frame(size: UVec2) -> Self {
        Self {
            width: size.x,
            height: size.y,
            source_format: CANONICAL_FORMAT,
            scale: Vec2::ONE,
            offset: Vec2::ZERO,
            slice: None,
        }
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    /// Bytes per row of a canonical frame.
    pub fn stride(&self) -> u32 {
        self.width * CANONICAL_BYTES_PER_PIXEL
    }

    /// Bytes of one tightly packed canonical frame.
    pub fn frame_bytes(&self) -> usize {
        self.stride() as usize * self.height as usize
    }

    /// Blit that realizes this layout into `destination`.
    pub fn blit(&self, destination: SurfaceHandle) -> BlitOperation {
        BlitOperation {
            destination,
            scale: self.scale,
            offset: self.offset,
            source_slice: self.slice,
            destination_slice: self.slice,
            discard_destination: true,
        }
    }
}

/// Resolve the capture layout for the given renderer output.
pub fn resolve(source: &SourceDescriptor) -> CaptureResult<CaptureLayout> {
    let mut layout = CaptureLayout::full_frame(source.scaled_size());

    if source.stereo.is_multi_view() {
        layout.width = source.eye_width;
        layout.height = source.eye_height;
        layout.source_format = source.native_format;

        match source.stereo {
            StereoMode::Mono => {}
            StereoMode::SinglePass => {
                layout.scale = Vec2::new(0.5, 1.0);
                layout.offset = Vec2::ZERO;
            }
            StereoMode::MultiPass => {
                if source.camera_eyes == CameraEyes::Both {
                    return Err(CaptureError::UnsupportedConfiguration(
                        "multi-pass stereo renders both eyes from one camera, which would \
                         interleave two views into one stream; restrict the capture camera to \
                         a single eye or switch to single-pass stereo"
                            .to_string(),
                    ));
                }
            }
            StereoMode::SinglePassInstanced => {
                if !source.supports_array_blit {
                    return Err(CaptureError::UnsupportedConfiguration(
                        "single-pass instanced stereo needs array-slice blits, which this \
                         platform does not provide; switch to single-pass or multi-pass stereo"
                            .to_string(),
                    ));
                }
                layout.slice = Some(0);
            }
        }
    }

    if layout.width == 0 || layout.height == 0 {
        return Err(CaptureError::UnsupportedConfiguration(format!(
            "capture output has zero area ({}x{})",
            layout.width, layout.height
        )));
    }

    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_mono_is_full_frame() {
        let layout = resolve(&SourceDescriptor::mono(1920, 1080)).unwrap();
        assert_eq!(layout.size(), UVec2::new(1920, 1080));
        assert_eq!(layout.scale, Vec2::ONE);
        assert_eq!(layout.offset, Vec2::ZERO);
        assert_eq!(layout.slice, None);
        assert_eq!(layout.source_format, CANONICAL_FORMAT);
        assert_eq!(layout.stride(), 7680);
        assert_eq!(layout.frame_bytes(), 1920 * 1080 * 4);
    }

    #[test]
    fn test_mono_uses_scaled_size() {
        let source = SourceDescriptor::mono(1920, 1080).with_render_scale(0.5);
        let layout = resolve(&source).unwrap();
        assert_eq!(layout.size(), UVec2::new(960, 540));
    }

    #[test]
    fn test_side_by_side_selects_left_half() {
        let source =
            SourceDescriptor::stereo(StereoMode::SinglePass, 1440, 1600, PixelFormat::Rgba8Unorm);
        let layout = resolve(&source).unwrap();
        assert_eq!(layout.size(), UVec2::new(1440, 1600));
        assert_eq!(layout.scale.x, 0.5);
        assert_eq!(layout.offset.x, 0.0);
        assert_eq!(layout.source_format, PixelFormat::Rgba8Unorm);
        assert_eq!(layout.slice, None);
    }

    #[test]
    fn test_multi_pass_both_eyes_is_rejected() {
        let source =
            SourceDescriptor::stereo(StereoMode::MultiPass, 1440, 1600, PixelFormat::Rgba8Unorm);
        match resolve(&source) {
            Err(CaptureError::UnsupportedConfiguration(reason)) => {
                assert!(reason.contains("multi-pass"));
            }
            other => panic!("Expected UnsupportedConfiguration, got {other:?}"),
        }
    }

    #[rstest]
    #[case::left(CameraEyes::Left)]
    #[case::right(CameraEyes::Right)]
    fn test_multi_pass_single_eye_needs_no_transform(#[case] eyes: CameraEyes) {
        let source =
            SourceDescriptor::stereo(StereoMode::MultiPass, 1440, 1600, PixelFormat::Rgba8Unorm)
                .with_camera_eyes(eyes);
        let layout = resolve(&source).unwrap();
        assert_eq!(layout.size(), UVec2::new(1440, 1600));
        assert_eq!(layout.scale, Vec2::ONE);
        assert_eq!(layout.offset, Vec2::ZERO);
        assert_eq!(layout.slice, None);
    }

    #[rstest]
    #[case::supported(true)]
    #[case::unsupported(false)]
    fn test_instanced_selects_first_slice(#[case] array_blit: bool) {
        let source = SourceDescriptor::stereo(
            StereoMode::SinglePassInstanced,
            1440,
            1600,
            PixelFormat::Rgba16Float,
        )
        .with_array_blit(array_blit);

        match resolve(&source) {
            Ok(layout) => {
                assert!(array_blit);
                assert_eq!(layout.slice, Some(0));
                assert_eq!(layout.source_format, PixelFormat::Rgba16Float);
                let blit = layout.blit(SurfaceHandle::new(7));
                assert_eq!(blit.source_slice, Some(0));
                assert_eq!(blit.destination_slice, Some(0));
            }
            Err(err) => {
                assert!(!array_blit);
                assert!(matches!(err, CaptureError::UnsupportedConfiguration(_)));
            }
        }
    }

    #[test]
    fn test_zero_area_is_rejected() {
        let source = SourceDescriptor::mono(1920, 1080).with_render_scale(0.0);
        assert!(matches!(
            resolve(&source),
            Err(CaptureError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn test_blit_discards_destination() {
        let layout = resolve(&SourceDescriptor::mono(640, 480)).unwrap();
        let blit = layout.blit(SurfaceHandle::new(3));
        assert!(blit.discard_destination);
        assert_eq!(blit.destination, SurfaceHandle::new(3));
    }
}
