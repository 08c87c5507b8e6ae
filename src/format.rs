//! Pixel formats understood by the capture pipeline

use half::f16;

/// Texel format of a source render target or intermediate surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgb10a2Unorm,
    Rgba16Float,
}

/// Format of every frame handed to the outbound pipeline: 32-bit, byte order B,G,R,A.
pub const CANONICAL_FORMAT: PixelFormat = PixelFormat::Bgra8Unorm;

/// Bytes per pixel of [`CANONICAL_FORMAT`].
pub const CANONICAL_BYTES_PER_PIXEL: u32 = 4;

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Rgba8Unorm
            | PixelFormat::Rgba8UnormSrgb
            | PixelFormat::Bgra8Unorm
            | PixelFormat::Bgra8UnormSrgb
            | PixelFormat::Rgb10a2Unorm => 4,
            PixelFormat::Rgba16Float => 8,
        }
    }

    pub fn is_srgb(&self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba8UnormSrgb | PixelFormat::Bgra8UnormSrgb
        )
    }

    /// Convert one texel of this format into canonical B,G,R,A bytes.
    ///
    /// sRGB-encoded values are copied as-is; only the channel layout changes.
    /// `texel` must hold at least [`bytes_per_pixel`](Self::bytes_per_pixel) bytes.
    pub fn texel_to_bgra(&self, texel: &[u8]) -> [u8; 4] {
        match self {
            PixelFormat::Bgra8Unorm | PixelFormat::Bgra8UnormSrgb => {
                [texel[0], texel[1], texel[2], texel[3]]
            }
            PixelFormat::Rgba8Unorm | PixelFormat::Rgba8UnormSrgb => {
                [texel[2], texel[1], texel[0], texel[3]]
            }
            PixelFormat::Rgb10a2Unorm => {
                let bits = u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
                let r = bits & 0x3ff;
                let g = (bits >> 10) & 0x3ff;
                let b = (bits >> 20) & 0x3ff;
                let a = bits >> 30;
                [
                    unorm10_to_u8(b),
                    unorm10_to_u8(g),
                    unorm10_to_u8(r),
                    (a * 255 / 3) as u8,
                ]
            }
            PixelFormat::Rgba16Float => {
                let channel = |i: usize| {
                    let bits = u16::from_le_bytes([texel[i * 2], texel[i * 2 + 1]]);
                    unit_float_to_u8(f16::from_bits(bits).to_f32())
                };
                [channel(2), channel(1), channel(0), channel(3)]
            }
        }
    }
}

fn unorm10_to_u8(value: u32) -> u8 {
    ((value * 255 + 511) / 1023) as u8
}

fn unit_float_to_u8(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}
