//! Frame codec boundary
//!
//! The delay line treats compression as a black box behind [`FrameCodec`].
//! Codecs work on packed pixels: gray frames are 1 byte per pixel, RGBA
//! frames 4 bytes per pixel. Lossy codecs may drop the alpha channel on
//! encode; decoding an RGBA frame always yields opaque alpha.
//!
//! [`JpegCodec`] is the default implementation, built on the pure-Rust
//! `jpeg-encoder` and `jpeg-decoder` crates.

use jpeg_decoder::PixelFormat;
use jpeg_encoder::{ColorType, Encoder};
use thiserror::Error;

use crate::image::ChannelLayout;

/// Default JPEG quality when none is configured
pub const DEFAULT_QUALITY: u8 = 85;

/// Errors reported by a codec
#[derive(Error, Debug)]
pub enum CodecError {
    /// Frame geometry the codec cannot represent
    #[error("Unsupported frame size {width}x{height}")]
    UnsupportedDimensions { width: usize, height: usize },

    /// Packed input shorter than the declared geometry
    #[error("Pixel buffer holds {len} bytes, expected {expected}")]
    BufferSize { len: usize, expected: usize },

    /// The encoder rejected the frame
    #[error("Encode failed: {0}")]
    Encode(String),

    /// The byte stream could not be decoded
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Decoded stream uses a pixel format with no planar mapping
    #[error("Unsupported decoded pixel format: {0}")]
    UnsupportedPixelFormat(String),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Geometry of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInfo {
    pub width: usize,
    pub height: usize,
}

/// Compressed frame plus the geometry it was encoded from
///
/// Created once by the compression worker and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedFrame {
    bytes: Box<[u8]>,
    width: usize,
    height: usize,
    layout: ChannelLayout,
}

impl CompressedFrame {
    pub fn new(bytes: impl Into<Box<[u8]>>, width: usize, height: usize, layout: ChannelLayout) -> Self {
        Self {
            bytes: bytes.into(),
            width,
            height,
            layout,
        }
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Size of the compressed stream in bytes
    #[inline]
    pub fn memory_usage(&self) -> usize {
        self.bytes.len()
    }
}

/// Image compression collaborator
///
/// Implementations must be shareable: the worker thread encodes while the
/// owner thread decodes.
pub trait FrameCodec: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &'static str;

    /// Encode packed `pixels` into `out` (cleared first)
    fn encode(
        &self,
        pixels: &[u8],
        width: usize,
        height: usize,
        layout: ChannelLayout,
        quality: u8,
        out: &mut Vec<u8>,
    ) -> CodecResult<()>;

    /// Decode `bytes` into packed pixels of `layout` in `out` (cleared first)
    fn decode(&self, bytes: &[u8], layout: ChannelLayout, out: &mut Vec<u8>) -> CodecResult<DecodedInfo>;
}

/// Clamp an arbitrary quality level into JPEG's 1..=100 range
pub fn clamp_quality(level: i32) -> u8 {
    level.clamp(1, 100) as u8
}

/// JPEG codec (grayscale for 1-channel frames, YCbCr for RGBA)
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl FrameCodec for JpegCodec {
    fn name(&self) -> &'static str {
        "jpeg"
    }

    fn encode(
        &self,
        pixels: &[u8],
        width: usize,
        height: usize,
        layout: ChannelLayout,
        quality: u8,
        out: &mut Vec<u8>,
    ) -> CodecResult<()> {
        let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(CodecError::UnsupportedDimensions { width, height }),
        };

        let expected = width * height * layout.channel_count();
        if pixels.len() < expected {
            return Err(CodecError::BufferSize {
                len: pixels.len(),
                expected,
            });
        }

        let color_type = match layout {
            ChannelLayout::Gray => ColorType::Luma,
            // Alpha is ignored by the encoder
            ChannelLayout::Rgba => ColorType::Rgba,
        };

        out.clear();
        let encoder = Encoder::new(&mut *out, quality.clamp(1, 100));
        encoder
            .encode(&pixels[..expected], w, h, color_type)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8], layout: ChannelLayout, out: &mut Vec<u8>) -> CodecResult<DecodedInfo> {
        let mut decoder = jpeg_decoder::Decoder::new(bytes);
        let pixels = decoder.decode().map_err(|e| CodecError::Decode(e.to_string()))?;
        let info = decoder
            .info()
            .ok_or_else(|| CodecError::Decode("missing frame header".to_string()))?;

        let decoded = DecodedInfo {
            width: info.width as usize,
            height: info.height as usize,
        };
        let count = decoded.width * decoded.height;

        out.clear();
        out.reserve(count * layout.channel_count());

        match (info.pixel_format, layout) {
            (PixelFormat::L8, ChannelLayout::Gray) => {
                out.extend_from_slice(&pixels[..count]);
            }
            (PixelFormat::L8, ChannelLayout::Rgba) => {
                for &l in &pixels[..count] {
                    out.extend_from_slice(&[l, l, l, 255]);
                }
            }
            (PixelFormat::RGB24, ChannelLayout::Gray) => {
                for px in pixels.chunks_exact(3).take(count) {
                    out.push(luma(px[0], px[1], px[2]));
                }
            }
            (PixelFormat::RGB24, ChannelLayout::Rgba) => {
                for px in pixels.chunks_exact(3).take(count) {
                    out.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
            }
            (other, _) => return Err(CodecError::UnsupportedPixelFormat(format!("{:?}", other))),
        }

        if out.len() < count * layout.channel_count() {
            return Err(CodecError::Decode("truncated pixel data".to_string()));
        }

        Ok(decoded)
    }
}

/// Rec.601 luma from 8-bit RGB
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
        let total: u64 = a.iter().zip(b).map(|(&x, &y)| (x as i32 - y as i32).unsigned_abs() as u64).sum();
        total as f64 / a.len() as f64
    }

    #[test]
    fn test_quality_clamp() {
        assert_eq!(clamp_quality(-5), 1);
        assert_eq!(clamp_quality(0), 1);
        assert_eq!(clamp_quality(75), 75);
        assert_eq!(clamp_quality(400), 100);
    }

    #[test]
    fn test_gray_roundtrip_is_close() {
        let (w, h) = (32, 16);
        let pixels: Vec<u8> = (0..w * h).map(|i| ((i % w) * 4) as u8).collect();

        let mut encoded = Vec::new();
        JpegCodec.encode(&pixels, w, h, ChannelLayout::Gray, 95, &mut encoded).unwrap();
        assert_eq!(&encoded[..2], &[0xFF, 0xD8], "stream starts with SOI");

        let mut decoded = Vec::new();
        let info = JpegCodec.decode(&encoded, ChannelLayout::Gray, &mut decoded).unwrap();
        assert_eq!(info, DecodedInfo { width: w, height: h });
        assert_eq!(decoded.len(), w * h);
        assert!(mean_abs_diff(&pixels, &decoded) < 4.0);
    }

    #[test]
    fn test_rgba_decode_restores_opaque_alpha() {
        let (w, h) = (16, 16);
        let mut pixels = Vec::with_capacity(w * h * 4);
        for _ in 0..w * h {
            pixels.extend_from_slice(&[200, 100, 50, 7]);
        }

        let mut encoded = Vec::new();
        JpegCodec.encode(&pixels, w, h, ChannelLayout::Rgba, 90, &mut encoded).unwrap();

        let mut decoded = Vec::new();
        JpegCodec.decode(&encoded, ChannelLayout::Rgba, &mut decoded).unwrap();
        assert_eq!(decoded.len(), w * h * 4);
        assert!(decoded.chunks_exact(4).all(|px| px[3] == 255));
        assert!((decoded[0] as i32 - 200).abs() < 8);
        assert!((decoded[1] as i32 - 100).abs() < 8);
        assert!((decoded[2] as i32 - 50).abs() < 8);
    }

    #[test]
    fn test_zero_size_rejected() {
        let mut out = Vec::new();
        let err = JpegCodec.encode(&[], 0, 4, ChannelLayout::Gray, 80, &mut out).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedDimensions { width: 0, height: 4 }));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut out = Vec::new();
        let err = JpegCodec.encode(&[0; 4], 70_000, 1, ChannelLayout::Gray, 80, &mut out).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedDimensions { .. }));
    }

    #[test]
    fn test_short_buffer_rejected() {
        let mut out = Vec::new();
        let err = JpegCodec.encode(&[0; 10], 4, 4, ChannelLayout::Gray, 80, &mut out).unwrap_err();
        assert!(matches!(err, CodecError::BufferSize { len: 10, expected: 16 }));
    }

    #[test]
    fn test_garbage_fails_to_decode() {
        let mut out = Vec::new();
        assert!(JpegCodec.decode(&[1, 2, 3, 4], ChannelLayout::Gray, &mut out).is_err());
    }
}
