//! Planar 8-bit image frames
//!
//! Frames enter the delay line as borrowed [`PlanarImage`] views: one
//! [`Plane`] per channel, each with its own row stride ("pitch"), so cropped
//! or padded producer buffers can be recorded without an intermediate copy.
//! Stored and retrieved frames live in an owned [`ImageBuffer`].
//!
//! # Layouts
//!
//! Only two layouts exist:
//! - [`ChannelLayout::Gray`]: a single luminance plane
//! - [`ChannelLayout::Rgba`]: four planes (red, green, blue, alpha)
//!
//! The packing helpers convert between the planar form and the packed form
//! the codec works with (1 byte per pixel for gray, 4 for RGBA).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Row alignment for owned image storage (matches SIMD-friendly 16-byte rows)
pub const PITCH_ALIGNMENT: usize = 16;

/// Maximum number of planes an image can carry
pub const MAX_CHANNELS: usize = 4;

/// Channel arrangement of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// One luminance plane
    #[default]
    Gray,
    /// Red, green, blue and alpha planes
    Rgba,
}

impl ChannelLayout {
    /// Number of planes for this layout
    #[inline]
    pub fn channel_count(self) -> usize {
        match self {
            ChannelLayout::Gray => 1,
            ChannelLayout::Rgba => 4,
        }
    }
}

/// Errors raised while building an image view
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// Row stride shorter than a row of pixels
    #[error("Plane {plane}: pitch {pitch} is smaller than width {width}")]
    PitchTooSmall {
        plane: usize,
        pitch: usize,
        width: usize,
    },

    /// Plane slice cannot hold the requested geometry
    #[error("Plane {plane}: {len} bytes, need at least {required} for {width}x{height}")]
    PlaneTooShort {
        plane: usize,
        len: usize,
        required: usize,
        width: usize,
        height: usize,
    },
}

/// Result type for image construction
pub type ImageResult<T> = Result<T, ImageError>;

/// A single borrowed channel of 8-bit samples
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    /// Sample data, row `y` starts at `y * pitch`
    pub data: &'a [u8],
    /// Byte distance between the starts of consecutive rows
    pub pitch: usize,
}

impl<'a> Plane<'a> {
    /// Create a plane with an explicit row stride
    pub fn new(data: &'a [u8], pitch: usize) -> Self {
        Self { data, pitch }
    }

    /// Create a plane whose rows are packed back to back
    pub fn tight(data: &'a [u8], width: usize) -> Self {
        Self { data, pitch: width }
    }

    /// Row `y`, trimmed to `width` samples
    ///
    /// Zero-width rows are empty whatever the pitch.
    #[inline]
    pub fn row(&self, y: usize, width: usize) -> &'a [u8] {
        if width == 0 {
            return &[];
        }
        let start = y * self.pitch;
        &self.data[start..start + width]
    }
}

/// Bytes a plane must hold for the given geometry
#[inline]
fn required_len(pitch: usize, width: usize, height: usize) -> usize {
    if width == 0 || height == 0 {
        0
    } else {
        pitch * (height - 1) + width
    }
}

/// Round a row width up to [`PITCH_ALIGNMENT`]
#[inline]
fn padded_pitch(width: usize) -> usize {
    (width + PITCH_ALIGNMENT - 1) & !(PITCH_ALIGNMENT - 1)
}

/// Borrowed view over a gray or RGBA frame
///
/// Every plane shares the frame's width and height but keeps its own pitch.
/// A view with zero width or height is legal; such frames are "degenerate"
/// and the delay line never hands them to the codec.
#[derive(Debug, Clone, Copy)]
pub struct PlanarImage<'a> {
    width: usize,
    height: usize,
    layout: ChannelLayout,
    planes: [Plane<'a>; MAX_CHANNELS],
}

impl<'a> PlanarImage<'a> {
    /// Single-plane luminance view
    pub fn gray(plane: Plane<'a>, width: usize, height: usize) -> ImageResult<Self> {
        validate_plane(0, &plane, width, height)?;
        Ok(Self {
            width,
            height,
            layout: ChannelLayout::Gray,
            planes: [plane; MAX_CHANNELS],
        })
    }

    /// Four-plane color view, planes ordered red, green, blue, alpha
    pub fn rgba(planes: [Plane<'a>; MAX_CHANNELS], width: usize, height: usize) -> ImageResult<Self> {
        for (index, plane) in planes.iter().enumerate() {
            validate_plane(index, plane, width, height)?;
        }
        Ok(Self {
            width,
            height,
            layout: ChannelLayout::Rgba,
            planes,
        })
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

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.layout.channel_count()
    }

    /// True when the frame has no pixels at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Plane `index` (0..channel_count)
    #[inline]
    pub fn plane(&self, index: usize) -> Plane<'a> {
        debug_assert!(index < self.channel_count(), "plane index out of range");
        self.planes[index]
    }
}

fn validate_plane(index: usize, plane: &Plane<'_>, width: usize, height: usize) -> ImageResult<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }

    if plane.pitch < width {
        return Err(ImageError::PitchTooSmall {
            plane: index,
            pitch: plane.pitch,
            width,
        });
    }

    let required = required_len(plane.pitch, width, height);
    if plane.data.len() < required {
        return Err(ImageError::PlaneTooShort {
            plane: index,
            len: plane.data.len(),
            required,
            width,
            height,
        });
    }

    Ok(())
}

/// Owned planar frame storage
///
/// All planes live in one allocation, plane `c` starting at
/// `c * pitch * height`. The pitch is the width rounded up to
/// [`PITCH_ALIGNMENT`].
#[derive(Debug, Clone, Default)]
pub struct ImageBuffer {
    data: Vec<u8>,
    width: usize,
    height: usize,
    layout: ChannelLayout,
    pitch: usize,
}

impl ImageBuffer {
    /// Empty 0x0 buffer (no allocation)
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-filled buffer of the given geometry
    pub fn with_size(width: usize, height: usize, layout: ChannelLayout) -> Self {
        let mut buffer = Self::new();
        buffer.alloc(width, height, layout);
        buffer
    }

    /// Deep copy of a borrowed view
    pub fn from_image(image: &PlanarImage<'_>) -> Self {
        let mut buffer = Self::new();
        buffer.copy_from(image);
        buffer
    }

    fn alloc(&mut self, width: usize, height: usize, layout: ChannelLayout) {
        let pitch = padded_pitch(width);
        self.data = vec![0; pitch * height * layout.channel_count()];
        self.width = width;
        self.height = height;
        self.layout = layout;
        self.pitch = pitch;
    }

    /// Reallocate only when the geometry differs from the current one
    ///
    /// Returns true when a new allocation was made. Contents are unspecified
    /// after a call that did not reallocate.
    pub fn alloc_on_size_change(&mut self, width: usize, height: usize, layout: ChannelLayout) -> bool {
        if self.width == width && self.height == height && self.layout == layout {
            return false;
        }
        self.alloc(width, height, layout);
        true
    }

    /// Copy `image` into this buffer, honoring both pitches
    pub fn copy_from(&mut self, image: &PlanarImage<'_>) {
        self.alloc_on_size_change(image.width(), image.height(), image.layout());
        if image.is_empty() {
            return;
        }

        let (width, height, pitch) = (self.width, self.height, self.pitch);
        for channel in 0..image.channel_count() {
            let src = image.plane(channel);
            let dst = self.plane_mut(channel);
            for y in 0..height {
                dst[y * pitch..y * pitch + width].copy_from_slice(src.row(y, width));
            }
        }
    }

    /// Borrowed view over this buffer
    pub fn as_image(&self) -> PlanarImage<'_> {
        let mut planes = [Plane::new(&[], self.pitch); MAX_CHANNELS];
        for (channel, plane) in planes.iter_mut().enumerate().take(self.channel_count()) {
            *plane = Plane::new(self.plane_data(channel), self.pitch);
        }
        if self.layout == ChannelLayout::Gray {
            planes = [planes[0]; MAX_CHANNELS];
        }

        PlanarImage {
            width: self.width,
            height: self.height,
            layout: self.layout,
            planes,
        }
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

    #[inline]
    pub fn pitch(&self) -> usize {
        self.pitch
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.layout.channel_count()
    }

    #[inline]
    fn plane_len(&self) -> usize {
        self.pitch * self.height
    }

    /// Raw bytes of plane `channel`, padding included
    pub fn plane_data(&self, channel: usize) -> &[u8] {
        let len = self.plane_len();
        &self.data[channel * len..(channel + 1) * len]
    }

    /// Mutable bytes of plane `channel`, padding included
    pub fn plane_mut(&mut self, channel: usize) -> &mut [u8] {
        let len = self.plane_len();
        &mut self.data[channel * len..(channel + 1) * len]
    }

    /// Row `y` of plane `channel`, trimmed to the image width
    #[inline]
    pub fn row(&self, channel: usize, y: usize) -> &[u8] {
        let start = channel * self.plane_len() + y * self.pitch;
        &self.data[start..start + self.width]
    }

    /// Allocated bytes (`pitch * height * channels`)
    #[inline]
    pub fn memory_usage(&self) -> usize {
        self.data.len()
    }

    /// Pixel-wise equality with a view, ignoring row padding
    pub fn same_pixels(&self, image: &PlanarImage<'_>) -> bool {
        if self.width != image.width() || self.height != image.height() || self.layout != image.layout() {
            return false;
        }
        (0..self.channel_count()).all(|channel| {
            let plane = image.plane(channel);
            (0..self.height).all(|y| self.row(channel, y) == plane.row(y, self.width))
        })
    }
}

/// Pack a planar view into `out` (gray: 1 byte/px, RGBA: 4 bytes/px)
///
/// `out` is cleared first; its capacity is kept.
pub fn interleave_into(image: &PlanarImage<'_>, out: &mut Vec<u8>) {
    let (width, height) = (image.width(), image.height());
    out.clear();
    out.reserve(width * height * image.channel_count());

    match image.layout() {
        ChannelLayout::Gray => {
            let plane = image.plane(0);
            for y in 0..height {
                out.extend_from_slice(plane.row(y, width));
            }
        }
        ChannelLayout::Rgba => {
            let [r, g, b, a] = [image.plane(0), image.plane(1), image.plane(2), image.plane(3)];
            for y in 0..height {
                let (r, g, b, a) = (r.row(y, width), g.row(y, width), b.row(y, width), a.row(y, width));
                for x in 0..width {
                    out.extend_from_slice(&[r[x], g[x], b[x], a[x]]);
                }
            }
        }
    }
}

/// Unpack a packed buffer into planar storage
///
/// `packed` must hold `width * height * layout.channel_count()` bytes.
pub fn deinterleave_into(packed: &[u8], width: usize, height: usize, layout: ChannelLayout, out: &mut ImageBuffer) {
    debug_assert!(
        packed.len() >= width * height * layout.channel_count(),
        "packed buffer too short"
    );

    out.alloc_on_size_change(width, height, layout);
    let pitch = out.pitch();

    match layout {
        ChannelLayout::Gray => {
            let dst = out.plane_mut(0);
            for (y, src) in packed.chunks_exact(width.max(1)).take(height).enumerate() {
                dst[y * pitch..y * pitch + width].copy_from_slice(&src[..width]);
            }
        }
        ChannelLayout::Rgba => {
            let plane_len = pitch * height;
            let (r, rest) = out.data.split_at_mut(plane_len);
            let (g, rest) = rest.split_at_mut(plane_len);
            let (b, a) = rest.split_at_mut(plane_len);

            for y in 0..height {
                let src = &packed[y * width * 4..(y + 1) * width * 4];
                let row = y * pitch;
                for (x, px) in src.chunks_exact(4).enumerate() {
                    r[row + x] = px[0];
                    g[row + x] = px[1];
                    b[row + x] = px[2];
                    a[row + x] = px[3];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize, pitch: usize, seed: u8) -> Vec<u8> {
        let mut data = vec![0xEE; pitch * height];
        for y in 0..height {
            for x in 0..width {
                data[y * pitch + x] = (x * 7 + y * 3) as u8 ^ seed;
            }
        }
        data
    }

    #[test]
    fn test_layout_channel_counts() {
        assert_eq!(ChannelLayout::Gray.channel_count(), 1);
        assert_eq!(ChannelLayout::Rgba.channel_count(), 4);
    }

    #[test]
    fn test_pitch_too_small_rejected() {
        let data = vec![0u8; 64];
        let err = PlanarImage::gray(Plane::new(&data, 4), 8, 4).unwrap_err();
        assert_eq!(err, ImageError::PitchTooSmall { plane: 0, pitch: 4, width: 8 });
    }

    #[test]
    fn test_short_plane_rejected() {
        let data = vec![0u8; 20];
        let err = PlanarImage::gray(Plane::new(&data, 8), 8, 4).unwrap_err();
        assert!(matches!(err, ImageError::PlaneTooShort { required: 32, .. }));
        assert!(err.to_string().contains("8x4"));
    }

    #[test]
    fn test_last_row_may_omit_padding() {
        // 3 full rows of pitch 10 plus one unpadded row of 6
        let data = vec![1u8; 36];
        assert!(PlanarImage::gray(Plane::new(&data, 10), 6, 4).is_ok());
    }

    #[test]
    fn test_degenerate_image_is_valid() {
        let image = PlanarImage::gray(Plane::new(&[], 0), 0, 12).unwrap();
        assert!(image.is_empty());
        let buffer = ImageBuffer::from_image(&image);
        assert_eq!(buffer.memory_usage(), 0);
        assert_eq!(buffer.height(), 12);
    }

    #[test]
    fn test_zero_width_view_with_pitch_copies() {
        // Degenerate views skip plane validation, so the pitch can exceed the data
        let image = PlanarImage::gray(Plane::new(&[], 8), 0, 4).unwrap();
        assert!(image.plane(0).row(3, 0).is_empty());

        let buffer = ImageBuffer::from_image(&image);
        assert_eq!((buffer.width(), buffer.height()), (0, 4));
        assert_eq!(buffer.memory_usage(), 0);
        assert!(buffer.same_pixels(&image));
    }

    #[test]
    fn test_copy_from_honors_source_pitch() {
        let data = gradient(5, 3, 9, 0);
        let image = PlanarImage::gray(Plane::new(&data, 9), 5, 3).unwrap();

        let buffer = ImageBuffer::from_image(&image);
        assert_eq!(buffer.pitch(), 16);
        assert!(buffer.same_pixels(&image));
        assert_eq!(buffer.row(0, 2), &data[18..23]);
    }

    #[test]
    fn test_alloc_on_size_change_reuses_storage() {
        let mut buffer = ImageBuffer::with_size(32, 8, ChannelLayout::Rgba);
        assert!(!buffer.alloc_on_size_change(32, 8, ChannelLayout::Rgba));
        assert!(buffer.alloc_on_size_change(32, 8, ChannelLayout::Gray));
        assert_eq!(buffer.memory_usage(), 32 * 8);
    }

    #[test]
    fn test_rgba_interleave_deinterleave() {
        let (w, h) = (7, 5);
        let planes: Vec<Vec<u8>> = (0..4).map(|c| gradient(w, h, w, c * 40)).collect();
        let image = PlanarImage::rgba(
            [
                Plane::tight(&planes[0], w),
                Plane::tight(&planes[1], w),
                Plane::tight(&planes[2], w),
                Plane::tight(&planes[3], w),
            ],
            w,
            h,
        )
        .unwrap();

        let mut packed = Vec::new();
        interleave_into(&image, &mut packed);
        assert_eq!(packed.len(), w * h * 4);
        assert_eq!(&packed[4..8], &[planes[0][1], planes[1][1], planes[2][1], planes[3][1]]);

        let mut out = ImageBuffer::new();
        deinterleave_into(&packed, w, h, ChannelLayout::Rgba, &mut out);
        assert!(out.same_pixels(&image));
    }

    #[test]
    fn test_gray_as_image_repeats_plane() {
        let buffer = ImageBuffer::with_size(4, 4, ChannelLayout::Gray);
        let view = buffer.as_image();
        assert_eq!(view.channel_count(), 1);
        assert_eq!(view.plane(0).pitch, 16);
        assert_eq!(view.plane(0).data.len(), 16 * 4);
    }
}
