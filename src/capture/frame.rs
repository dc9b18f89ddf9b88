//! Frame type representing a captured image with metadata.

use std::sync::Arc;
use std::time::Instant;

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One byte of luminance per pixel.
    Luma8,
    /// Four bytes per pixel, red first.
    Rgba8,
    /// Full-resolution Y plane followed by interleaved VU at quarter resolution.
    Nv21,
    /// Full-resolution Y plane followed by U and V planes at quarter resolution.
    Yuv420,
}

impl PixelFormat {
    /// Buffer length required for a frame of the given dimensions.
    pub fn buffer_len(self, width: u32, height: u32) -> usize {
        let pixels = (width as usize) * (height as usize);
        match self {
            PixelFormat::Luma8 => pixels,
            PixelFormat::Rgba8 => pixels * 4,
            PixelFormat::Nv21 | PixelFormat::Yuv420 => pixels + 2 * pixels.div_ceil(4),
        }
    }
}

/// A single captured frame from the live source.
///
/// The pixel buffer is shared, so handing a frame to the detector does not
/// copy it. Dropping the last clone returns the buffer to the source.
#[derive(Clone)]
pub struct Frame {
    /// Raw pixel data in `format` layout.
    pixels: Arc<[u8]>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Clockwise rotation needed to display the frame upright.
    rotation_degrees: u16,
    /// Buffer layout.
    format: PixelFormat,
    /// Capture timestamp.
    timestamp: Instant,
    /// Monotonic sequence number.
    sequence: u64,
}

impl Frame {
    /// Creates a new grayscale frame with the given parameters.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            pixels: pixels.into(),
            width,
            height,
            rotation_degrees: 0,
            format: PixelFormat::Luma8,
            timestamp: Instant::now(),
            sequence,
        }
    }

    /// Sets the buffer layout.
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the display rotation, normalized to 0, 90, 180 or 270.
    pub fn with_rotation(mut self, degrees: u16) -> Self {
        self.rotation_degrees = (degrees / 90 % 4) * 90;
        self
    }

    /// Returns a reference to the raw pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the display rotation in degrees.
    #[inline]
    pub fn rotation_degrees(&self) -> u16 {
        self.rotation_degrees
    }

    /// Returns the buffer layout.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the total number of pixels (width * height).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Validates that the pixel buffer size matches dimensions and layout.
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == self.format.buffer_len(self.width, self.height)
    }

    /// Luminance at `(x, y)`, or 0 outside the buffer.
    ///
    /// YUV layouts read the Y plane directly; RGBA uses integer BT.601 weights.
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        let index = (y as usize) * (self.width as usize) + x as usize;
        match self.format {
            PixelFormat::Luma8 | PixelFormat::Nv21 | PixelFormat::Yuv420 => {
                self.pixels.get(index).copied().unwrap_or(0)
            }
            PixelFormat::Rgba8 => {
                let offset = index * 4;
                match self.pixels.get(offset..offset + 3) {
                    Some([r, g, b]) => {
                        ((77 * u32::from(*r) + 150 * u32::from(*g) + 29 * u32::from(*b)) >> 8)
                            as u8
                    }
                    _ => 0,
                }
            }
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("rotation", &self.rotation_degrees)
            .field("sequence", &self.sequence)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let pixels = vec![0u8; 640 * 480];
        let frame = Frame::new(pixels, 640, 480, 1);

        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 480);
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.format(), PixelFormat::Luma8);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_frame_invalid_size() {
        let pixels = vec![0u8; 100]; // Wrong size
        let frame = Frame::new(pixels, 640, 480, 1);

        assert!(!frame.is_valid());
    }

    #[test]
    fn test_nv21_buffer_len() {
        let frame = Frame::new(vec![0u8; 6 * 4 * 3 / 2], 6, 4, 1).with_format(PixelFormat::Nv21);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_rotation_normalized() {
        let frame = Frame::new(vec![0u8; 4], 2, 2, 1).with_rotation(450);
        assert_eq!(frame.rotation_degrees(), 90);
    }

    #[test]
    fn test_luma_from_rgba() {
        let pixels = vec![255, 255, 255, 255, 0, 0, 0, 255];
        let frame = Frame::new(pixels, 2, 1, 1).with_format(PixelFormat::Rgba8);

        assert_eq!(frame.luma(0, 0), 255);
        assert_eq!(frame.luma(1, 0), 0);
        assert_eq!(frame.luma(5, 0), 0);
    }
}
