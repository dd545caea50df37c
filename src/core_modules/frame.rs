// THEORY:
// The `frame` module holds the two buffer types the motion pipeline passes around
// and every whole-image operation the pipeline performs on them.
//
// - `ColorFrame` is what the capture collaborator hands over: packed RGB or RGBA
//   bytes of a known size. It is validated once on construction so the hot path
//   never has to re-check lengths.
// - `GrayFrame` is a single-channel byte image. The pipeline owns a handful of
//   them, allocated once at setup, and every operation below writes into an
//   existing buffer instead of returning a fresh one. This keeps a tick
//   allocation-free.
//
// Spatial pooling (`downsample_into`) is the same idea as averaging a chunk of
// pixels: a coarse cell takes the mean of the source block it covers, which both
// shrinks the work for later stages and cancels single-pixel sensor noise.

use crate::core_modules::pixel::pixel::Pixel;
use image::{DynamicImage, RgbImage, RgbaImage};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame buffer holds {got} bytes, expected {expected} for {width}x{height} {format:?}")]
    BufferSize {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        got: usize,
    },
    #[error("gray buffer holds {got} bytes, expected {expected}")]
    GrayBufferSize { expected: usize, got: usize },
    #[error("frame dimensions must be non-zero, got {width}x{height}")]
    Empty { width: u32, height: u32 },
}

/// Byte layout of a colour frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// A colour camera frame of known dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl ColorFrame {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                width,
                height,
                format,
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// A frame filled with one colour. Mostly useful for tests and synthetic sources.
    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Result<Self, FrameError> {
        let data = color.repeat(width as usize * height as usize);
        Self::new(width, height, PixelFormat::Rgb8, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        let channels = self.format.channels();
        let start = (y as usize * self.width as usize + x as usize) * channels;
        let bytes = &self.data[start..start + channels];
        match self.format {
            PixelFormat::Rgb8 => Pixel::from([bytes[0], bytes[1], bytes[2]]),
            PixelFormat::Rgba8 => Pixel::from([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Copies the frame into an RGBA image buffer; RGB frames come out opaque.
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        match self.format {
            PixelFormat::Rgb8 => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .map(|rgb| DynamicImage::ImageRgb8(rgb).to_rgba8()),
            PixelFormat::Rgba8 => RgbaImage::from_raw(self.width, self.height, self.data.clone()),
        }
    }

    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        let format = self.format;
        self.data.chunks_exact(format.channels()).map(move |bytes| match format {
            PixelFormat::Rgb8 => Pixel::from([bytes[0], bytes[1], bytes[2]]),
            PixelFormat::Rgba8 => Pixel::from([bytes[0], bytes[1], bytes[2], bytes[3]]),
        })
    }
}

/// A single-channel 8-bit image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl GrayFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    pub fn from_data(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::GrayBufferSize {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn same_size(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Reallocates the buffer for new dimensions and zeroes it.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(width as usize * height as usize, 0);
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn copy_from(&mut self, other: &GrayFrame) {
        if !self.same_size(other.width, other.height) {
            self.resize(other.width, other.height);
        }
        self.data.copy_from_slice(&other.data);
    }

    /// Converts a colour frame to grayscale into this buffer. The buffer must
    /// already have the frame's dimensions.
    pub fn fill_luma_from(&mut self, frame: &ColorFrame) {
        debug_assert!(self.same_size(frame.width(), frame.height()));
        for (gray, pixel) in self.data.iter_mut().zip(frame.pixels()) {
            *gray = pixel.gray();
        }
    }

    /// `self = |a - b|` per pixel. All three buffers share dimensions.
    pub fn abs_diff_of(&mut self, a: &GrayFrame, b: &GrayFrame) {
        debug_assert!(self.same_size(a.width, a.height) && a.same_size(b.width, b.height));
        for ((out, &va), &vb) in self.data.iter_mut().zip(&a.data).zip(&b.data) {
            *out = va.abs_diff(vb);
        }
    }

    /// Binary threshold: values at or above `threshold` saturate to 255, the rest drop to 0.
    pub fn threshold(&mut self, threshold: u8) {
        for value in self.data.iter_mut() {
            *value = if *value >= threshold { u8::MAX } else { 0 };
        }
    }

    /// Block-averages `self` into `out`, whose (smaller) dimensions define the grid.
    /// Block edges are spread evenly, so a 320-wide source pools into 60 cells of
    /// five or six columns each.
    pub fn downsample_into(&self, out: &mut GrayFrame) {
        let (sw, sh) = (self.width as usize, self.height as usize);
        let (ow, oh) = (out.width as usize, out.height as usize);
        for cy in 0..oh {
            let y0 = cy * sh / oh;
            let y1 = ((cy + 1) * sh / oh).max(y0 + 1).min(sh);
            for cx in 0..ow {
                let x0 = cx * sw / ow;
                let x1 = ((cx + 1) * sw / ow).max(x0 + 1).min(sw);
                // u64: a single cell can cover a whole multi-megapixel frame.
                let mut sum = 0u64;
                for y in y0..y1 {
                    let row = &self.data[y * sw + x0..y * sw + x1];
                    sum += row.iter().map(|&v| v as u64).sum::<u64>();
                }
                let count = ((y1 - y0) * (x1 - x0)) as u64;
                out.data[cy * ow + cx] = ((sum + count / 2) / count) as u8;
            }
        }
    }

    /// Separable box blur with a `(2 * radius + 1)` square kernel and clamped edges.
    /// `scratch` must match this frame's dimensions.
    pub fn box_blur(&mut self, radius: u32, scratch: &mut GrayFrame) {
        if radius == 0 {
            return;
        }
        debug_assert!(scratch.same_size(self.width, self.height));
        let (w, h) = (self.width as i64, self.height as i64);
        let r = radius as i64;
        let taps = (2 * r + 1) as u32;

        // --- 1. Horizontal pass into scratch ---
        for y in 0..h {
            for x in 0..w {
                let mut sum = 0u32;
                for dx in -r..=r {
                    let sx = (x + dx).clamp(0, w - 1);
                    sum += self.data[(y * w + sx) as usize] as u32;
                }
                scratch.data[(y * w + x) as usize] = ((sum + taps / 2) / taps) as u8;
            }
        }

        // --- 2. Vertical pass back into self ---
        for y in 0..h {
            for x in 0..w {
                let mut sum = 0u32;
                for dy in -r..=r {
                    let sy = (y + dy).clamp(0, h - 1);
                    sum += scratch.data[(sy * w + x) as usize] as u32;
                }
                self.data[(y * w + x) as usize] = ((sum + taps / 2) / taps) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_frame_rejects_wrong_buffer_length() {
        let err = ColorFrame::new(4, 4, PixelFormat::Rgb8, vec![0; 47]).unwrap_err();
        assert!(matches!(err, FrameError::BufferSize { expected: 48, got: 47, .. }));
        assert!(ColorFrame::new(0, 4, PixelFormat::Rgba8, Vec::new()).is_err());
    }

    #[test]
    fn luma_conversion_reads_every_pixel() {
        let frame = ColorFrame::filled(3, 2, [255, 255, 255]).unwrap();
        let mut gray = GrayFrame::new(3, 2);
        gray.fill_luma_from(&frame);
        assert!(gray.data().iter().all(|&v| v == 255));
    }

    #[test]
    fn threshold_at_255_zeroes_everything_below_saturation() {
        let mut gray = GrayFrame::from_data(4, 1, vec![0, 100, 200, 254]).unwrap();
        gray.threshold(255);
        assert_eq!(gray.data(), &[0, 0, 0, 0]);
    }

    #[test]
    fn threshold_saturates_at_and_above() {
        let mut gray = GrayFrame::from_data(4, 1, vec![199, 200, 201, 10]).unwrap();
        gray.threshold(200);
        assert_eq!(gray.data(), &[0, 255, 255, 0]);
    }

    #[test]
    fn abs_diff_is_symmetric() {
        let a = GrayFrame::from_data(3, 1, vec![10, 200, 50]).unwrap();
        let b = GrayFrame::from_data(3, 1, vec![30, 100, 50]).unwrap();
        let mut out = GrayFrame::new(3, 1);
        out.abs_diff_of(&a, &b);
        assert_eq!(out.data(), &[20, 100, 0]);
        out.abs_diff_of(&b, &a);
        assert_eq!(out.data(), &[20, 100, 0]);
    }

    #[test]
    fn downsample_averages_blocks() {
        // Left half 0, right half 200, 4x2 pooled into 2x1.
        let src = GrayFrame::from_data(4, 2, vec![0, 0, 200, 200, 0, 0, 200, 200]).unwrap();
        let mut out = GrayFrame::new(2, 1);
        src.downsample_into(&mut out);
        assert_eq!(out.data(), &[0, 200]);
    }

    #[test]
    fn downsample_handles_uneven_blocks() {
        let src = GrayFrame::from_data(5, 1, vec![10, 10, 10, 40, 40]).unwrap();
        let mut out = GrayFrame::new(2, 1);
        src.downsample_into(&mut out);
        assert_eq!(out.data(), &[10, 30]);
    }

    #[test]
    fn downsample_of_a_large_saturated_frame_into_one_cell() {
        let src = GrayFrame::from_data(4096, 4200, vec![255; 4096 * 4200]).unwrap();
        let mut out = GrayFrame::new(1, 1);
        src.downsample_into(&mut out);
        assert_eq!(out.data(), &[255]);
    }

    #[test]
    fn rgb_frame_converts_to_opaque_rgba() {
        let frame = ColorFrame::filled(2, 2, [10, 20, 30]).unwrap();
        let image = frame.to_rgba_image().unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(1, 1).0, [10, 20, 30, 255]);
    }

    #[test]
    fn blur_keeps_uniform_images_uniform() {
        let mut gray = GrayFrame::from_data(6, 4, vec![90; 24]).unwrap();
        let mut scratch = GrayFrame::new(6, 4);
        gray.box_blur(2, &mut scratch);
        assert!(gray.data().iter().all(|&v| v == 90));
    }

    #[test]
    fn blur_spreads_a_single_spike() {
        let mut data = vec![0; 25];
        data[12] = 250;
        let mut gray = GrayFrame::from_data(5, 5, data).unwrap();
        let mut scratch = GrayFrame::new(5, 5);
        gray.box_blur(1, &mut scratch);
        assert!(gray.get(2, 2) > 0);
        assert!(gray.get(1, 1) > 0);
        assert_eq!(gray.get(0, 0), 0);
        assert!(gray.get(2, 2) < 250);
    }
}
