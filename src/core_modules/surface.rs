// THEORY:
// The `surface` module is the seam between the simulation core and whatever
// actually puts light on the wall. Window and graphics-context creation are not
// this crate's job; all the core needs is something that accepts a homogeneous
// 2D transform, applies it to every primitive drawn until it is popped, and
// exposes a small vocabulary of primitives.
//
// `Surface` is that contract. `RasterSurface` is the in-tree implementation:
// `imageproc` drawing over an `image::RgbaImage`. It is what the demo
// driver snapshots to PNG and what the compositor uses as its offscreen camera
// buffer. Shapes are mapped through the transform vertex by vertex, so a circle
// drawn through a perspective warp comes out as the correct ellipse-ish polygon
// rather than a circle at a transformed centre.

use crate::core_modules::homography::project;
use image::{Rgba, RgbaImage, imageops};
use imageproc::drawing::{
    Blend, draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut, draw_polygon_mut,
};
use imageproc::point::Point;
use nalgebra::{Matrix3, Point2};

pub type Color = Rgba<u8>;

pub const WHITE: Color = Rgba([255, 255, 255, 255]);
pub const BLACK: Color = Rgba([0, 0, 0, 255]);
pub const MAGENTA: Color = Rgba([255, 0, 255, 255]);
pub const YELLOW: Color = Rgba([255, 255, 0, 255]);
pub const RED: Color = Rgba([255, 0, 0, 255]);
pub const BACKGROUND: Color = Rgba([50, 50, 50, 255]);

const CIRCLE_SEGMENTS: usize = 32;

/// Axis-aligned rectangle in whatever space it is drawn in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Corners in ring order: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Point2<f64>; 4] {
        [
            Point2::new(self.x, self.y),
            Point2::new(self.x + self.width, self.y),
            Point2::new(self.x + self.width, self.y + self.height),
            Point2::new(self.x, self.y + self.height),
        ]
    }
}

/// A render target that honours a transform stack.
pub trait Surface {
    /// Multiplies `transform` onto the current transform until the matching `pop_transform`.
    fn push_transform(&mut self, transform: &Matrix3<f64>);
    fn pop_transform(&mut self);
    fn set_color(&mut self, color: Color);
    fn line(&mut self, from: Point2<f64>, to: Point2<f64>);
    /// Closed outline through `points`.
    fn polygon(&mut self, points: &[Point2<f64>], filled: bool);
    fn circle(&mut self, center: Point2<f64>, radius: f64, filled: bool);
    /// Blits an image with its top-left at `at`. Only the position is transformed.
    fn image(&mut self, image: &RgbaImage, at: Point2<f64>);
    fn text(&mut self, text: &str, at: Point2<f64>);

    fn rect(&mut self, rect: &Rect, filled: bool) {
        self.polygon(&rect.corners(), filled);
    }
}

/// A bitmap string the surface was asked to show. Glyph rendering is left to the
/// host; the raster surface only records what and where.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub text: String,
    pub at: Point2<f64>,
}

/// Software rasteriser over an RGBA image. Pixels are written through
/// `imageproc`'s blending canvas, so translucent colours composite source-over.
pub struct RasterSurface {
    canvas: Blend<RgbaImage>,
    color: Color,
    transforms: Vec<Matrix3<f64>>,
    captions: Vec<Caption>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: Blend(RgbaImage::from_pixel(width, height, BACKGROUND)),
            color: WHITE,
            transforms: Vec::new(),
            captions: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.canvas.0.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.0.height()
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas.0
    }

    pub fn canvas_mut(&mut self) -> &mut RgbaImage {
        &mut self.canvas.0
    }

    pub fn captions(&self) -> &[Caption] {
        &self.captions
    }

    /// Fills the canvas and forgets captions and any unbalanced transforms.
    pub fn clear(&mut self, color: Color) {
        for pixel in self.canvas.0.pixels_mut() {
            *pixel = color;
        }
        self.captions.clear();
        self.transforms.clear();
    }

    pub fn transform_depth(&self) -> usize {
        self.transforms.len()
    }

    fn current(&self) -> Matrix3<f64> {
        self.transforms.last().copied().unwrap_or_else(Matrix3::identity)
    }

    fn map(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        match self.transforms.last() {
            Some(m) => project(m, p),
            None => Some(p),
        }
    }

    fn raster_line(&mut self, a: Point2<f64>, b: Point2<f64>) {
        if !within_raster_range(a) || !within_raster_range(b) {
            return;
        }
        draw_line_segment_mut(
            &mut self.canvas,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            self.color,
        );
    }

    fn raster_outline(&mut self, points: &[Point2<f64>]) {
        for (i, &a) in points.iter().enumerate() {
            self.raster_line(a, points[(i + 1) % points.len()]);
        }
    }

    fn raster_fill(&mut self, points: &[Point2<f64>]) {
        if !points.iter().all(|p| within_raster_range(*p)) {
            return;
        }
        let mut vertices: Vec<Point<i32>> = points
            .iter()
            .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
            .collect();
        // `draw_polygon_mut` wants an open ring with distinct end points.
        vertices.dedup();
        while vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            self.raster_outline(points);
            return;
        }
        draw_polygon_mut(&mut self.canvas, &vertices, self.color);
    }
}

/// Points this far outside any sane canvas come from a transform pushing them
/// towards the horizon; they are skipped rather than walked pixel by pixel.
fn within_raster_range(p: Point2<f64>) -> bool {
    const LIMIT: f64 = 1.0e5;
    p.x.is_finite() && p.y.is_finite() && p.x.abs() < LIMIT && p.y.abs() < LIMIT
}

impl Surface for RasterSurface {
    fn push_transform(&mut self, transform: &Matrix3<f64>) {
        let composed = self.current() * transform;
        self.transforms.push(composed);
    }

    fn pop_transform(&mut self) {
        if self.transforms.pop().is_none() {
            tracing::warn!("pop_transform called with an empty transform stack");
        }
    }

    fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    fn line(&mut self, from: Point2<f64>, to: Point2<f64>) {
        if let (Some(a), Some(b)) = (self.map(from), self.map(to)) {
            self.raster_line(a, b);
        }
    }

    fn polygon(&mut self, points: &[Point2<f64>], filled: bool) {
        if points.is_empty() {
            return;
        }
        let mapped: Option<Vec<Point2<f64>>> = points.iter().map(|p| self.map(*p)).collect();
        let Some(mapped) = mapped else {
            return;
        };
        if filled {
            self.raster_fill(&mapped);
        } else {
            self.raster_outline(&mapped);
        }
    }

    fn circle(&mut self, center: Point2<f64>, radius: f64, filled: bool) {
        if self.transforms.is_empty() {
            if !within_raster_range(center) || !(0.0..1.0e5).contains(&radius) {
                return;
            }
            let c = (center.x.round() as i32, center.y.round() as i32);
            let r = radius.round() as i32;
            if filled {
                draw_filled_circle_mut(&mut self.canvas, c, r, self.color);
            } else {
                draw_hollow_circle_mut(&mut self.canvas, c, r, self.color);
            }
            return;
        }
        // Under a transform the outline is mapped vertex by vertex.
        let points: Vec<Point2<f64>> = (0..CIRCLE_SEGMENTS)
            .map(|i| {
                let angle = i as f64 / CIRCLE_SEGMENTS as f64 * std::f64::consts::TAU;
                Point2::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
            })
            .collect();
        self.polygon(&points, filled);
    }

    fn image(&mut self, image: &RgbaImage, at: Point2<f64>) {
        let Some(origin) = self.map(at) else {
            return;
        };
        if !within_raster_range(origin) {
            return;
        }
        let (x, y) = (origin.x.round() as i64, origin.y.round() as i64);
        imageops::overlay(&mut self.canvas.0, image, x, y);
    }

    fn text(&mut self, text: &str, at: Point2<f64>) {
        let at = self.map(at).unwrap_or(at);
        self.captions.push(Caption {
            text: text.to_string(),
            at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_rect_covers_its_pixels_only() {
        let mut surface = RasterSurface::new(20, 20);
        surface.clear(BLACK);
        surface.set_color(WHITE);
        surface.rect(&Rect::new(5.0, 5.0, 10.0, 10.0), true);
        assert_eq!(*surface.canvas().get_pixel(10, 10), WHITE);
        assert_eq!(*surface.canvas().get_pixel(5, 5), WHITE);
        assert_eq!(*surface.canvas().get_pixel(14, 14), WHITE);
        assert_eq!(*surface.canvas().get_pixel(17, 17), BLACK);
        assert_eq!(*surface.canvas().get_pixel(2, 2), BLACK);
    }

    #[test]
    fn transform_applies_until_popped() {
        let mut surface = RasterSurface::new(40, 40);
        surface.clear(BLACK);
        surface.set_color(RED);
        let shift = Matrix3::new(1.0, 0.0, 20.0, 0.0, 1.0, 20.0, 0.0, 0.0, 1.0);
        surface.push_transform(&shift);
        surface.rect(&Rect::new(0.0, 0.0, 4.0, 4.0), true);
        surface.pop_transform();
        surface.rect(&Rect::new(0.0, 0.0, 4.0, 4.0), true);
        assert_eq!(*surface.canvas().get_pixel(21, 21), RED);
        assert_eq!(*surface.canvas().get_pixel(1, 1), RED);
        assert_eq!(*surface.canvas().get_pixel(10, 10), BLACK);
        assert_eq!(surface.transform_depth(), 0);
    }

    #[test]
    fn line_reaches_both_endpoints() {
        let mut surface = RasterSurface::new(10, 10);
        surface.clear(BLACK);
        surface.set_color(YELLOW);
        surface.line(Point2::new(1.0, 1.0), Point2::new(8.0, 6.0));
        assert_eq!(*surface.canvas().get_pixel(1, 1), YELLOW);
        assert_eq!(*surface.canvas().get_pixel(8, 6), YELLOW);
    }

    #[test]
    fn half_alpha_blends_halfway() {
        let mut surface = RasterSurface::new(10, 10);
        surface.clear(BLACK);
        surface.set_color(Rgba([255, 255, 255, 127]));
        surface.rect(&Rect::new(2.0, 2.0, 5.0, 5.0), true);
        let out = surface.canvas().get_pixel(4, 4);
        assert!((126..=128).contains(&out.0[0]));
        assert_eq!(out.0[3], 255);
    }

    #[test]
    fn untransformed_circle_is_centred() {
        let mut surface = RasterSurface::new(20, 20);
        surface.clear(BLACK);
        surface.set_color(MAGENTA);
        surface.circle(Point2::new(10.0, 10.0), 3.0, true);
        assert_eq!(*surface.canvas().get_pixel(10, 10), MAGENTA);
        assert_eq!(*surface.canvas().get_pixel(10, 13), MAGENTA);
        assert_eq!(*surface.canvas().get_pixel(10, 15), BLACK);
    }

    #[test]
    fn image_blit_lands_at_the_mapped_origin() {
        let mut surface = RasterSurface::new(20, 20);
        surface.clear(BLACK);
        let patch = RgbaImage::from_pixel(3, 3, RED);
        let shift = Matrix3::new(1.0, 0.0, 5.0, 0.0, 1.0, 4.0, 0.0, 0.0, 1.0);
        surface.push_transform(&shift);
        surface.image(&patch, Point2::new(1.0, 1.0));
        surface.pop_transform();
        assert_eq!(*surface.canvas().get_pixel(6, 5), RED);
        assert_eq!(*surface.canvas().get_pixel(8, 7), RED);
        assert_eq!(*surface.canvas().get_pixel(9, 8), BLACK);
    }

    #[test]
    fn sub_pixel_circles_still_mark_their_centre() {
        let mut surface = RasterSurface::new(10, 10);
        surface.clear(BLACK);
        surface.set_color(WHITE);
        surface.circle(Point2::new(5.0, 5.0), 0.2, true);
        let scale = Matrix3::new(0.01, 0.0, 5.0, 0.0, 0.01, 5.0, 0.0, 0.0, 1.0);
        surface.push_transform(&scale);
        surface.circle(Point2::new(0.0, 0.0), 2.0, true);
        surface.pop_transform();
        assert_eq!(*surface.canvas().get_pixel(5, 5), WHITE);
    }

    #[test]
    fn text_is_recorded_as_caption() {
        let mut surface = RasterSurface::new(10, 10);
        surface.text("hello", Point2::new(2.0, 3.0));
        assert_eq!(surface.captions().len(), 1);
        assert_eq!(surface.captions()[0].text, "hello");
    }
}
