// THEORY:
// The `motion_field` module turns a camera feed into a coarse, slowly decaying
// picture of where things have moved. It is visual feedback only; nothing in the
// simulation reads it.
//
// The pipeline per tick:
// 1.  Luma: the colour frame becomes a grayscale frame (Rec. 601).
// 2.  Baseline: on the first tick after arming, the grayscale frame is copied
//     into the baseline and the differencing stages are skipped.
// 3.  Difference: |baseline - current| per pixel.
// 4.  Threshold: differences at or above the threshold saturate, the rest vanish.
// 5.  Pool + blur: block-average into the coarse grid, then a small box blur.
// 6.  Field: every cell blends its target (intensity, negative intensity
//     gradient) into its previous value with a small weight, so the field eases
//     in and fades out instead of flickering.
//
// All buffers are allocated once for a given camera size. A frame of a
// different size is not an error: the buffers are resized and the baseline is
// re-armed.

use crate::core_modules::frame::{ColorFrame, GrayFrame};
use crate::core_modules::surface::Surface;
use nalgebra::{Point2, Vector2};

/// Tunables for the motion pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionFieldConfig {
    pub grid_width: u32,
    pub grid_height: u32,
    /// Size, in screen pixels, the field is drawn at.
    pub draw_width: f64,
    pub draw_height: f64,
    pub threshold: u8,
    pub blur_radius: u32,
    /// Weight of the new signal in each cell's running blend.
    pub decay_weight: f32,
}

impl Default for MotionFieldConfig {
    fn default() -> Self {
        Self {
            grid_width: 60,
            grid_height: 40,
            draw_width: 360.0,
            draw_height: 240.0,
            threshold: 200,
            blur_radius: 2,
            decay_weight: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionFieldCell {
    pub vector: Vector2<f32>,
    pub magnitude: f32,
}

impl Default for MotionFieldCell {
    fn default() -> Self {
        Self {
            vector: Vector2::zeros(),
            magnitude: 0.0,
        }
    }
}

/// Scales a unit-range cell vector to screen length, in grid spacings.
const VECTOR_DRAW_SCALE: f64 = 10.0;

pub struct MotionField {
    config: MotionFieldConfig,
    gray: GrayFrame,
    baseline: GrayFrame,
    diff: GrayFrame,
    coarse: GrayFrame,
    scratch: GrayFrame,
    cells: Vec<MotionFieldCell>,
    armed: bool,
    has_frame: bool,
}

impl MotionField {
    pub fn new(config: MotionFieldConfig) -> Self {
        let (gw, gh) = (config.grid_width.max(1), config.grid_height.max(1));
        Self {
            gray: GrayFrame::new(0, 0),
            baseline: GrayFrame::new(0, 0),
            diff: GrayFrame::new(0, 0),
            coarse: GrayFrame::new(gw, gh),
            scratch: GrayFrame::new(gw, gh),
            cells: vec![MotionFieldCell::default(); gw as usize * gh as usize],
            armed: true,
            has_frame: false,
            config: MotionFieldConfig {
                grid_width: gw,
                grid_height: gh,
                ..config
            },
        }
    }

    pub fn config(&self) -> &MotionFieldConfig {
        &self.config
    }

    /// Dimensions of the camera frames currently being processed.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.gray.width(), self.gray.height())
    }

    /// The next tick snapshots its frame as the new zero-motion reference.
    pub fn rearm_baseline(&mut self) {
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Runs the pipeline on a freshly delivered camera frame.
    pub fn update(&mut self, frame: &ColorFrame) {
        let (width, height) = (frame.width(), frame.height());
        if width < self.config.grid_width || height < self.config.grid_height {
            tracing::warn!(width, height, "camera frame smaller than the motion grid, skipped");
            return;
        }
        if !self.gray.same_size(width, height) {
            if self.has_frame {
                tracing::info!(
                    old_width = self.gray.width(),
                    old_height = self.gray.height(),
                    width,
                    height,
                    "camera frame size changed, re-arming baseline"
                );
            }
            self.gray.resize(width, height);
            self.baseline.resize(width, height);
            self.diff.resize(width, height);
            self.armed = true;
        }
        self.gray.fill_luma_from(frame);
        self.has_frame = true;
        self.step();
    }

    /// Runs the pipeline again on the last grayscale frame, for ticks where the
    /// camera delivered nothing new.
    pub fn refresh(&mut self) {
        if self.has_frame {
            self.step();
        }
    }

    fn step(&mut self) {
        if self.armed {
            self.baseline.copy_from(&self.gray);
            self.armed = false;
            self.coarse.clear();
            tracing::debug!("motion baseline captured");
        } else {
            self.diff.abs_diff_of(&self.baseline, &self.gray);
            self.diff.threshold(self.config.threshold);
            self.diff.downsample_into(&mut self.coarse);
            self.coarse.box_blur(self.config.blur_radius, &mut self.scratch);
        }
        self.blend_cells();
    }

    fn blend_cells(&mut self) {
        let (w, h) = (self.config.grid_width, self.config.grid_height);
        let alpha = self.config.decay_weight.clamp(0.0, 1.0);
        let sample = |x: i64, y: i64| -> f32 {
            let cx = x.clamp(0, w as i64 - 1) as u32;
            let cy = y.clamp(0, h as i64 - 1) as u32;
            self.coarse.get(cx, cy) as f32 / 255.0
        };
        for y in 0..h as i64 {
            for x in 0..w as i64 {
                let gx = (sample(x + 1, y) - sample(x - 1, y)) * 0.5;
                let gy = (sample(x, y + 1) - sample(x, y - 1)) * 0.5;
                let target_vector = Vector2::new(-gx, -gy);
                let target_magnitude = sample(x, y);

                let cell = &mut self.cells[(y * w as i64 + x) as usize];
                cell.vector = cell.vector * (1.0 - alpha) + target_vector * alpha;
                cell.magnitude = cell.magnitude * (1.0 - alpha) + target_magnitude * alpha;
            }
        }
    }

    /// Current cells, row-major, `grid_width * grid_height` long.
    pub fn field(&self) -> &[MotionFieldCell] {
        &self.cells
    }

    pub fn cell(&self, x: u32, y: u32) -> MotionFieldCell {
        self.cells[(y * self.config.grid_width + x) as usize]
    }

    pub fn total_magnitude(&self) -> f32 {
        self.cells.iter().map(|c| c.magnitude).sum()
    }

    /// Draws one line per cell from its centre along its vector, in the
    /// surface's current colour.
    pub fn render(&self, surface: &mut dyn Surface) {
        let (w, h) = (self.config.grid_width, self.config.grid_height);
        let spacing_x = self.config.draw_width / w as f64;
        let spacing_y = self.config.draw_height / h as f64;
        for y in 0..h {
            for x in 0..w {
                let cell = self.cell(x, y);
                let centre =
                    Point2::new((x as f64 + 0.5) * spacing_x, (y as f64 + 0.5) * spacing_y);
                let tip = Point2::new(
                    centre.x + cell.vector.x as f64 * spacing_x * VECTOR_DRAW_SCALE,
                    centre.y + cell.vector.y as f64 * spacing_y * VECTOR_DRAW_SCALE,
                );
                surface.line(centre, tip);
            }
        }
    }
}
