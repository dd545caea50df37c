// THEORY:
// The `warp` module owns the projection calibration: four draggable screen-space
// corners and the homography that carries the logical table rectangle onto them.
//
// Key principles:
// 1) The corner set is always valid. Every mutation is staged on a copy of the
//    four corners and only committed if the resulting quad is strictly convex and
//    positively oriented. A rejected drag simply leaves the corner where it was,
//    so the cached matrix can never become NaN or singular.
// 2) The matrix is computed lazily and cached. Any committed corner or source
//    change clears the cache; `matrix()` rebuilds it on the next read. Reads
//    happen from `&self` draw paths, hence the `Cell`.
// 3) Highlight and selection are corner identities, not references. They stay
//    meaningful no matter how the corner array is mutated.
// 4) Interaction is gated by the same flag as the editing UI. A hidden warp
//    ignores the pointer and the keyboard.

use crate::core_modules::calibration_file::{self, CalibrationError, CalibrationRecord};
use crate::core_modules::homography::{self, HomographyError};
use crate::core_modules::surface::{Rect, Surface};
use nalgebra::{Matrix3, Matrix4, Point2, Vector2};
use std::cell::Cell;
use std::path::Path;
use thiserror::Error;

/// Pointer distance (screen pixels) within which a corner counts as hit.
pub const HIT_RADIUS: f64 = 10.0;
const CORNER_MARKER_RADIUS: f64 = 5.0;

/// Stable identity of one warp corner, numbered in ring order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CornerId {
    TopLeft = 0,
    TopRight = 1,
    BottomRight = 2,
    BottomLeft = 3,
}

impl CornerId {
    pub const ALL: [CornerId; 4] = [
        CornerId::TopLeft,
        CornerId::TopRight,
        CornerId::BottomRight,
        CornerId::BottomLeft,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Error)]
pub enum WarpError {
    #[error("corner update rejected: {0}")]
    Rejected(#[from] HomographyError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

#[derive(Debug)]
pub struct WarpCalibration {
    source: Rect,
    corners: [Point2<f64>; 4],
    cached: Cell<Option<Matrix3<f64>>>,
    last_valid: Cell<Matrix3<f64>>,
    highlighted: Option<CornerId>,
    selected: Option<CornerId>,
    dragging: bool,
    pointer: Option<Point2<f64>>,
    show: bool,
}

impl WarpCalibration {
    /// A warp whose destination quad coincides with `source`.
    pub fn new(source: Rect) -> Self {
        Self {
            source,
            corners: source.corners(),
            cached: Cell::new(None),
            last_valid: Cell::new(Matrix3::identity()),
            highlighted: None,
            selected: None,
            dragging: false,
            pointer: None,
            show: true,
        }
    }

    /// Logical space everything drawn through the warp is expressed in.
    pub fn set_source_rect(&mut self, source: Rect) -> Result<(), WarpError> {
        homography::validate_quad(&source.corners())?;
        self.source = source;
        self.invalidate();
        Ok(())
    }

    pub fn source_rect(&self) -> Rect {
        self.source
    }

    /// Places the source rectangle, unscaled, in the middle of a screen.
    pub fn centre_on(&mut self, screen_width: f64, screen_height: f64) -> Result<(), WarpError> {
        let x = (screen_width - self.source.width) * 0.5;
        let y = (screen_height - self.source.height) * 0.5;
        self.set_corners(Rect::new(x, y, self.source.width, self.source.height).corners())
    }

    pub fn set_corner_position(
        &mut self,
        which: CornerId,
        point: Point2<f64>,
    ) -> Result<(), WarpError> {
        let mut candidate = self.corners;
        candidate[which.index()] = point;
        self.set_corners(candidate)
    }

    pub fn set_top_left_corner_position(&mut self, point: Point2<f64>) -> Result<(), WarpError> {
        self.set_corner_position(CornerId::TopLeft, point)
    }

    pub fn set_top_right_corner_position(&mut self, point: Point2<f64>) -> Result<(), WarpError> {
        self.set_corner_position(CornerId::TopRight, point)
    }

    pub fn set_bottom_right_corner_position(
        &mut self,
        point: Point2<f64>,
    ) -> Result<(), WarpError> {
        self.set_corner_position(CornerId::BottomRight, point)
    }

    pub fn set_bottom_left_corner_position(&mut self, point: Point2<f64>) -> Result<(), WarpError> {
        self.set_corner_position(CornerId::BottomLeft, point)
    }

    /// Replaces all four corners at once, or none of them.
    pub fn set_corners(&mut self, corners: [Point2<f64>; 4]) -> Result<(), WarpError> {
        homography::validate_quad(&corners)?;
        self.corners = corners;
        self.invalidate();
        Ok(())
    }

    pub fn corner(&self, which: CornerId) -> Point2<f64> {
        self.corners[which.index()]
    }

    /// Corners in ring order.
    pub fn corners(&self) -> [Point2<f64>; 4] {
        self.corners
    }

    /// Forward transform, source rectangle to screen quad.
    pub fn matrix(&self) -> Matrix3<f64> {
        if let Some(m) = self.cached.get() {
            return m;
        }
        match homography::quad_to_quad(&self.source.corners(), &self.corners) {
            Ok(m) => {
                self.cached.set(Some(m));
                self.last_valid.set(m);
                m
            }
            Err(err) => {
                tracing::warn!(%err, "homography solve failed, keeping last valid matrix");
                self.last_valid.get()
            }
        }
    }

    pub fn gl_matrix(&self) -> Matrix4<f64> {
        homography::to_gl_matrix(&self.matrix())
    }

    fn invalidate(&mut self) {
        self.cached.set(None);
    }

    pub fn toggle_show(&mut self) {
        self.show = !self.show;
        if !self.show {
            self.dragging = false;
        }
    }

    pub fn is_showing(&self) -> bool {
        self.show
    }

    pub fn highlighted(&self) -> Option<CornerId> {
        self.highlighted
    }

    pub fn selected(&self) -> Option<CornerId> {
        self.selected
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    fn corner_near(&self, p: Point2<f64>) -> Option<CornerId> {
        CornerId::ALL
            .into_iter()
            .map(|id| (id, nalgebra::distance(&self.corner(id), &p)))
            .filter(|(_, d)| *d <= HIT_RADIUS)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    pub fn pointer_moved(&mut self, p: Point2<f64>) {
        self.pointer = Some(p);
        if !self.show {
            return;
        }
        self.highlighted = self.corner_near(p);
    }

    /// Selects the corner under the pointer and starts a drag. Pressing away from
    /// every corner clears the selection.
    pub fn pointer_pressed(&mut self, p: Point2<f64>) {
        self.pointer = Some(p);
        if !self.show {
            return;
        }
        self.selected = self.corner_near(p);
        self.dragging = self.selected.is_some();
    }

    pub fn pointer_dragged(&mut self, p: Point2<f64>) {
        self.pointer = Some(p);
        if !self.show || !self.dragging {
            return;
        }
        if let Some(which) = self.selected {
            if let Err(err) = self.set_corner_position(which, p) {
                tracing::debug!(?which, %err, "drag would fold the quad, corner held");
            }
        }
    }

    /// Ends the drag. The selection survives for keyboard nudging.
    pub fn pointer_released(&mut self, p: Point2<f64>) {
        self.pointer = Some(p);
        self.dragging = false;
    }

    /// Moves a corner to the last known pointer position and selects it.
    pub fn snap_corner(&mut self, which: CornerId) -> Result<(), WarpError> {
        if !self.show {
            return Ok(());
        }
        let Some(p) = self.pointer else {
            return Ok(());
        };
        self.set_corner_position(which, p)?;
        self.selected = Some(which);
        Ok(())
    }

    pub fn nudge_selected(&mut self, delta: Vector2<f64>) -> Result<(), WarpError> {
        if !self.show {
            return Ok(());
        }
        let Some(which) = self.selected else {
            return Ok(());
        };
        self.set_corner_position(which, self.corner(which) + delta)
    }

    pub fn draw_quad_outline(&self, surface: &mut dyn Surface) {
        if !self.show {
            return;
        }
        surface.polygon(&self.corners, false);
    }

    pub fn draw_corners(&self, surface: &mut dyn Surface) {
        if !self.show {
            return;
        }
        for p in self.corners {
            surface.circle(p, CORNER_MARKER_RADIUS, false);
        }
    }

    pub fn draw_highlighted_corner(&self, surface: &mut dyn Surface) {
        if !self.show {
            return;
        }
        if let Some(which) = self.highlighted {
            surface.circle(self.corner(which), HIT_RADIUS, false);
        }
    }

    pub fn draw_selected_corner(&self, surface: &mut dyn Surface) {
        if !self.show {
            return;
        }
        if let Some(which) = self.selected {
            surface.circle(self.corner(which), CORNER_MARKER_RADIUS, true);
        }
    }

    pub fn to_record(&self) -> CalibrationRecord {
        CalibrationRecord {
            top_left: self.corner(CornerId::TopLeft).into(),
            top_right: self.corner(CornerId::TopRight).into(),
            bottom_left: self.corner(CornerId::BottomLeft).into(),
            bottom_right: self.corner(CornerId::BottomRight).into(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), WarpError> {
        calibration_file::save(path, &self.to_record())?;
        tracing::info!(?path, "calibration saved");
        Ok(())
    }

    /// Replaces all four corners from disk. On any failure the current corners stay.
    pub fn load(&mut self, path: &Path) -> Result<(), WarpError> {
        let record = calibration_file::load(path)?;
        self.set_corners([
            record.top_left.into(),
            record.top_right.into(),
            record.bottom_right.into(),
            record.bottom_left.into(),
        ])?;
        tracing::info!(?path, "calibration loaded");
        Ok(())
    }
}
