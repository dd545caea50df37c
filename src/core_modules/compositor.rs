// THEORY:
// The `compositor` fixes the order in which layers reach the screen. It owns no
// simulation state, only the overlay toggles and the offscreen buffer the
// camera layer is assembled in.
//
// Order per frame:
// 1.  The table scene, drawn through the warp matrix.
// 2.  The camera overlay (if enabled): camera image plus translucent motion
//     field, assembled offscreen and blitted at the screen origin.
// 3.  The warp editing UI, in plain screen space so it is never distorted.
// 4.  The help text (if enabled).

use crate::core_modules::frame::ColorFrame;
use crate::core_modules::motion_field::MotionField;
use crate::core_modules::surface::{Color, MAGENTA, RED, RasterSurface, Surface, WHITE, YELLOW};
use crate::core_modules::table::Table;
use crate::core_modules::warp::WarpCalibration;
use image::{Rgba, imageops};
use nalgebra::Point2;

/// Motion field colour over the camera image: white at roughly half opacity.
pub const FIELD_COLOR: Color = Rgba([255, 255, 255, 127]);
const TRANSPARENT: Color = Rgba([0, 0, 0, 0]);

pub const HELP_LINES: [&str; 4] = [
    "to warp the image, drag the corners of the image.",
    "press 's' to toggle quad warp UI. this will also disable quad warp interaction.",
    "press 1, 2, 3, 4 to snap that point to the mouse",
    "when a corner is selected (red), use keyboard arrow keys to nudge the corner position.",
];
const HELP_X: f64 = 20.0;
const HELP_Y: f64 = 30.0;
const HELP_LINE_SPACING: f64 = 20.0;

/// Everything a frame needs to be drawn.
pub struct Scene<'a> {
    pub table: &'a Table,
    pub warp: &'a WarpCalibration,
    pub motion: &'a MotionField,
    pub camera_frame: Option<&'a ColorFrame>,
}

#[derive(Default)]
pub struct Compositor {
    show_camera: bool,
    show_help: bool,
    offscreen: Option<RasterSurface>,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_camera(&mut self) {
        self.show_camera = !self.show_camera;
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn is_showing_camera(&self) -> bool {
        self.show_camera
    }

    pub fn is_showing_help(&self) -> bool {
        self.show_help
    }

    pub fn draw(&mut self, surface: &mut dyn Surface, scene: &Scene<'_>) {
        surface.set_color(WHITE);
        scene.table.draw(surface, &scene.warp.matrix());

        if self.show_camera {
            self.draw_camera_overlay(surface, scene);
        }

        surface.set_color(MAGENTA);
        scene.warp.draw_quad_outline(surface);
        surface.set_color(YELLOW);
        scene.warp.draw_corners(surface);
        surface.set_color(MAGENTA);
        scene.warp.draw_highlighted_corner(surface);
        surface.set_color(RED);
        scene.warp.draw_selected_corner(surface);

        if self.show_help {
            surface.set_color(WHITE);
            for (i, line) in HELP_LINES.iter().enumerate() {
                let at = Point2::new(HELP_X, HELP_Y + i as f64 * HELP_LINE_SPACING);
                surface.text(line, at);
            }
        }
    }

    fn draw_camera_overlay(&mut self, surface: &mut dyn Surface, scene: &Scene<'_>) {
        let config = scene.motion.config();
        let (frame_w, frame_h) = scene.camera_frame.map_or((0, 0), |f| (f.width(), f.height()));
        let width = frame_w.max(config.draw_width.ceil() as u32).max(1);
        let height = frame_h.max(config.draw_height.ceil() as u32).max(1);

        if self
            .offscreen
            .as_ref()
            .is_none_or(|buffer| buffer.width() != width || buffer.height() != height)
        {
            self.offscreen = Some(RasterSurface::new(width, height));
        }
        let Some(offscreen) = self.offscreen.as_mut() else {
            return;
        };
        offscreen.clear(TRANSPARENT);
        if let Some(image) = scene.camera_frame.and_then(ColorFrame::to_rgba_image) {
            imageops::replace(offscreen.canvas_mut(), &image, 0, 0);
        }
        offscreen.set_color(FIELD_COLOR);
        scene.motion.render(offscreen);

        surface.image(offscreen.canvas(), Point2::origin());
    }
}
