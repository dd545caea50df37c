// THEORY:
// This file is the main entry point for the `pinpong` library crate.
// It exposes the `Stage` (and its `StageConfig`) as the high-level interface: a
// host that owns a window, a camera and an input source drives the whole
// projection-mapped table in two calls per frame, `update` and `draw`, and
// forwards keys and pointer events in between.
//
// The leaf components live in `core_modules` and stay public so hosts and tests
// can use them on their own: the ball physics (`table`), the quad warp and its
// homography (`warp`, `homography`), the camera motion pipeline
// (`motion_field`, `frame`, `pixel`), the calibration file, and the drawing
// contract (`surface`).

pub mod core_modules;
pub mod stage;
