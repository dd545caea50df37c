// THEORY:
// The `stage` module is the top-level API for the whole projection-mapped table.
// It wires the leaf components into one object a host can drive with a handful
// of calls, and it owns the frame-level policy none of the leaves should know
// about:
//
// - Throttling: `update` runs on every frame callback, but physics and the motion
//   pipeline only advance on the ticks the fixed-step scheduler grants.
// - Frame handoff: the frame source is polled every callback; a frame that
//   arrives between ticks is held until the next tick consumes it.
// - Input: keys go through the key map into commands; pointer events go straight
//   to the warp.
// - Calibration lifetime: loaded (fail soft) at construction, saved exactly once
//   at shutdown, or on drop if the host never called `shutdown`.

use crate::core_modules::calibration_file::DEFAULT_CALIBRATION_FILE;
use crate::core_modules::camera::FrameSource;
use crate::core_modules::command::{Command, Key, KeyMap};
use crate::core_modules::compositor::{Compositor, Scene};
use crate::core_modules::frame::ColorFrame;
use crate::core_modules::motion_field::{MotionField, MotionFieldConfig};
use crate::core_modules::scheduler::FixedStepScheduler;
use crate::core_modules::surface::Surface;
use crate::core_modules::table::Table;
use crate::core_modules::warp::{WarpCalibration, WarpError};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

// Re-export the pieces a host needs alongside the stage.
pub use crate::core_modules::table::{Phase, SwingDirection};
pub use crate::core_modules::warp::CornerId;

/// Nudge multiplier while shift is held.
const SHIFT_NUDGE: f64 = 10.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path:?} could not be read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path:?} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration for the Stage. Every field has a default, so a config file
/// only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub screen_width: f64,
    pub screen_height: f64,
    pub camera_width: u32,
    pub camera_height: u32,
    pub grid_width: u32,
    pub grid_height: u32,
    pub field_draw_width: f64,
    pub field_draw_height: f64,
    /// Difference level (0-255) at which a pixel counts as moving.
    pub threshold: u8,
    pub blur_radius: u32,
    pub decay_weight: f32,
    /// Frame callbacks per simulation tick.
    pub tick_interval: u32,
    pub target_fps: f64,
    pub calibration_path: PathBuf,
}

impl Default for StageConfig {
    fn default() -> Self {
        let motion = MotionFieldConfig::default();
        Self {
            screen_width: 1024.0,
            screen_height: 768.0,
            camera_width: 320,
            camera_height: 240,
            grid_width: motion.grid_width,
            grid_height: motion.grid_height,
            field_draw_width: motion.draw_width,
            field_draw_height: motion.draw_height,
            threshold: motion.threshold,
            blur_radius: motion.blur_radius,
            decay_weight: motion.decay_weight,
            tick_interval: 5,
            target_fps: 60.0,
            calibration_path: PathBuf::from(DEFAULT_CALIBRATION_FILE),
        }
    }
}

impl StageConfig {
    /// Reads a JSON config. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(?path, "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn motion_config(&self) -> MotionFieldConfig {
        MotionFieldConfig {
            grid_width: self.grid_width,
            grid_height: self.grid_height,
            draw_width: self.field_draw_width,
            draw_height: self.field_draw_height,
            threshold: self.threshold,
            blur_radius: self.blur_radius,
            decay_weight: self.decay_weight,
        }
    }

    /// Simulated seconds per tick.
    pub fn tick_seconds(&self) -> f64 {
        self.tick_interval.max(1) as f64 / self.target_fps.max(1.0)
    }
}

/// The main, top-level struct for the simulation.
pub struct Stage {
    config: StageConfig,
    scheduler: FixedStepScheduler,
    table: Table,
    warp: WarpCalibration,
    motion: MotionField,
    compositor: Compositor,
    keymap: KeyMap,
    camera_frame: Option<Arc<ColorFrame>>,
    frame_pending: bool,
    saved: bool,
}

impl Stage {
    pub fn new(config: StageConfig) -> Self {
        let mut warp = WarpCalibration::new(Table::source_rect());
        if let Err(err) = warp.centre_on(config.screen_width, config.screen_height) {
            tracing::warn!(%err, "could not centre the table on screen, keeping source placement");
        }
        let mut stage = Self {
            scheduler: FixedStepScheduler::new(config.tick_interval),
            table: Table::new(),
            warp,
            motion: MotionField::new(config.motion_config()),
            compositor: Compositor::new(),
            keymap: KeyMap::default(),
            camera_frame: None,
            frame_pending: false,
            saved: false,
            config,
        };
        stage.load_calibration();
        stage
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn warp(&self) -> &WarpCalibration {
        &self.warp
    }

    pub fn motion(&self) -> &MotionField {
        &self.motion
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn camera_frame(&self) -> Option<&ColorFrame> {
        self.camera_frame.as_deref()
    }

    /// One frame callback. Returns `true` when a simulation tick ran.
    pub fn update(&mut self, source: &mut dyn FrameSource) -> bool {
        if let Some(frame) = source.poll_frame() {
            self.camera_frame = Some(frame);
            self.frame_pending = true;
        }
        if !self.scheduler.on_frame() {
            return false;
        }

        self.table.update(self.config.tick_seconds());

        match (&self.camera_frame, self.frame_pending) {
            (Some(frame), true) => self.motion.update(frame),
            _ => self.motion.refresh(),
        }
        self.frame_pending = false;
        true
    }

    /// Draws the current state. Never advances the simulation.
    pub fn draw(&mut self, surface: &mut dyn Surface) {
        let scene = Scene {
            table: &self.table,
            warp: &self.warp,
            motion: &self.motion,
            camera_frame: self.camera_frame.as_deref(),
        };
        self.compositor.draw(surface, &scene);
    }

    /// Maps a key to its command and applies it. Unbound keys do nothing.
    pub fn handle_key(&mut self, key: Key, shift: bool) -> Option<Command> {
        let command = match self.keymap.lookup(key)? {
            Command::NudgeCorner { dx, dy } if shift => Command::NudgeCorner {
                dx: dx * SHIFT_NUDGE,
                dy: dy * SHIFT_NUDGE,
            },
            command => command,
        };
        self.apply(command);
        Some(command)
    }

    pub fn apply(&mut self, command: Command) {
        tracing::debug!(?command, "command");
        match command {
            Command::ToggleWarpUi => self.warp.toggle_show(),
            Command::ToggleCameraOverlay => self.compositor.toggle_camera(),
            Command::ReloadCalibration => self.load_calibration(),
            Command::SaveCalibration => {
                if let Err(err) = self.warp.save(&self.config.calibration_path) {
                    tracing::error!(%err, "calibration save failed");
                }
            }
            Command::SwingRacket(direction) => {
                if !self.table.swing_racket(direction) {
                    tracing::trace!(?direction, "swing dropped during cooldown");
                }
            }
            Command::ToggleHelp => self.compositor.toggle_help(),
            Command::ResetServe => {
                self.table.init();
                tracing::info!("serve reset");
            }
            Command::RearmBaseline => {
                self.motion.rearm_baseline();
                tracing::info!("motion baseline re-armed");
            }
            Command::SnapCorner(which) => {
                if let Err(err) = self.warp.snap_corner(which) {
                    tracing::debug!(?which, %err, "snap rejected");
                }
            }
            Command::NudgeCorner { dx, dy } => {
                if let Err(err) = self.warp.nudge_selected(Vector2::new(dx, dy)) {
                    tracing::debug!(%err, "nudge rejected");
                }
            }
        }
    }

    pub fn pointer_moved(&mut self, x: f64, y: f64) {
        self.warp.pointer_moved(Point2::new(x, y));
    }

    pub fn pointer_pressed(&mut self, x: f64, y: f64) {
        self.warp.pointer_pressed(Point2::new(x, y));
    }

    pub fn pointer_dragged(&mut self, x: f64, y: f64) {
        self.warp.pointer_dragged(Point2::new(x, y));
    }

    pub fn pointer_released(&mut self, x: f64, y: f64) {
        self.warp.pointer_released(Point2::new(x, y));
    }

    fn load_calibration(&mut self) {
        let path = &self.config.calibration_path;
        match self.warp.load(path) {
            Ok(()) => {}
            Err(WarpError::Calibration(err)) if !path.exists() => {
                tracing::info!(%err, "no saved calibration, keeping current corners");
            }
            Err(err) => tracing::warn!(%err, "calibration not loaded, keeping current corners"),
        }
    }

    /// Saves the calibration. Only the first call writes; later calls and the
    /// drop guard are no-ops.
    pub fn shutdown(&mut self) -> Result<(), WarpError> {
        if self.saved {
            return Ok(());
        }
        self.saved = true;
        self.warp.save(&self.config.calibration_path)
    }

    pub fn is_shut_down(&self) -> bool {
        self.saved
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::error!(%err, "calibration save on drop failed");
        }
    }
}
