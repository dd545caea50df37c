pub mod calibration_file;
pub mod camera;
pub mod command;
pub mod compositor;
pub mod frame;
pub mod homography;
pub mod motion_field;
pub mod pixel;
pub mod scheduler;
pub mod surface;
pub mod table;
pub mod utils;
pub mod warp;
