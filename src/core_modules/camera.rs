// THEORY:
// Capture runs on its own cadence; the simulation loop must never wait for it.
// The handoff between the two is a single-slot "latest frame" channel: the
// capture side overwrites the slot with each new frame, and the loop polls once
// per frame callback. `tokio::sync::watch` is exactly that slot. Its
// `has_changed` flag is the "new frame ready" signal, and the frame itself is an
// `Arc`, so taking it is a pointer copy and the loop holds an immutable snapshot
// for as long as it likes.
//
// Device selection happens once at startup. The policy is to take the last
// enumerated device (external cameras usually enumerate after built-in ones),
// and an empty device list is fatal.

use crate::core_modules::frame::{ColorFrame, FrameError, PixelFormat};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("no camera devices found")]
    NoDevices,
    #[error("camera produced an invalid frame: {0}")]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub id: usize,
    pub name: String,
}

pub fn select_device(devices: &[CameraDevice]) -> Result<&CameraDevice, CameraError> {
    let device = devices.last().ok_or(CameraError::NoDevices)?;
    tracing::info!(
        id = device.id,
        name = %device.name,
        available = devices.len(),
        "camera device selected"
    );
    Ok(device)
}

/// Anything the frame loop can poll for a new camera frame.
pub trait FrameSource {
    /// The newest frame if one arrived since the last poll.
    fn poll_frame(&mut self) -> Option<Arc<ColorFrame>>;
}

pub fn frame_slot() -> (FramePublisher, FrameSubscriber) {
    let (sender, receiver) = watch::channel(None);
    (FramePublisher { sender }, FrameSubscriber { receiver })
}

/// Capture-side handle of the frame slot.
#[derive(Debug, Clone)]
pub struct FramePublisher {
    sender: watch::Sender<Option<Arc<ColorFrame>>>,
}

impl FramePublisher {
    pub fn publish(&self, frame: ColorFrame) {
        self.sender.send_replace(Some(Arc::new(frame)));
    }

    /// True once every subscriber is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Loop-side handle of the frame slot.
#[derive(Debug)]
pub struct FrameSubscriber {
    receiver: watch::Receiver<Option<Arc<ColorFrame>>>,
}

impl FrameSource for FrameSubscriber {
    fn poll_frame(&mut self) -> Option<Arc<ColorFrame>> {
        match self.receiver.has_changed() {
            Ok(true) => self.receiver.borrow_and_update().clone(),
            _ => None,
        }
    }
}

/// A stand-in capture device: a bright square sweeping across a dark frame.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_index: u64,
}

impl SyntheticCamera {
    pub const SQUARE_SIZE: u32 = 40;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_index: 0,
        }
    }

    pub fn devices() -> Vec<CameraDevice> {
        vec![CameraDevice {
            id: 0,
            name: "synthetic sweep".to_string(),
        }]
    }

    pub fn next_frame(&mut self) -> Result<ColorFrame, CameraError> {
        let (w, h) = (self.width, self.height);
        let size = Self::SQUARE_SIZE.min(w).min(h);
        let travel = (w - size).max(1) as u64;
        let x0 = (self.frame_index * 4 % travel) as u32;
        let y0 = (h - size) / 2;
        self.frame_index += 1;

        let mut data = vec![16u8; w as usize * h as usize * 3];
        for y in y0..y0 + size {
            let row = (y * w) as usize * 3;
            data[row + x0 as usize * 3..row + (x0 + size) as usize * 3].fill(240);
        }
        Ok(ColorFrame::new(w, h, PixelFormat::Rgb8, data)?)
    }

    /// Publishes frames at `fps` until `shutdown` flips or the loop side goes away.
    pub async fn run(
        mut self,
        publisher: FramePublisher,
        fps: f64,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps.max(1.0)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if publisher.is_closed() {
                break;
            }
            match self.next_frame() {
                Ok(frame) => publisher.publish(frame),
                Err(err) => {
                    tracing::error!(%err, "synthetic camera failed");
                    break;
                }
            }
        }
        tracing::debug!(frames = self.frame_index, "synthetic camera stopped");
    }
}

impl FrameSource for SyntheticCamera {
    fn poll_frame(&mut self) -> Option<Arc<ColorFrame>> {
        self.next_frame().ok().map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_device_wins() {
        let devices = vec![
            CameraDevice { id: 0, name: "built-in".into() },
            CameraDevice { id: 1, name: "usb".into() },
        ];
        assert_eq!(select_device(&devices).unwrap().id, 1);
    }

    #[test]
    fn empty_device_list_is_fatal() {
        assert!(matches!(select_device(&[]), Err(CameraError::NoDevices)));
    }

    #[test]
    fn slot_reports_each_frame_once() {
        let (publisher, mut subscriber) = frame_slot();
        assert!(subscriber.poll_frame().is_none());
        publisher.publish(ColorFrame::filled(4, 4, [1, 2, 3]).unwrap());
        let frame = subscriber.poll_frame().expect("new frame");
        assert_eq!(frame.width(), 4);
        assert!(subscriber.poll_frame().is_none());
    }

    #[test]
    fn slot_keeps_only_the_latest_frame() {
        let (publisher, mut subscriber) = frame_slot();
        publisher.publish(ColorFrame::filled(4, 4, [0, 0, 0]).unwrap());
        publisher.publish(ColorFrame::filled(8, 8, [0, 0, 0]).unwrap());
        assert_eq!(subscriber.poll_frame().expect("frame").width(), 8);
    }

    #[test]
    fn synthetic_frames_move() {
        let mut camera = SyntheticCamera::new(320, 240);
        let a = camera.next_frame().unwrap();
        let b = camera.next_frame().unwrap();
        assert_eq!(a.width(), 320);
        assert_ne!(a.data(), b.data());
    }

    #[tokio::test]
    async fn capture_task_feeds_the_slot() {
        let (publisher, mut subscriber) = frame_slot();
        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn(SyntheticCamera::new(64, 48).run(publisher, 200.0, shutdown));
        let mut received = None;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if let Some(frame) = subscriber.poll_frame() {
                received = Some(frame);
                break;
            }
        }
        stop.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(received.expect("frame from capture task").height(), 48);
    }
}
