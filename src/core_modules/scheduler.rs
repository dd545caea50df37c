// THEORY:
// Rendering runs on every frame callback; simulation and image processing run
// on every Nth one. `FixedStepScheduler` owns that throttle explicitly instead of
// reading a global frame counter, so it can be reasoned about and tested alone.
// The accumulator starts one short of the interval so the very first frame ticks.

#[derive(Debug, Clone)]
pub struct FixedStepScheduler {
    interval: u32,
    accumulator: u32,
}

impl FixedStepScheduler {
    /// An interval of zero is treated as one (tick every frame).
    pub fn new(interval: u32) -> Self {
        let interval = interval.max(1);
        Self {
            interval,
            accumulator: interval - 1,
        }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Counts one frame; `true` when this frame should run a simulation step.
    pub fn on_frame(&mut self) -> bool {
        self.accumulator += 1;
        if self.accumulator >= self.interval {
            self.accumulator = 0;
            true
        } else {
            false
        }
    }

    /// Simulated seconds covered by one tick at `frames_per_second`.
    pub fn step_seconds(&self, frames_per_second: f64) -> f64 {
        self.interval as f64 / frames_per_second
    }
}
