//! Frame clock for the simulation thread

use std::thread;
use std::time::{Duration, Instant};

/// Measures tick deltas and throttles to a target rate
#[derive(Debug)]
pub struct FrameClock {
    last_frame: Instant,
    /// `None` runs unthrottled
    interval: Option<Duration>,
    max_delta: f32,
}

impl FrameClock {
    pub fn new(tick_rate: u32, max_delta: f32) -> Self {
        Self {
            last_frame: Instant::now(),
            interval: (tick_rate > 0).then(|| Duration::from_nanos(1_000_000_000 / u64::from(tick_rate))),
            max_delta: max_delta.max(0.0),
        }
    }

    /// Target time between ticks
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Wait for the next tick and return its delta in seconds
    ///
    /// Deltas are capped at `max_delta` so a stalled thread does not produce
    /// one huge step.
    pub fn tick(&mut self) -> f32 {
        match self.interval {
            Some(interval) => {
                let elapsed = self.last_frame.elapsed();
                if elapsed < interval {
                    thread::sleep(interval - elapsed);
                }
            }
            None => thread::yield_now(),
        }

        let now = Instant::now();
        let raw_dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        raw_dt.min(self.max_delta)
    }
}
