//! Interpolation stamps for rendering between simulation ticks
//!
//! The simulation pushes a [`Stamp`] whenever a body's pose changes. The
//! render side samples the queue through a [`PoseInterpolator`], advancing
//! by its own frame delta, so visuals stay smooth when the two loops run at
//! different rates.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::pose::Pose;

/// Queue length at which pending stamps are dropped
pub const MAX_STAMPS: usize = 8;

/// A committed pose and the simulation time since the previous stamp
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stamp {
    pub dt: f32,
    pub pose: Pose,
}

#[derive(Debug, Default)]
pub struct StampQueue {
    stamps: VecDeque<Stamp>,
    /// Progress between the first two stamps, in `[0, 1)`
    fraction: f32,
    /// Latest pose committed by the simulation
    committed: Pose,
}

impl StampQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stamp
    ///
    /// When the render side has fallen behind by [`MAX_STAMPS`] the backlog is
    /// dropped and only the newest stamp is kept.
    pub fn push(&mut self, stamp: Stamp) {
        self.committed = stamp.pose;
        if self.stamps.len() >= MAX_STAMPS {
            log::trace!("dropping {} stale interpolation stamps", self.stamps.len());
            self.stamps.clear();
            self.fraction = 0.0;
        }
        self.stamps.push_back(stamp);
    }

    /// Drop all pending stamps and jump to `pose`
    pub fn snap(&mut self, pose: Pose) {
        self.stamps.clear();
        self.fraction = 0.0;
        self.committed = pose;
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn committed(&self) -> Pose {
        self.committed
    }

    /// Advance by `render_dt` seconds and return the pose to display
    pub fn sample(&mut self, render_dt: f32) -> Pose {
        let mut remaining = render_dt.max(0.0);
        loop {
            if self.stamps.len() < 2 {
                self.fraction = 0.0;
                return self.stamps.back().map_or(self.committed, |stamp| stamp.pose);
            }

            let span = self.stamps[1].dt;
            if span <= f32::EPSILON {
                self.stamps.pop_front();
                continue;
            }

            let next = self.fraction + remaining / span;
            if next < 1.0 {
                self.fraction = next;
                break;
            }
            remaining = (next - 1.0) * span;
            self.fraction = 0.0;
            self.stamps.pop_front();
        }

        self.stamps[0].pose.interpolate(&self.stamps[1].pose, self.fraction)
    }
}

/// Shared handle to a body's stamp queue
///
/// Cloned out of the world and handed to whatever draws the body.
#[derive(Clone, Debug, Default)]
pub struct PoseInterpolator {
    queue: Arc<Mutex<StampQueue>>,
}

impl PoseInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StampQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the interpolated pose for this render frame into `visual`
    pub fn update_transform(&self, render_dt: f32, visual: &mut Pose) {
        *visual = self.lock().sample(render_dt);
    }

    pub fn push(&self, stamp: Stamp) {
        self.lock().push(stamp);
    }

    pub fn snap(&self, pose: Pose) {
        self.lock().snap(pose);
    }

    /// Latest pose committed by the simulation
    pub fn committed(&self) -> Pose {
        self.lock().committed()
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }
}
