//! Force fields attached to volumes
//!
//! A field acts on every rigid body whose shape overlaps the field volume.
//! Forces are accumulated before integration and cleared by it.

use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ForceField {
    /// Same force everywhere inside the volume (wind, conveyors, lifts)
    Directional { force: Vec3 },
    /// Push away from the field center; negative strength attracts
    ///
    /// Magnitude is `strength / (1 + falloff * d^2)` at distance `d`.
    Radial { strength: f32, falloff: f32 },
}

impl ForceField {
    pub fn directional(force: Vec3) -> Self {
        ForceField::Directional { force }
    }

    pub fn radial(strength: f32, falloff: f32) -> Self {
        ForceField::Radial {
            strength,
            falloff: falloff.max(0.0),
        }
    }

    /// Force on a body at `point` from a field centered at `center`
    pub fn force_at(&self, center: Vec3, point: Vec3) -> Vec3 {
        match *self {
            ForceField::Directional { force } => force,
            ForceField::Radial { strength, falloff } => {
                let offset = point - center;
                let distance = offset.length();
                if distance <= 1e-6 {
                    return Vec3::ZERO;
                }
                offset / distance * (strength / (1.0 + falloff * distance * distance))
            }
        }
    }
}
