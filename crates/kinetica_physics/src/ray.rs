//! Ray queries
//!
//! A [`QueryRay`] travels from the owning thread to the simulation thread and
//! is answered there: every hit is collected first, then the callback runs
//! exactly once with the full list.

use std::fmt;

use glam::Vec3;

use crate::volume::ObjectId;

/// A finite ray with a normalized direction
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Start point
    pub origin: Vec3,
    /// Unit direction (zero for a degenerate ray)
    pub direction: Vec3,
    /// Maximum travel distance along `direction`
    pub max_distance: f32,
}

impl Ray {
    /// Create a ray; the direction is normalized
    pub fn new(origin: Vec3, direction: Vec3, max_distance: f32) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            max_distance: max_distance.max(0.0),
        }
    }

    /// Create a ray spanning the segment `from -> to`
    pub fn between(from: Vec3, to: Vec3) -> Self {
        Self::new(from, to - from, (to - from).length())
    }

    /// Point at `distance` along the ray
    #[inline]
    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }

    /// End point of the ray segment
    #[inline]
    pub fn end(&self) -> Vec3 {
        self.at(self.max_distance)
    }

    /// Whether a ray with zero direction was constructed
    pub fn is_degenerate(&self) -> bool {
        self.direction == Vec3::ZERO
    }

    /// Accept a hit distance if it lies on the ray segment
    #[inline]
    pub(crate) fn accepts(&self, distance: f32) -> bool {
        distance >= 0.0 && distance <= self.max_distance
    }
}

/// First hit of a ray against a single shape
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// Distance from the ray origin
    pub distance: f32,
    /// Hit point in world space
    pub point: Vec3,
    /// Outward surface normal at the hit point
    pub normal: Vec3,
}

/// A hit reported by a world ray cast
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaycastInfo {
    /// Distance from the ray origin
    pub distance: f32,
    /// Outward surface normal at the hit point
    pub normal: Vec3,
    /// Hit point in world space
    pub point: Vec3,
    /// Owner of the volume that was hit
    pub volume: ObjectId,
}

/// Callback receiving every hit of one cast, nearest first
pub type RaycastCallback = Box<dyn FnOnce(&[RaycastInfo]) + Send + 'static>;

/// A ray plus the callback that receives its results
pub struct QueryRay {
    /// The ray to cast
    pub ray: Ray,
    callback: RaycastCallback,
}

impl QueryRay {
    /// Create a query; `callback` runs on the simulation thread and must not block
    pub fn new<F>(ray: Ray, callback: F) -> Self
    where
        F: FnOnce(&[RaycastInfo]) + Send + 'static,
    {
        Self {
            ray,
            callback: Box::new(callback),
        }
    }

    /// Deliver the results, consuming the query
    pub fn respond(self, hits: &[RaycastInfo]) {
        (self.callback)(hits);
    }
}

impl fmt::Debug for QueryRay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRay").field("ray", &self.ray).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_ray_direction_normalized() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 3.0, 4.0), 10.0);
        assert!((ray.direction.length() - 1.0).abs() < 1e-6);
        assert_eq!(ray.at(5.0), Vec3::new(0.0, 3.0, 4.0));
    }

    #[test]
    fn test_ray_between() {
        let ray = Ray::between(Vec3::ZERO, Vec3::new(0.0, -8.0, 0.0));
        assert_eq!(ray.direction, Vec3::NEG_Y);
        assert_eq!(ray.max_distance, 8.0);
        assert_eq!(ray.end(), Vec3::new(0.0, -8.0, 0.0));
    }

    #[test]
    fn test_degenerate_ray() {
        let ray = Ray::new(Vec3::ONE, Vec3::ZERO, 1.0);
        assert!(ray.is_degenerate());
    }

    #[test]
    fn test_query_responds_once_with_hits() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let query = QueryRay::new(Ray::new(Vec3::ZERO, Vec3::X, 1.0), move |hits| {
            sink.lock().unwrap().extend_from_slice(hits);
        });
        let hit = RaycastInfo {
            distance: 0.5,
            normal: Vec3::NEG_X,
            point: Vec3::new(0.5, 0.0, 0.0),
            volume: ObjectId(7),
        };
        query.respond(&[hit]);
        assert_eq!(seen.lock().unwrap().as_slice(), &[hit]);
    }
}
