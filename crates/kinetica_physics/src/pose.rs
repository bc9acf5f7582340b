//! Rigid pose (position + rotation)
//!
//! A Pose is what the physics core knows about an object's placement. World
//! matrices coming from the transform layer are assumed to carry unit scale.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position and rotation of a volume in world space
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// World position
    pub position: Vec3,
    /// World rotation (unit quaternion)
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    /// Pose at the origin with no rotation
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Create a pose from a position and rotation
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Create an unrotated pose at the given position
    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// Derive a pose from a column-major world matrix
    ///
    /// Translation comes from the fourth column. The rotation is extracted
    /// from the upper 3x3 block with the trace-based method and normalized;
    /// a degenerate block yields the identity rotation.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let position = matrix.w_axis.truncate();

        let (x_axis, y_axis, z_axis) = (matrix.x_axis, matrix.y_axis, matrix.z_axis);
        let (m00, m10, m20) = (x_axis.x, x_axis.y, x_axis.z);
        let (m01, m11, m21) = (y_axis.x, y_axis.y, y_axis.z);
        let (m02, m12, m22) = (z_axis.x, z_axis.y, z_axis.z);

        let trace = m00 + m11 + m22;
        let (x, y, z, w) = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            ((m21 - m12) / s, (m02 - m20) / s, (m10 - m01) / s, 0.25 * s)
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
            (0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s)
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
            ((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s)
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
            ((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s)
        };

        let raw = Quat::from_xyzw(x, y, z, w);
        let rotation = if raw.is_finite() && raw.length_squared() > 1e-12 {
            raw.normalize()
        } else {
            Quat::IDENTITY
        };

        Self { position, rotation }
    }

    /// Build the world matrix for this pose
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// Transform a point from local space to world space
    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.position
    }

    /// Transform a point from world space into local space
    #[inline]
    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.position)
    }

    /// Interpolate between two poses (lerp position, slerp rotation)
    pub fn interpolate(&self, other: &Self, t: f32) -> Self {
        Self {
            position: self.position.lerp(other.position, t),
            rotation: self.rotation.slerp(other.rotation, t).normalize(),
        }
    }
}
