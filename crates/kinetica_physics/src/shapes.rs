//! Convex collision shapes
//!
//! Shapes only carry their local parameters. The pose comes from the owning
//! [`Volume`](crate::Volume) or [`Placement`](crate::Placement), so every
//! query here takes it explicitly. Support points are returned as offsets
//! from the shape's position; callers add whatever reference they need.

use glam::{Quat, Vec3};

use crate::pose::Pose;
use crate::ray::{Ray, RayHit};

/// Squared length below which a direction counts as zero
pub const DIRECTION_EPSILON: f32 = 1e-12;

/// An axis-aligned box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::ZERO)
    }
}

impl Aabb {
    /// Create a box from its corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create a box centered at `center` with the given half-extents
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// Smallest box containing every point
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for p in points {
            min = min.min(p);
            max = max.max(p);
        }
        Self::new(min, max)
    }

    /// Center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half the size along each axis
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Whether the point lies inside or on the box
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Whether two boxes overlap (touching faces count)
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// The box moved by `offset`
    pub fn translated(&self, offset: Vec3) -> Self {
        Self::new(self.min + offset, self.max + offset)
    }
}

/// A sphere centered on the volume position
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub radius: f32,
}

impl Sphere {
    pub fn new(radius: f32) -> Self {
        Self { radius }
    }

    fn bounds(&self) -> Aabb {
        Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(self.radius))
    }

    fn support(&self, direction: Vec3, inset: f32) -> Vec3 {
        if direction.length_squared() <= DIRECTION_EPSILON {
            return Vec3::ZERO;
        }
        direction.normalize() * (self.radius - inset).max(0.0)
    }

    fn ray_test(&self, pose: &Pose, ray: &Ray) -> Option<RayHit> {
        let distance = ray_sphere(ray.origin, ray.direction, pose.position, self.radius)?;
        if !ray.accepts(distance) {
            return None;
        }
        let point = ray.at(distance);
        Some(RayHit {
            distance,
            point,
            normal: (point - pose.position).normalize_or_zero(),
        })
    }
}

/// A box with arbitrary rotation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedBox {
    /// Half the size along each local axis
    pub half_extents: Vec3,
}

impl OrientedBox {
    pub fn new(half_extents: Vec3) -> Self {
        Self {
            half_extents: half_extents.abs(),
        }
    }

    fn bounds(&self, rotation: Quat) -> Aabb {
        let h = self.half_extents;
        Aabb::from_points((0..8).map(|i| {
            let corner = Vec3::new(
                if i & 1 == 0 { -h.x } else { h.x },
                if i & 2 == 0 { -h.y } else { h.y },
                if i & 4 == 0 { -h.z } else { h.z },
            );
            rotation * corner
        }))
    }

    fn support(&self, rotation: Quat, direction: Vec3, inset: f32) -> Vec3 {
        let local = rotation.inverse() * direction;
        let h = (self.half_extents - Vec3::splat(inset)).max(Vec3::ZERO);
        let corner = Vec3::new(
            if local.x >= 0.0 { h.x } else { -h.x },
            if local.y >= 0.0 { h.y } else { -h.y },
            if local.z >= 0.0 { h.z } else { -h.z },
        );
        rotation * corner
    }

    fn ray_test(&self, pose: &Pose, ray: &Ray) -> Option<RayHit> {
        let origin = pose.inverse_transform_point(ray.origin);
        let direction = pose.rotation.inverse() * ray.direction;
        let h = self.half_extents;

        let mut t_min = f32::MIN;
        let mut t_max = f32::MAX;
        for axis in 0..3 {
            let (o, d, e) = (origin[axis], direction[axis], h[axis]);
            if d.abs() < 1e-8 {
                if o < -e || o > e {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (mut t1, mut t2) = ((-e - o) * inv, (e - o) * inv);
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }

        // Rays starting inside the box report nothing
        if !ray.accepts(t_min) {
            return None;
        }

        let local_point = origin + direction * t_min;
        let mut axis = 0;
        let mut best = f32::MIN;
        for i in 0..3 {
            let closeness = if h[i] > 0.0 {
                local_point[i].abs() / h[i]
            } else {
                f32::MAX
            };
            if closeness > best {
                best = closeness;
                axis = i;
            }
        }
        let mut local_normal = Vec3::ZERO;
        local_normal[axis] = if local_point[axis] >= 0.0 { 1.0 } else { -1.0 };

        Some(RayHit {
            distance: t_min,
            point: ray.at(t_min),
            normal: pose.rotation * local_normal,
        })
    }
}

/// A capsule whose segment runs along the local Y axis
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Capsule {
    pub radius: f32,
    /// Half the length of the inner segment
    pub half_length: f32,
    /// Offset of the segment center along the local Y axis
    pub skew: f32,
}

impl Capsule {
    pub fn new(radius: f32, half_length: f32) -> Self {
        Self {
            radius,
            half_length: half_length.abs(),
            skew: 0.0,
        }
    }

    /// Shift the segment along its axis
    pub fn with_skew(mut self, skew: f32) -> Self {
        self.skew = skew;
        self
    }

    /// Segment end points as offsets from the volume position
    pub fn segment(&self, rotation: Quat) -> (Vec3, Vec3) {
        (
            rotation * (Vec3::Y * (self.skew - self.half_length)),
            rotation * (Vec3::Y * (self.skew + self.half_length)),
        )
    }

    fn bounds(&self, rotation: Quat) -> Aabb {
        let (a, b) = self.segment(rotation);
        let r = Vec3::splat(self.radius);
        Aabb::new(a.min(b) - r, a.max(b) + r)
    }

    fn support(&self, rotation: Quat, direction: Vec3, inset: f32) -> Vec3 {
        let (a, b) = self.segment(rotation);
        let end = if direction.dot(b - a) >= 0.0 { b } else { a };
        if direction.length_squared() <= DIRECTION_EPSILON {
            return end;
        }
        end + direction.normalize() * (self.radius - inset).max(0.0)
    }

    fn ray_test(&self, pose: &Pose, ray: &Ray) -> Option<RayHit> {
        let (a, b) = self.segment(pose.rotation);
        let (pa, pb) = (pose.position + a, pose.position + b);
        let r2 = self.radius * self.radius;

        let (_, _, on_ray, on_axis) = closest_points_between_segments(ray.origin, ray.end(), pa, pb);
        if (on_ray - on_axis).length_squared() >= r2 {
            return None;
        }

        let (_, _, _, nearest_to_origin) = closest_points_between_segments(ray.origin, ray.origin, pa, pb);
        if (ray.origin - nearest_to_origin).length_squared() < r2 {
            return None;
        }

        let distance = ray_capsule(ray.origin, ray.direction, pa, pb, self.radius)?;
        if !ray.accepts(distance) {
            return None;
        }
        let point = ray.at(distance);
        let (_, _, _, axis_point) = closest_points_between_segments(point, point, pa, pb);
        Some(RayHit {
            distance,
            point,
            normal: (point - axis_point).normalize_or_zero(),
        })
    }
}

/// The closed set of convex shapes a volume can carry
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Sphere(Sphere),
    OrientedBox(OrientedBox),
    Capsule(Capsule),
}

impl Shape {
    /// Sphere with the given radius
    pub fn sphere(radius: f32) -> Self {
        Shape::Sphere(Sphere::new(radius))
    }

    /// Box with the given half-extents
    pub fn cuboid(half_extents: Vec3) -> Self {
        Shape::OrientedBox(OrientedBox::new(half_extents))
    }

    /// Capsule along local Y
    pub fn capsule(radius: f32, half_length: f32) -> Self {
        Shape::Capsule(Capsule::new(radius, half_length))
    }

    /// Axis-aligned extents relative to the shape position
    pub fn local_bounds(&self, rotation: Quat) -> Aabb {
        match self {
            Shape::Sphere(s) => s.bounds(),
            Shape::OrientedBox(b) => b.bounds(rotation),
            Shape::Capsule(c) => c.bounds(rotation),
        }
    }

    /// Offset from the shape position of the point extremal along `direction`,
    /// with the surface pulled in by `inset`
    pub fn support(&self, rotation: Quat, direction: Vec3, inset: f32) -> Vec3 {
        match self {
            Shape::Sphere(s) => s.support(direction, inset),
            Shape::OrientedBox(b) => b.support(rotation, direction, inset),
            Shape::Capsule(c) => c.support(rotation, direction, inset),
        }
    }

    /// First hit of `ray` against the shape placed at `pose`
    pub fn ray_test(&self, pose: &Pose, ray: &Ray) -> Option<RayHit> {
        if ray.is_degenerate() {
            return None;
        }
        match self {
            Shape::Sphere(s) => s.ray_test(pose, ray),
            Shape::OrientedBox(b) => b.ray_test(pose, ray),
            Shape::Capsule(c) => c.ray_test(pose, ray),
        }
    }

    /// Index of the shape feature facing along `normal`
    ///
    /// Boxes number their faces `2 * axis + (negative ? 1 : 0)`; capsules
    /// report 0 for the lower cap, 1 for the upper cap and 2 for the side.
    pub fn feature_index(&self, rotation: Quat, normal: Vec3) -> usize {
        let local = rotation.inverse() * normal;
        match self {
            Shape::Sphere(_) => 0,
            Shape::OrientedBox(_) => {
                let abs = local.abs();
                let axis = if abs.x >= abs.y && abs.x >= abs.z {
                    0
                } else if abs.y >= abs.z {
                    1
                } else {
                    2
                };
                axis * 2 + usize::from(local[axis] < 0.0)
            }
            Shape::Capsule(_) => {
                if local.y < -0.5 {
                    0
                } else if local.y > 0.5 {
                    1
                } else {
                    2
                }
            }
        }
    }
}

/// Near intersection distance of a ray with a sphere, if in front of the origin
fn ray_sphere(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let m = origin - center;
    let b = m.dot(direction);
    let c = m.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant <= 0.0 {
        return None;
    }
    let t = -b - discriminant.sqrt();
    (t >= 0.0).then_some(t)
}

/// Near intersection distance of a ray with the capsule `pa..pb`
fn ray_capsule(origin: Vec3, direction: Vec3, pa: Vec3, pb: Vec3, radius: f32) -> Option<f32> {
    let ba = pb - pa;
    let oa = origin - pa;
    let baba = ba.dot(ba);
    let bard = ba.dot(direction);
    let baoa = ba.dot(oa);
    let rdoa = direction.dot(oa);
    let oaoa = oa.dot(oa);

    let a = baba - bard * bard;
    let mut best: Option<f32> = None;

    if a > 1e-8 {
        let b = baba * rdoa - baoa * bard;
        let c = baba * oaoa - baoa * baoa - radius * radius * baba;
        let h = b * b - a * c;
        if h >= 0.0 {
            let t = (-b - h.sqrt()) / a;
            let y = baoa + t * bard;
            if t >= 0.0 && y > 0.0 && y < baba {
                best = Some(t);
            }
        }
    }

    for cap in [pa, pb] {
        if let Some(t) = ray_sphere(origin, direction, cap, radius) {
            best = Some(best.map_or(t, |b| b.min(t)));
        }
    }
    best
}

/// Closest points between segments `p1..q1` and `p2..q2`
///
/// Returns `(s, t, c1, c2)` where `c1 = p1 + (q1 - p1) * s` and
/// `c2 = p2 + (q2 - p2) * t`, both parameters clamped to `[0, 1]`.
pub fn closest_points_between_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (f32, f32, Vec3, Vec3) {
    const EPS: f32 = 1e-12;
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.dot(d1);
    let e = d2.dot(d2);
    let f = d2.dot(r);

    let (s, t) = if a <= EPS && e <= EPS {
        (0.0, 0.0)
    } else if a <= EPS {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= EPS {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > EPS {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    (s, t, p1 + d1 * s, p2 + d2 * t)
}
