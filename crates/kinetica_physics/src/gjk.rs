//! GJK queries on pairs of convex placements
//!
//! Every query works on the Minkowski difference `A - B`. Support points are
//! taken relative to A's position so the arithmetic stays near the origin
//! even far from the world origin.
//!
//! The engine itself is stateless. The simplex lives in a caller-owned
//! [`Simplex`] so one scratch buffer can be reused across many queries.

use glam::Vec3;

use crate::contact::{RestingContact, SweepHit};
use crate::shapes::DIRECTION_EPSILON;
use crate::volume::Placement;

/// Relative convergence tolerance for the distance loop
pub const EPSILON_TOLERANCE: f32 = 1e-5;

/// Hard cap on GJK iterations for any query
pub const MAX_ITERATIONS: usize = 256;

/// Extra gap above the skin sum that still counts as resting contact
pub const RESTING_TOLERANCE: f32 = 0.005;

/// Squared closest-point length (relative to the largest simplex vertex)
/// below which the origin counts as touching the Minkowski difference
const TOUCH_TOLERANCE: f32 = 1e-12;

/// Initial search direction
const SEED_DIRECTION: Vec3 = Vec3::Z;

/// Scratch simplex of up to four Minkowski-difference points
#[derive(Clone, Copy, Debug, Default)]
pub struct Simplex {
    points: [Vec3; 4],
    len: usize,
}

/// Closest point of a simplex to the origin plus the vertices that support it
struct Reduction {
    /// `None` when the origin lies inside a full tetrahedron
    closest: Option<Vec3>,
    /// Bit `i` set when vertex `i` is kept
    keep: u8,
}

impl Simplex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Active vertices, oldest first
    pub fn points(&self) -> &[Vec3] {
        &self.points[..self.len]
    }

    fn push(&mut self, point: Vec3) {
        debug_assert!(self.len < 4, "simplex overflow");
        if self.len < 4 {
            self.points[self.len] = point;
            self.len += 1;
        }
    }

    fn contains(&self, point: Vec3) -> bool {
        self.points().iter().any(|p| p.distance_squared(point) <= DIRECTION_EPSILON)
    }

    fn max_length_squared(&self) -> f32 {
        self.points()
            .iter()
            .map(|p| p.length_squared())
            .fold(0.0, f32::max)
    }

    fn retain(&mut self, keep: u8) {
        let mut n = 0;
        for i in 0..self.len {
            if keep & (1 << i) != 0 {
                self.points[n] = self.points[i];
                n += 1;
            }
        }
        self.len = n;
    }

    /// Reduce to the sub-simplex nearest the origin and return the closest point
    ///
    /// Returns `None` when the origin is enclosed by the tetrahedron.
    fn solve(&mut self) -> Option<Vec3> {
        let reduction = self.reduce();
        self.retain(reduction.keep);
        reduction.closest
    }

    fn reduce(&self) -> Reduction {
        let p = &self.points;
        match self.len {
            1 => Reduction { closest: Some(p[0]), keep: 0b0001 },
            2 => {
                let (closest, keep) = closest_on_segment(p[0], p[1]);
                Reduction { closest: Some(closest), keep }
            }
            3 => {
                let (closest, keep) = closest_on_triangle(p[0], p[1], p[2]);
                Reduction { closest: Some(closest), keep }
            }
            4 => self.reduce_tetrahedron(),
            n => {
                debug_assert!(false, "simplex of size {n} cannot be reduced");
                Reduction { closest: None, keep: 0 }
            }
        }
    }

    fn reduce_tetrahedron(&self) -> Reduction {
        let [a, b, c, d] = self.points;
        let volume = (b - a).cross(c - a).dot(d - a);
        let scale = self.max_length_squared();
        // A flat tetrahedron has no inside; its hull is covered by the four
        // faces, so every face is a candidate.
        let flat = volume.abs() <= f32::EPSILON * scale * scale.sqrt();

        const FACES: [(usize, usize, usize, usize); 4] =
            [(0, 1, 2, 3), (0, 1, 3, 2), (0, 2, 3, 1), (1, 2, 3, 0)];

        let mut best: Option<(f32, Vec3, u8)> = None;
        for (i, j, k, opposite) in FACES {
            let (pi, pj, pk) = (self.points[i], self.points[j], self.points[k]);
            let normal = (pj - pi).cross(pk - pi);
            let origin_side = normal.dot(-pi);
            let opposite_side = normal.dot(self.points[opposite] - pi);
            if !flat && origin_side * opposite_side >= 0.0 {
                continue;
            }
            let (closest, local) = closest_on_triangle(pi, pj, pk);
            let mut keep = 0;
            for (bit, index) in [i, j, k].into_iter().enumerate() {
                if local & (1 << bit) != 0 {
                    keep |= 1 << index;
                }
            }
            let distance = closest.length_squared();
            if best.map_or(true, |(d, _, _)| distance < d) {
                best = Some((distance, closest, keep));
            }
        }

        match best {
            Some((_, closest, keep)) => Reduction { closest: Some(closest), keep },
            None => Reduction { closest: None, keep: 0b1111 },
        }
    }
}

/// Closest point to the origin on segment `ab`
fn closest_on_segment(a: Vec3, b: Vec3) -> (Vec3, u8) {
    let ab = b - a;
    let denom = ab.length_squared();
    if denom <= DIRECTION_EPSILON {
        return (b, 0b10);
    }
    let t = (-a).dot(ab) / denom;
    if t <= 0.0 {
        (a, 0b01)
    } else if t >= 1.0 {
        (b, 0b10)
    } else {
        (a + ab * t, 0b11)
    }
}

/// Closest point to the origin on triangle `abc` (Voronoi region walk)
fn closest_on_triangle(a: Vec3, b: Vec3, c: Vec3) -> (Vec3, u8) {
    let ab = b - a;
    let ac = c - a;
    let ap = -a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a, 0b001);
    }

    let bp = -b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (b, 0b010);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let denom = d1 - d3;
        if denom > 0.0 {
            return (a + ab * (d1 / denom), 0b011);
        }
    }

    let cp = -c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (c, 0b100);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let denom = d2 - d6;
        if denom > 0.0 {
            return (a + ac * (d2 / denom), 0b101);
        }
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let denom = (d4 - d3) + (d5 - d6);
        if denom > 0.0 {
            return (b + (c - b) * ((d4 - d3) / denom), 0b110);
        }
    }

    let sum = va + vb + vc;
    if sum.abs() <= f32::EPSILON * (ab.length_squared() * ac.length_squared()).max(f32::MIN_POSITIVE) {
        // Collinear triangle: take the best edge
        let candidates = [
            closest_on_segment(a, b),
            {
                let (p, m) = closest_on_segment(a, c);
                (p, if m == 0b10 { 0b100 } else if m == 0b01 { 0b001 } else { 0b101 })
            },
            {
                let (p, m) = closest_on_segment(b, c);
                (p, m << 1)
            },
        ];
        let mut best = candidates[0];
        for candidate in &candidates[1..] {
            if candidate.0.length_squared() < best.0.length_squared() {
                best = *candidate;
            }
        }
        return best;
    }

    let denom = 1.0 / sum;
    let v = vb * denom;
    let w = vc * denom;
    (a + ab * v + ac * w, 0b111)
}

/// Outcome of the closest-point loop
enum Closest {
    Separated(Vec3),
    Overlapping,
}

/// GJK queries between two placements
///
/// `A` is usually the moving or queried body; `B` the obstacle.
#[derive(Clone, Copy, Debug)]
pub struct GjkEngine<'a> {
    a: &'a Placement,
    b: &'a Placement,
    reference: Vec3,
}

impl<'a> GjkEngine<'a> {
    pub fn new(a: &'a Placement, b: &'a Placement) -> Self {
        Self {
            a,
            b,
            reference: a.pose.position,
        }
    }

    /// Support point of `A - B` along `direction`, relative to A's position
    ///
    /// Each shape is shrunk by its own inset.
    pub fn support(&self, direction: Vec3, inset_a: f32, inset_b: f32) -> Vec3 {
        self.a.support_point(direction, self.reference, inset_a)
            - self.b.support_point(-direction, self.reference, inset_b)
    }

    /// Whether the two shapes overlap or touch
    pub fn intersection(&self, simplex: &mut Simplex) -> bool {
        matches!(self.closest(simplex, 0.0, 0.0, true), Closest::Overlapping)
    }

    /// Closest-point vector from B to A, or `None` when the shapes overlap
    ///
    /// With `inset` set, each shape is shrunk by its skin depth first.
    pub fn distance(&self, simplex: &mut Simplex, inset: bool) -> Option<Vec3> {
        let (inset_a, inset_b) = if inset {
            (self.a.skin_depth, self.b.skin_depth)
        } else {
            (0.0, 0.0)
        };
        match self.closest(simplex, inset_a, inset_b, false) {
            Closest::Separated(v) => Some(v),
            Closest::Overlapping => None,
        }
    }

    fn closest(&self, simplex: &mut Simplex, inset_a: f32, inset_b: f32, early_out: bool) -> Closest {
        simplex.clear();
        let mut v = self.support(SEED_DIRECTION, inset_a, inset_b);
        if v.length_squared() <= TOUCH_TOLERANCE {
            return Closest::Overlapping;
        }

        for _ in 0..MAX_ITERATIONS {
            let w = self.support(-v, inset_a, inset_b);
            let vw = v.dot(w);
            if early_out && vw > 0.0 {
                return Closest::Separated(v);
            }

            let vv = v.length_squared();
            if vv - vw <= EPSILON_TOLERANCE * vv || simplex.contains(w) {
                return Closest::Separated(v);
            }

            let seeded = !simplex.is_empty();
            simplex.push(w);
            let next = match simplex.solve() {
                Some(next) => next,
                None => return Closest::Overlapping,
            };
            // |v| only shrinks once the simplex holds the seed; rounding that
            // breaks this would cycle between sub-simplices
            if seeded && next.length_squared() >= vv {
                return Closest::Separated(v);
            }
            v = next;

            if v.length_squared() <= TOUCH_TOLERANCE * simplex.max_length_squared().max(1.0) {
                return Closest::Overlapping;
            }
        }

        log::trace!("GJK distance hit the iteration cap at |v| = {}", v.length());
        Closest::Separated(v)
    }

    /// Earliest time at which A, translated by `displacement`, touches B
    ///
    /// Conservative advancement by ray casting the origin against `A - B`.
    /// Returns `None` on a miss, when A moves away from B, or when the shapes
    /// already overlap at the start of the sweep.
    pub fn moving_contact(&self, simplex: &mut Simplex, displacement: Vec3) -> Option<SweepHit> {
        let ray = -displacement;
        if ray.length_squared() <= DIRECTION_EPSILON {
            return None;
        }

        simplex.clear();
        let mut lambda = 0.0_f32;
        let mut x = Vec3::ZERO;
        let mut normal = Vec3::ZERO;
        let mut v = x - self.support(SEED_DIRECTION, 0.0, 0.0);

        for _ in 0..MAX_ITERATIONS {
            let scale = simplex.max_length_squared().max(v.length_squared()).max(1.0);
            if v.length_squared() <= TOUCH_TOLERANCE * scale {
                break;
            }

            let p = self.support(v, 0.0, 0.0);
            let w = x - p;
            let vw = v.dot(w);
            if vw > 0.0 {
                let vr = v.dot(ray);
                if vr >= 0.0 {
                    return None;
                }
                lambda -= vw / vr;
                if lambda > 1.0 {
                    return None;
                }
                x = ray * lambda;
                normal = v;
                simplex.clear();
            } else if simplex.contains(p) {
                // no further progress toward x
                break;
            }

            if !simplex.contains(p) {
                simplex.push(p);
            }

            let mut shifted = Simplex::new();
            for point in simplex.points() {
                shifted.push(x - *point);
            }
            let reduction = shifted.reduce();
            simplex.retain(reduction.keep);
            match reduction.closest {
                Some(next) => v = next,
                None => break,
            }
        }

        if normal.length_squared() <= DIRECTION_EPSILON {
            return None;
        }

        let outward = normal.normalize();
        Some(SweepHit {
            time: lambda.clamp(0.0, 1.0),
            normal: -outward,
            point: self.a.support_point(outward, Vec3::ZERO, 0.0) + displacement * lambda,
        })
    }

    /// Resting contact between nearby shapes
    ///
    /// Returns `None` when the gap exceeds the skin sum plus
    /// [`RESTING_TOLERANCE`]. Otherwise the contact's `push` moves A so that
    /// the gap equals the skin sum (zero when already at or beyond it).
    pub fn resting_contact(&self, simplex: &mut Simplex) -> Option<RestingContact> {
        let skin_sum = self.a.skin_depth + self.b.skin_depth;

        let (normal, push) = match self.distance(simplex, false) {
            Some(v) if v.length_squared() > DIRECTION_EPSILON => {
                let gap = v.length();
                if gap > skin_sum + RESTING_TOLERANCE {
                    return None;
                }
                let normal = v / gap;
                (normal, normal * (skin_sum - gap).max(0.0))
            }
            _ => self.penetration(simplex, skin_sum),
        };

        Some(RestingContact {
            normal,
            push,
            point_a: self.a.support_point(-normal, Vec3::ZERO, self.a.skin_depth) - normal * self.a.skin_depth,
            point_b: self.b.support_point(normal, Vec3::ZERO, self.b.skin_depth) + normal * self.b.skin_depth,
        })
    }

    /// Normal and push for shapes whose outer surfaces already overlap
    fn penetration(&self, simplex: &mut Simplex, skin_sum: f32) -> (Vec3, Vec3) {
        if let Some(v) = self.distance(simplex, true) {
            if v.length_squared() > DIRECTION_EPSILON {
                let inset_gap = v.length();
                let normal = v / inset_gap;
                return (normal, normal * (2.0 * skin_sum - inset_gap).max(0.0));
            }
        }

        // Inset cores overlap too: separate along the line between centers
        let normal = (self.a.pose.position - self.b.pose.position).try_normalize().unwrap_or(Vec3::Y);
        let overlap = self.b.support_point(normal, Vec3::ZERO, 0.0).dot(normal)
            - self.a.support_point(-normal, Vec3::ZERO, 0.0).dot(normal);
        log::trace!("deep penetration along {normal}, overlap {overlap}");
        (normal, normal * (overlap.max(0.0) + skin_sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Pose;
    use crate::shapes::Shape;
    use glam::Quat;

    fn placed(shape: Shape, position: Vec3, skin: f32) -> Placement {
        Placement::new(shape, Pose::from_position(position), skin)
    }

    #[test]
    fn test_separated_spheres_distance() {
        let a = placed(Shape::sphere(1.0), Vec3::ZERO, 0.0);
        let b = placed(Shape::sphere(0.5), Vec3::new(4.0, 0.0, 0.0), 0.0);
        let mut simplex = Simplex::new();
        let v = GjkEngine::new(&a, &b).distance(&mut simplex, false).unwrap();
        assert!((v.length() - 2.5).abs() < 1e-3, "distance {}", v.length());
        // B -> A points along -X
        assert!(v.x < 0.0);
    }

    #[test]
    fn test_overlapping_spheres_intersect() {
        let a = placed(Shape::sphere(1.0), Vec3::ZERO, 0.0);
        let b = placed(Shape::sphere(1.0), Vec3::new(1.5, 0.2, 0.0), 0.0);
        let mut simplex = Simplex::new();
        let engine = GjkEngine::new(&a, &b);
        assert!(engine.intersection(&mut simplex));
        assert!(engine.distance(&mut simplex, false).is_none());
    }

    #[test]
    fn test_separated_boxes_do_not_intersect() {
        let a = placed(Shape::cuboid(Vec3::ONE), Vec3::ZERO, 0.0);
        let b = placed(Shape::cuboid(Vec3::ONE), Vec3::new(0.0, 2.5, 0.0), 0.0);
        let mut simplex = Simplex::new();
        let engine = GjkEngine::new(&a, &b);
        assert!(!engine.intersection(&mut simplex));
        let v = engine.distance(&mut simplex, false).unwrap();
        assert!((v.length() - 0.5).abs() < 1e-4);
        assert!((v.normalize() - Vec3::NEG_Y).length() < 1e-3);
    }

    #[test]
    fn test_inset_distance_adds_skins() {
        let a = placed(Shape::cuboid(Vec3::ONE), Vec3::ZERO, 0.1);
        let b = placed(Shape::cuboid(Vec3::ONE), Vec3::new(0.0, 2.5, 0.0), 0.1);
        let mut simplex = Simplex::new();
        let v = GjkEngine::new(&a, &b).distance(&mut simplex, true).unwrap();
        assert!((v.length() - 0.7).abs() < 1e-4);
    }

    #[test]
    fn test_rotated_box_against_capsule() {
        let a = Placement::new(
            Shape::cuboid(Vec3::new(2.0, 0.5, 0.5)),
            Pose::new(Vec3::ZERO, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
            0.0,
        );
        // rotated box spans y in [-2, 2]
        let b = placed(Shape::capsule(0.5, 1.0), Vec3::new(0.0, 4.0, 0.0), 0.0);
        let mut simplex = Simplex::new();
        let v = GjkEngine::new(&a, &b).distance(&mut simplex, false).unwrap();
        assert!((v.length() - 0.5).abs() < 1e-3, "distance {}", v.length());
    }

    #[test]
    fn test_moving_contact_time_of_impact() {
        let a = placed(Shape::sphere(0.5), Vec3::new(0.0, 3.0, 0.0), 0.0);
        let ground = placed(Shape::cuboid(Vec3::new(10.0, 0.5, 10.0)), Vec3::ZERO, 0.0);
        let mut simplex = Simplex::new();
        let hit = GjkEngine::new(&a, &ground)
            .moving_contact(&mut simplex, Vec3::new(0.0, -4.0, 0.0))
            .unwrap();
        // gap of 2.0 over a 4.0 displacement
        assert!((hit.time - 0.5).abs() < 1e-3, "time {}", hit.time);
        assert!((hit.normal - Vec3::Y).length() < 1e-3);
        assert!((hit.point - Vec3::new(0.0, 0.5, 0.0)).length() < 1e-2);
    }

    #[test]
    fn test_moving_contact_misses_short_sweep() {
        let a = placed(Shape::sphere(0.5), Vec3::new(0.0, 3.0, 0.0), 0.0);
        let ground = placed(Shape::cuboid(Vec3::new(10.0, 0.5, 10.0)), Vec3::ZERO, 0.0);
        let mut simplex = Simplex::new();
        let engine = GjkEngine::new(&a, &ground);
        assert!(engine.moving_contact(&mut simplex, Vec3::new(0.0, -1.0, 0.0)).is_none());
        // moving away
        assert!(engine.moving_contact(&mut simplex, Vec3::new(0.0, 5.0, 0.0)).is_none());
        // passing beside
        let beside = placed(Shape::sphere(0.5), Vec3::new(20.0, 3.0, 0.0), 0.0);
        assert!(GjkEngine::new(&beside, &ground)
            .moving_contact(&mut simplex, Vec3::new(0.0, -4.0, 0.0))
            .is_none());
    }

    #[test]
    fn test_moving_contact_ignores_initial_overlap() {
        let a = placed(Shape::sphere(1.0), Vec3::ZERO, 0.0);
        let b = placed(Shape::sphere(1.0), Vec3::new(0.5, 0.0, 0.0), 0.0);
        let mut simplex = Simplex::new();
        assert!(GjkEngine::new(&a, &b)
            .moving_contact(&mut simplex, Vec3::new(1.0, 0.0, 0.0))
            .is_none());
    }

    #[test]
    fn test_resting_contact_within_skin() {
        let skin = 0.01;
        let a = placed(Shape::cuboid(Vec3::splat(0.5)), Vec3::new(0.0, 1.005, 0.0), skin);
        let ground = placed(Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)), Vec3::ZERO, skin);
        let mut simplex = Simplex::new();
        let contact = GjkEngine::new(&a, &ground).resting_contact(&mut simplex).unwrap();
        assert!((contact.normal - Vec3::Y).length() < 1e-3);
        // gap 0.005, skin sum 0.02
        assert!((contact.push.y - 0.015).abs() < 1e-4, "push {}", contact.push);
        assert!((contact.point_b.y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_resting_contact_outside_tolerance() {
        let a = placed(Shape::sphere(0.5), Vec3::new(0.0, 2.0, 0.0), 0.01);
        let ground = placed(Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)), Vec3::ZERO, 0.01);
        let mut simplex = Simplex::new();
        assert!(GjkEngine::new(&a, &ground).resting_contact(&mut simplex).is_none());
    }

    #[test]
    fn test_resting_contact_shallow_penetration() {
        let skin = 0.05;
        // sinks 0.02 into the ground
        let a = placed(Shape::cuboid(Vec3::splat(0.5)), Vec3::new(0.0, 0.98, 0.0), skin);
        let ground = placed(Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)), Vec3::ZERO, skin);
        let mut simplex = Simplex::new();
        let contact = GjkEngine::new(&a, &ground).resting_contact(&mut simplex).unwrap();
        assert!((contact.normal - Vec3::Y).length() < 1e-3);
        // restores the 0.1 skin gap from -0.02
        assert!((contact.push.y - 0.12).abs() < 1e-3, "push {}", contact.push);
    }

    #[test]
    fn test_resting_contact_deep_penetration() {
        let a = placed(Shape::sphere(0.5), Vec3::new(0.0, 0.1, 0.0), 0.01);
        let ground = placed(Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)), Vec3::ZERO, 0.01);
        let mut simplex = Simplex::new();
        let contact = GjkEngine::new(&a, &ground).resting_contact(&mut simplex).unwrap();
        assert!((contact.normal - Vec3::Y).length() < 1e-5);
        // ground top 0.5, sphere bottom -0.4, plus skin sum 0.02
        assert!((contact.push.y - 0.92).abs() < 1e-4, "push {}", contact.push);
    }

    #[test]
    fn test_simplex_reduces_segment() {
        let mut simplex = Simplex::new();
        simplex.push(Vec3::new(-1.0, 1.0, 0.0));
        simplex.push(Vec3::new(1.0, 1.0, 0.0));
        let closest = simplex.solve().unwrap();
        assert!((closest - Vec3::Y).length() < 1e-6);
        assert_eq!(simplex.len(), 2);

        simplex.clear();
        simplex.push(Vec3::new(1.0, 1.0, 0.0));
        simplex.push(Vec3::new(2.0, 1.0, 0.0));
        let closest = simplex.solve().unwrap();
        assert_eq!(closest, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(simplex.points(), &[Vec3::new(1.0, 1.0, 0.0)]);
    }

    #[test]
    fn test_simplex_tetrahedron_encloses_origin() {
        let mut simplex = Simplex::new();
        simplex.push(Vec3::new(1.0, -1.0, -1.0));
        simplex.push(Vec3::new(-1.0, -1.0, -1.0));
        simplex.push(Vec3::new(0.0, -1.0, 1.0));
        simplex.push(Vec3::new(0.0, 1.0, 0.0));
        assert!(simplex.solve().is_none());
    }

    #[test]
    fn test_flat_tetrahedron_keeps_nearest_face() {
        let oldest = Vec3::new(-1.0, 1.0, -1.0);
        let mut simplex = Simplex::new();
        simplex.push(oldest);
        simplex.push(Vec3::new(1.0, 1.0, -1.0));
        simplex.push(Vec3::new(0.0, 1.0, 1.0));
        simplex.push(Vec3::new(5.0, 1.0, 4.0));
        // all four points lie on the plane y = 1; the face without the
        // oldest point would stop short at |v| ~ 1.09
        let closest = simplex.solve().unwrap();
        assert!((closest - Vec3::Y).length() < 1e-5, "closest {closest}");
        assert_eq!(simplex.len(), 3);
        assert!(simplex.points().contains(&oldest));
    }

    /// Small xorshift generator so the sampled pairs are reproducible
    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> f32 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            (self.0 >> 40) as f32 / (1u64 << 24) as f32
        }

        fn range(&mut self, lo: f32, hi: f32) -> f32 {
            lo + (hi - lo) * self.next()
        }

        fn rotation(&mut self) -> Quat {
            let axis = Vec3::new(self.range(-1.0, 1.0), self.range(-1.0, 1.0), self.range(-1.0, 1.0));
            Quat::from_axis_angle(axis.try_normalize().unwrap_or(Vec3::X), self.range(0.0, std::f32::consts::TAU))
        }
    }

    /// Segment-segment gap minus both radii, in f64
    fn capsule_gap(a: &Placement, b: &Placement) -> f32 {
        let (Shape::Capsule(ca), Shape::Capsule(cb)) = (a.shape, b.shape) else {
            unreachable!("capsules only");
        };
        let (a0, a1) = ca.segment(a.pose.rotation);
        let (b0, b1) = cb.segment(b.pose.rotation);
        let p1 = (a.pose.position + a0).as_dvec3();
        let p2 = (b.pose.position + b0).as_dvec3();
        let d1 = (a1 - a0).as_dvec3();
        let d2 = (b1 - b0).as_dvec3();
        let r = p1 - p2;
        let (aa, e, f) = (d1.dot(d1), d2.dot(d2), d2.dot(r));
        let (c, bb) = (d1.dot(r), d1.dot(d2));
        let denom = aa * e - bb * bb;
        let mut s = if denom > 1e-12 { ((bb * f - c * e) / denom).clamp(0.0, 1.0) } else { 0.0 };
        let mut t = (bb * s + f) / e;
        if t < 0.0 {
            t = 0.0;
            s = (-c / aa).clamp(0.0, 1.0);
        } else if t > 1.0 {
            t = 1.0;
            s = ((bb - c) / aa).clamp(0.0, 1.0);
        }
        let gap = (p1 + d1 * s).distance(p2 + d2 * t);
        (gap - f64::from(ca.radius) - f64::from(cb.radius)) as f32
    }

    #[test]
    fn test_capsule_pairs_match_segment_distance() {
        let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);
        let mut simplex = Simplex::new();
        let mut checked = 0;
        for i in 0..600 {
            let rot_a = rng.rotation();
            // every other pair is nearly parallel
            let rot_b = if i % 2 == 0 {
                (Quat::from_scaled_axis(Vec3::new(
                    rng.range(-0.2, 0.2),
                    rng.range(-0.2, 0.2),
                    rng.range(-0.2, 0.2),
                )) * rot_a)
                    .normalize()
            } else {
                rng.rotation()
            };
            let a = Placement::new(
                Shape::capsule(rng.range(0.1, 1.0), rng.range(0.1, 1.5)),
                Pose::new(Vec3::new(rng.range(-2.0, 2.0), rng.range(-2.0, 2.0), rng.range(-2.0, 2.0)), rot_a),
                0.0,
            );
            let b = Placement::new(
                Shape::capsule(rng.range(0.1, 1.0), rng.range(0.1, 1.5)),
                Pose::new(Vec3::new(rng.range(-2.0, 2.0), rng.range(-2.0, 2.0), rng.range(-2.0, 2.0)), rot_b),
                0.0,
            );

            let expected = capsule_gap(&a, &b);
            let engine = GjkEngine::new(&a, &b);
            if expected > 0.01 {
                let v = engine.distance(&mut simplex, false).unwrap();
                assert!(
                    (v.length() - expected).abs() < 5e-3,
                    "pair {i}: gjk {} vs segments {expected}",
                    v.length()
                );
                checked += 1;
            } else if expected < -0.01 {
                assert!(engine.intersection(&mut simplex), "pair {i} should overlap");
            }
        }
        assert!(checked > 100);
    }
}
