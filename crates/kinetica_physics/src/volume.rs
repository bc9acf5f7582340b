//! Volumes: a convex shape placed in the world plus what it takes part in
//!
//! A volume always has a shape and a pose. It may additionally be a solid
//! collider or a trigger, be ray-testable, carry a rigid body that the world
//! integrates, or carry a force field applied to overlapping bodies.

use std::fmt;

use bitflags::bitflags;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::body::RigidBody;
use crate::contact::ContactData;
use crate::force::ForceField;
use crate::gjk::{GjkEngine, Simplex, RESTING_TOLERANCE};
use crate::pose::Pose;
use crate::ray::{Ray, RayHit};
use crate::shapes::{Aabb, Shape, DIRECTION_EPSILON};

/// Skin depth given to new volumes
pub const DEFAULT_SKIN_DEPTH: f32 = 0.01;

new_key_type! {
    /// Key for volumes stored in a [`PhysicsWorld`](crate::PhysicsWorld)
    pub struct VolumeKey;
}

/// Identifier of the game object that owns a volume
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a volume takes part in collision
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionMode {
    /// Not tested for contacts
    None,
    /// Solid obstacle for rigid bodies
    #[default]
    Collider,
    /// Reports overlaps but never blocks
    Trigger,
}

bitflags! {
    /// Registries a volume belongs to
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const COLLIDER = 1 << 0;
        const TRIGGER = 1 << 1;
        const RAY_TEST = 1 << 2;
        const RIGID_BODY = 1 << 3;
        const FORCE_FIELD = 1 << 4;
    }
}

/// A shape at a pose with its skin depth
///
/// Cheap to copy; used to test a body at its solver pose without borrowing
/// the volume that owns it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub shape: Shape,
    pub pose: Pose,
    pub skin_depth: f32,
}

impl Placement {
    pub fn new(shape: Shape, pose: Pose, skin_depth: f32) -> Self {
        Self {
            shape,
            pose,
            skin_depth,
        }
    }

    /// Extremal point along `direction`, relative to `reference`
    pub fn support_point(&self, direction: Vec3, reference: Vec3, inset: f32) -> Vec3 {
        (self.pose.position - reference) + self.shape.support(self.pose.rotation, direction, inset)
    }

    /// World-space bounds
    pub fn world_bounds(&self) -> Aabb {
        self.shape.local_bounds(self.pose.rotation).translated(self.pose.position)
    }
}

#[derive(Debug)]
pub struct Volume {
    owner: ObjectId,
    pub(crate) shape: Shape,
    pub(crate) pose: Pose,
    /// Extents relative to `pose.position`, refreshed whenever the pose changes
    bounds: Aabb,
    mode: CollisionMode,
    ray_testable: bool,
    pub(crate) skin_depth: f32,
    registered: bool,
    pub(crate) rigid_body: Option<RigidBody>,
    pub(crate) force_field: Option<ForceField>,
}

impl Volume {
    /// Create a ray-testable collider for `owner`
    pub fn new(owner: ObjectId, shape: Shape) -> Self {
        Self {
            owner,
            shape,
            pose: Pose::IDENTITY,
            bounds: shape.local_bounds(Pose::IDENTITY.rotation),
            mode: CollisionMode::Collider,
            ray_testable: true,
            skin_depth: DEFAULT_SKIN_DEPTH,
            registered: false,
            rigid_body: None,
            force_field: None,
        }
    }

    pub fn with_mode(mut self, mode: CollisionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ray_test(mut self, enabled: bool) -> Self {
        self.ray_testable = enabled;
        self
    }

    pub fn with_skin_depth(mut self, skin_depth: f32) -> Self {
        self.skin_depth = skin_depth.max(0.0);
        self
    }

    pub fn with_rigid_body(mut self, body: RigidBody) -> Self {
        self.rigid_body = Some(body);
        self
    }

    pub fn with_force_field(mut self, field: ForceField) -> Self {
        self.force_field = Some(field);
        self
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self.update_bounds();
        self
    }

    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn position(&self) -> Vec3 {
        self.pose.position
    }

    pub fn mode(&self) -> CollisionMode {
        self.mode
    }

    pub fn skin_depth(&self) -> f32 {
        self.skin_depth
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn rigid_body(&self) -> Option<&RigidBody> {
        self.rigid_body.as_ref()
    }

    pub fn rigid_body_mut(&mut self) -> Option<&mut RigidBody> {
        self.rigid_body.as_mut()
    }

    pub fn force_field(&self) -> Option<&ForceField> {
        self.force_field.as_ref()
    }

    /// Registries this volume should be listed in
    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        match self.mode {
            CollisionMode::Collider => caps |= Capabilities::COLLIDER,
            CollisionMode::Trigger => caps |= Capabilities::TRIGGER,
            CollisionMode::None => {}
        }
        caps.set(Capabilities::RAY_TEST, self.ray_testable);
        caps.set(Capabilities::RIGID_BODY, self.rigid_body.is_some());
        caps.set(Capabilities::FORCE_FIELD, self.force_field.is_some());
        caps
    }

    /// Snapshot of shape, pose and skin
    pub fn placement(&self) -> Placement {
        Placement::new(self.shape, self.pose, self.skin_depth)
    }

    /// Take the initial world transform and mark the volume live
    pub fn register(&mut self, world: &Mat4) {
        self.recalculate(world);
        self.registered = true;
    }

    /// Mark the volume dead; any rigid body is reset to rest
    pub fn deregister(&mut self) {
        self.registered = false;
        if let Some(body) = self.rigid_body.as_mut() {
            body.reset();
        }
    }

    /// Re-derive the pose from a world matrix
    ///
    /// A rigid body snaps to the new pose and drops pending interpolation.
    pub fn recalculate(&mut self, world: &Mat4) {
        self.pose = Pose::from_matrix(world);
        self.update_bounds();
        if let Some(body) = self.rigid_body.as_mut() {
            body.teleport(&self.pose);
        }
    }

    pub fn update_bounds(&mut self) {
        self.bounds = self.shape.local_bounds(self.pose.rotation);
    }

    /// Extents relative to the volume position
    pub fn local_bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn world_bounds(&self) -> Aabb {
        self.bounds.translated(self.pose.position)
    }

    /// Extremal point along `direction`, relative to `reference`
    pub fn support_point(&self, direction: Vec3, reference: Vec3, inset: f32) -> Vec3 {
        self.placement().support_point(direction, reference, inset)
    }

    pub fn ray_test(&self, ray: &Ray) -> Option<RayHit> {
        self.shape.ray_test(&self.pose, ray)
    }

    /// Resolve a resting contact between this collider and `body` placed at `other`
    ///
    /// Returns true when the body was pushed.
    pub fn idle_solver(&self, other: &Placement, body: &mut RigidBody) -> bool {
        if self.mode != CollisionMode::Collider {
            return false;
        }
        let reach = self.skin_depth + other.skin_depth + RESTING_TOLERANCE;
        let mine = self.world_bounds();
        let theirs = other.world_bounds();
        let inflated = Aabb::new(theirs.min - Vec3::splat(reach), theirs.max + Vec3::splat(reach));
        if !mine.overlaps(&inflated) {
            return false;
        }

        let me = self.placement();
        let mut simplex = Simplex::new();
        match GjkEngine::new(other, &me).resting_contact(&mut simplex) {
            Some(contact) => body.step_idle_solver(contact.push, contact.normal),
            None => false,
        }
    }

    /// Sweep `body` (placed at `other`) against this collider and record a hit
    ///
    /// Returns true when a contact was added to the body.
    pub fn motion_solver(&self, other: &Placement, body: &mut RigidBody) -> bool {
        if self.mode != CollisionMode::Collider {
            return false;
        }
        let displacement = body.pending_displacement();
        if displacement.length_squared() <= DIRECTION_EPSILON {
            return false;
        }

        let start = other.world_bounds();
        let end = start.translated(displacement);
        let swept = Aabb::new(start.min.min(end.min), start.max.max(end.max));
        if !self.world_bounds().overlaps(&swept) {
            return false;
        }

        let me = self.placement();
        let mut simplex = Simplex::new();
        let Some(hit) = GjkEngine::new(other, &me).moving_contact(&mut simplex, displacement) else {
            return false;
        };

        body.add_contact(ContactData {
            point: hit.point,
            normal: hit.normal,
            time: hit.time,
            interval: body.remaining_interval(),
            volume: self.owner,
            index: self.shape.feature_index(self.pose.rotation, hit.normal),
            separation: self.skin_depth + other.skin_depth,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_capabilities_follow_configuration() {
        let collider = Volume::new(ObjectId(1), Shape::sphere(1.0));
        assert_eq!(collider.capabilities(), Capabilities::COLLIDER | Capabilities::RAY_TEST);

        let trigger = Volume::new(ObjectId(2), Shape::sphere(1.0))
            .with_mode(CollisionMode::Trigger)
            .with_ray_test(false);
        assert_eq!(trigger.capabilities(), Capabilities::TRIGGER);

        let body = Volume::new(ObjectId(3), Shape::sphere(1.0))
            .with_rigid_body(RigidBody::new())
            .with_force_field(ForceField::directional(Vec3::Y));
        assert!(body.capabilities().contains(Capabilities::RIGID_BODY | Capabilities::FORCE_FIELD));
    }

    #[test]
    fn test_register_derives_pose_and_bounds() {
        let mut volume = Volume::new(ObjectId(1), Shape::cuboid(Vec3::new(2.0, 0.5, 0.5)));
        let matrix = Mat4::from_rotation_translation(
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(0.0, 10.0, 0.0),
        );
        volume.register(&matrix);

        assert!(volume.is_registered());
        assert!((volume.position() - Vec3::new(0.0, 10.0, 0.0)).length() < 1e-6);
        let bounds = volume.world_bounds();
        assert!((bounds.min - Vec3::new(-0.5, 8.0, -0.5)).length() < 1e-4);
        assert!((bounds.max - Vec3::new(0.5, 12.0, 0.5)).length() < 1e-4);

        volume.deregister();
        assert!(!volume.is_registered());
    }

    #[test]
    fn test_support_point_relative_to_reference() {
        let volume = Volume::new(ObjectId(1), Shape::sphere(1.0))
            .with_pose(Pose::from_position(Vec3::new(3.0, 0.0, 0.0)));
        let p = volume.support_point(Vec3::X, Vec3::new(1.0, 0.0, 0.0), 0.25);
        assert!((p - Vec3::new(2.75, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_idle_solver_pushes_body_out() {
        let ground = Volume::new(ObjectId(1), Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)));
        let mut body = RigidBody::new();
        let pose = Pose::from_position(Vec3::new(0.0, 1.0, 0.0));
        body.setup_idle_solver(&pose);

        let placement = Placement::new(Shape::cuboid(Vec3::splat(0.5)), body.solver_pose(), DEFAULT_SKIN_DEPTH);
        assert!(ground.idle_solver(&placement, &mut body));
        assert!(body.on_ground());
        assert!((body.solver_state().position.y - 1.02).abs() < 1e-4);
    }

    #[test]
    fn test_trigger_never_blocks() {
        let trigger = Volume::new(ObjectId(1), Shape::cuboid(Vec3::new(5.0, 0.5, 5.0))).with_mode(CollisionMode::Trigger);
        let mut body = RigidBody::new();
        body.setup_idle_solver(&Pose::from_position(Vec3::new(0.0, 1.0, 0.0)));
        let placement = Placement::new(Shape::sphere(0.5), body.solver_pose(), DEFAULT_SKIN_DEPTH);
        assert!(!trigger.idle_solver(&placement, &mut body));
        assert!(!trigger.motion_solver(&placement, &mut body));
    }

    #[test]
    fn test_motion_solver_records_contact() {
        let ground = Volume::new(ObjectId(9), Shape::cuboid(Vec3::new(5.0, 0.5, 5.0)));
        let mut body = RigidBody::new().with_velocity(Vec3::new(0.0, -10.0, 0.0));
        body.calculate(0.5, Vec3::ZERO);
        body.setup_idle_solver(&Pose::from_position(Vec3::new(0.0, 3.0, 0.0)));

        let placement = Placement::new(Shape::sphere(0.5), body.solver_pose(), DEFAULT_SKIN_DEPTH);
        assert!(ground.motion_solver(&placement, &mut body));
        let contact = body.contacts()[0];
        assert_eq!(contact.volume, ObjectId(9));
        // falls 2.0 of a 5.0 sweep
        assert!((contact.time - 0.4).abs() < 1e-3);
        // top face of the ground
        assert_eq!(contact.index, 2);
    }
}
