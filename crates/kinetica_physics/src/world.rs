//! Physics world and the per-tick solve

use std::collections::{BTreeMap, BTreeSet};

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::body::RigidBody;
use crate::force::ForceField;
use crate::gjk::{GjkEngine, Simplex};
use crate::ray::{QueryRay, Ray, RaycastInfo};
use crate::shapes::Shape;
use crate::volume::{Capabilities, ObjectId, Placement, Volume, VolumeKey};

/// Configuration for the physics simulation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity acceleration in world units per second squared
    pub gravity: Vec3,
    /// Cap on resting-contact passes per tick
    pub idle_iterations: usize,
    /// Cap on swept-contact passes per tick
    pub motion_iterations: usize,
    /// Cap on resting passes when committing a body that was hit
    pub settle_iterations: usize,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            idle_iterations: 8,
            motion_iterations: 4,
            settle_iterations: 4,
        }
    }
}

impl PhysicsConfig {
    /// Create a new physics config with the given gravity
    pub fn new(gravity: Vec3) -> Self {
        Self {
            gravity,
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerEventKind {
    Enter,
    Exit,
}

/// A rigid body started or stopped overlapping a trigger volume
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerEvent {
    pub trigger: ObjectId,
    pub other: ObjectId,
    pub kind: TriggerEventKind,
}

/// What one call to [`PhysicsWorld::step`] did
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepReport {
    /// Resting-contact passes run
    pub idle_passes: usize,
    /// Swept-contact passes run
    pub motion_passes: usize,
    /// Bodies that needed the forced pass after the motion budget ran out
    pub fallback_bodies: usize,
    pub trigger_events: Vec<TriggerEvent>,
}

/// The physics world: every registered volume plus per-capability registries
///
/// Registries are keyed by owner and hold slotmap keys into the volume
/// storage. They are only changed through [`add_volume`](Self::add_volume)
/// and [`remove_volume`](Self::remove_volume).
pub struct PhysicsWorld {
    volumes: SlotMap<VolumeKey, Volume>,
    all: BTreeMap<ObjectId, VolumeKey>,
    colliders: BTreeMap<ObjectId, VolumeKey>,
    triggers: BTreeMap<ObjectId, VolumeKey>,
    ray_testable: BTreeMap<ObjectId, VolumeKey>,
    rigid_bodies: BTreeMap<ObjectId, VolumeKey>,
    force_fields: BTreeMap<ObjectId, VolumeKey>,
    /// (trigger, body) pairs overlapping at the end of the last step
    overlaps: BTreeSet<(ObjectId, ObjectId)>,
    /// Physics configuration
    pub config: PhysicsConfig,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    /// Create a new physics world with default configuration
    pub fn new() -> Self {
        Self::with_config(PhysicsConfig::default())
    }

    /// Create a new physics world with custom configuration
    pub fn with_config(config: PhysicsConfig) -> Self {
        Self {
            volumes: SlotMap::with_key(),
            all: BTreeMap::new(),
            colliders: BTreeMap::new(),
            triggers: BTreeMap::new(),
            ray_testable: BTreeMap::new(),
            rigid_bodies: BTreeMap::new(),
            force_fields: BTreeMap::new(),
            overlaps: BTreeSet::new(),
            config,
        }
    }

    /// Add a volume and list it in every registry its capabilities ask for
    ///
    /// A volume already registered for the same owner is replaced.
    pub fn add_volume(&mut self, volume: Volume) -> VolumeKey {
        let owner = volume.owner();
        if self.all.contains_key(&owner) {
            log::warn!("volume for {owner} added twice; replacing the old one");
            self.remove_volume(owner);
        }

        let caps = volume.capabilities();
        let key = self.volumes.insert(volume);
        self.all.insert(owner, key);
        for (flag, registry) in [
            (Capabilities::COLLIDER, &mut self.colliders),
            (Capabilities::TRIGGER, &mut self.triggers),
            (Capabilities::RAY_TEST, &mut self.ray_testable),
            (Capabilities::RIGID_BODY, &mut self.rigid_bodies),
            (Capabilities::FORCE_FIELD, &mut self.force_fields),
        ] {
            if caps.contains(flag) {
                registry.insert(owner, key);
            }
        }
        key
    }

    /// Remove the volume for `owner` from every registry and deregister it
    pub fn remove_volume(&mut self, owner: ObjectId) -> Option<Volume> {
        let key = self.all.remove(&owner)?;
        self.colliders.remove(&owner);
        self.triggers.remove(&owner);
        self.ray_testable.remove(&owner);
        self.rigid_bodies.remove(&owner);
        self.force_fields.remove(&owner);
        self.overlaps.retain(|&(trigger, other)| trigger != owner && other != owner);

        let mut volume = self.volumes.remove(key)?;
        volume.deregister();
        Some(volume)
    }

    /// Re-derive the pose of `owner`'s volume from a new world matrix
    pub fn update_transform(&mut self, owner: ObjectId, world: &Mat4) -> bool {
        match self.all.get(&owner).and_then(|&key| self.volumes.get_mut(key)) {
            Some(volume) => {
                volume.recalculate(world);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, owner: ObjectId) -> bool {
        self.all.contains_key(&owner)
    }

    pub fn volume(&self, owner: ObjectId) -> Option<&Volume> {
        self.all.get(&owner).and_then(|&key| self.volumes.get(key))
    }

    pub fn volume_mut(&mut self, owner: ObjectId) -> Option<&mut Volume> {
        self.all.get(&owner).and_then(|&key| self.volumes.get_mut(key))
    }

    /// Get a volume by slotmap key; stale keys return `None`
    pub fn volume_by_key(&self, key: VolumeKey) -> Option<&Volume> {
        self.volumes.get(key)
    }

    pub fn rigid_body(&self, owner: ObjectId) -> Option<&RigidBody> {
        self.volume(owner).and_then(Volume::rigid_body)
    }

    pub fn rigid_body_mut(&mut self, owner: ObjectId) -> Option<&mut RigidBody> {
        self.volume_mut(owner).and_then(Volume::rigid_body_mut)
    }

    /// Accumulate a force on `owner`'s rigid body for the next step
    pub fn apply_force(&mut self, owner: ObjectId, force: Vec3) -> bool {
        self.rigid_body_mut(owner).map(|body| body.add_force(force)).is_some()
    }

    /// Change the velocity of `owner`'s rigid body instantly
    pub fn apply_impulse(&mut self, owner: ObjectId, impulse: Vec3) -> bool {
        self.rigid_body_mut(owner).map(|body| body.apply_impulse(impulse)).is_some()
    }

    /// Iterate over registered owners in id order
    pub fn owners(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.all.keys().copied()
    }

    pub fn volume_count(&self) -> usize {
        self.all.len()
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    pub fn ray_testable_count(&self) -> usize {
        self.ray_testable.len()
    }

    pub fn rigid_body_count(&self) -> usize {
        self.rigid_bodies.len()
    }

    pub fn force_field_count(&self) -> usize {
        self.force_fields.len()
    }

    /// Check that every registry entry points at a live volume with the same
    /// owner and matching capabilities, and that no volume is unlisted
    pub fn registries_consistent(&self) -> bool {
        if self.all.len() != self.volumes.len() {
            return false;
        }
        let registries = [
            (Capabilities::COLLIDER, &self.colliders),
            (Capabilities::TRIGGER, &self.triggers),
            (Capabilities::RAY_TEST, &self.ray_testable),
            (Capabilities::RIGID_BODY, &self.rigid_bodies),
            (Capabilities::FORCE_FIELD, &self.force_fields),
        ];
        let listed = self.all.iter().all(|(&owner, &key)| {
            let Some(volume) = self.volumes.get(key) else {
                return false;
            };
            let caps = volume.capabilities();
            volume.owner() == owner
                && registries
                    .iter()
                    .all(|(flag, registry)| caps.contains(*flag) == (registry.get(&owner) == Some(&key)))
        });
        listed
            && registries
                .iter()
                .all(|(_, registry)| registry.iter().all(|(owner, key)| self.all.get(owner) == Some(key)))
    }

    /// Advance the simulation by `dt` seconds
    ///
    /// Force fields are applied first, then every rigid body is integrated
    /// and the contact solver runs. Trigger overlaps are evaluated on the
    /// committed poses.
    pub fn step(&mut self, dt: f32) -> StepReport {
        self.apply_force_fields();

        let gravity = self.config.gravity;
        for &key in self.rigid_bodies.values() {
            if let Some(body) = self.volumes.get_mut(key).and_then(|v| v.rigid_body.as_mut()) {
                body.calculate(dt, gravity);
            }
        }

        let mut report = self.solve(self.config.idle_iterations, self.config.motion_iterations);
        report.trigger_events = self.update_triggers();

        log::debug!(
            "step dt={dt:.4}: {} idle passes, {} motion passes, {} fallback bodies, {} trigger events",
            report.idle_passes,
            report.motion_passes,
            report.fallback_bodies,
            report.trigger_events.len()
        );
        report
    }

    /// Run the two-phase contact solver on integrated bodies
    ///
    /// 1. Idle phase: up to `idle_iterations` resting-contact passes
    /// 2. Commit the idle result and reset each body for the motion phase
    /// 3. Motion phase: up to `motion_iterations` swept passes
    /// 4. One forced pass for bodies the motion phase could not finish
    /// 5. Commit every body, settling the ones that were hit
    ///
    /// Each phase stops early once a pass changes nothing.
    pub fn solve(&mut self, idle_iterations: usize, motion_iterations: usize) -> StepReport {
        let bodies: Vec<VolumeKey> = self.rigid_bodies.values().copied().collect();
        let colliders: Vec<VolumeKey> = self.colliders.values().copied().collect();
        let mut report = StepReport::default();

        for &key in &bodies {
            if let Some(volume) = self.volumes.get_mut(key) {
                let pose = volume.pose;
                if let Some(body) = volume.rigid_body.as_mut() {
                    body.setup_idle_solver(&pose);
                }
            }
        }

        for _ in 0..idle_iterations {
            report.idle_passes += 1;
            let mut any_response = false;
            for &key in &bodies {
                any_response |= self.with_body(key, |volumes, placement, body| {
                    idle_contacts(volumes, key, placement, body, &colliders)
                });
            }
            if !any_response {
                break;
            }
        }

        for &key in &bodies {
            if let Some(volume) = self.volumes.get_mut(key) {
                if let Some(body) = volume.rigid_body.as_mut() {
                    body.begin_motion(&mut volume.pose);
                }
            }
        }

        let mut converged = false;
        for _ in 0..motion_iterations {
            report.motion_passes += 1;
            let mut any_response = false;
            for &key in &bodies {
                any_response |= self.with_body(key, |volumes, placement, body| {
                    body.needs_motion() && motion_contacts(volumes, key, placement, body, &colliders)
                });
            }
            if !any_response {
                converged = true;
                break;
            }
        }

        if !converged {
            for &key in &bodies {
                let forced = self.with_body(key, |volumes, placement, body| {
                    if !body.needs_motion() {
                        return false;
                    }
                    motion_contacts(volumes, key, placement, body, &colliders);
                    body.abandon_motion();
                    true
                });
                if forced {
                    report.fallback_bodies += 1;
                }
            }
            if report.fallback_bodies > 0 {
                log::debug!("forced pass for {} bodies after {motion_iterations} motion passes", report.fallback_bodies);
            }
        }

        let settle_iterations = self.config.settle_iterations;
        for &key in &bodies {
            self.commit_body(key, settle_iterations, &colliders);
        }

        report
    }

    /// Cast a query ray and deliver every hit to its callback, nearest first
    pub fn cast_ray(&self, query: QueryRay) {
        let hits = self.raycast(&query.ray);
        query.respond(&hits);
    }

    /// Every hit of `ray` against ray-testable volumes, sorted by distance
    pub fn raycast(&self, ray: &Ray) -> Vec<RaycastInfo> {
        let mut hits: Vec<RaycastInfo> = self
            .ray_testable
            .iter()
            .filter_map(|(&owner, &key)| {
                let hit = self.volumes.get(key)?.ray_test(ray)?;
                Some(RaycastInfo {
                    distance: hit.distance,
                    normal: hit.normal,
                    point: hit.point,
                    volume: owner,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    /// Temporarily take the body out of its volume so it can be tested
    /// against the other volumes
    fn with_body<F>(&mut self, key: VolumeKey, f: F) -> bool
    where
        F: FnOnce(&SlotMap<VolumeKey, Volume>, BodyShape, &mut RigidBody) -> bool,
    {
        let Some(volume) = self.volumes.get_mut(key) else {
            return false;
        };
        let Some(mut body) = volume.rigid_body.take() else {
            return false;
        };
        let shape = BodyShape {
            shape: volume.shape,
            skin_depth: volume.skin_depth,
        };
        let result = f(&self.volumes, shape, &mut body);
        if let Some(volume) = self.volumes.get_mut(key) {
            volume.rigid_body = Some(body);
        }
        result
    }

    fn commit_body(&mut self, key: VolumeKey, settle_iterations: usize, colliders: &[VolumeKey]) {
        let Some(volume) = self.volumes.get_mut(key) else {
            return;
        };
        let Some(mut body) = volume.rigid_body.take() else {
            return;
        };
        let shape = BodyShape {
            shape: volume.shape,
            skin_depth: volume.skin_depth,
        };
        let mut pose = volume.pose;

        let volumes = &self.volumes;
        body.apply(&mut pose, settle_iterations, |body| {
            idle_contacts(volumes, key, shape, body, colliders)
        });

        if let Some(volume) = self.volumes.get_mut(key) {
            volume.pose = pose;
            volume.update_bounds();
            volume.rigid_body = Some(body);
        }
    }

    fn apply_force_fields(&mut self) {
        if self.force_fields.is_empty() {
            return;
        }
        let fields: Vec<(VolumeKey, Placement, ForceField)> = self
            .force_fields
            .values()
            .filter_map(|&key| {
                let volume = self.volumes.get(key)?;
                Some((key, volume.placement(), *volume.force_field()?))
            })
            .collect();

        let mut simplex = Simplex::new();
        for &key in self.rigid_bodies.values() {
            let Some(volume) = self.volumes.get_mut(key) else {
                continue;
            };
            let placement = volume.placement();
            let Some(body) = volume.rigid_body.as_mut() else {
                continue;
            };
            for (field_key, field_placement, field) in &fields {
                if *field_key == key {
                    continue;
                }
                if !field_placement.world_bounds().overlaps(&placement.world_bounds()) {
                    continue;
                }
                if GjkEngine::new(field_placement, &placement).intersection(&mut simplex) {
                    body.add_force(field.force_at(field_placement.pose.position, placement.pose.position));
                }
            }
        }
    }

    fn update_triggers(&mut self) -> Vec<TriggerEvent> {
        let mut current = BTreeSet::new();
        let mut simplex = Simplex::new();
        for (&trigger, &trigger_key) in &self.triggers {
            let Some(trigger_placement) = self.volumes.get(trigger_key).map(Volume::placement) else {
                continue;
            };
            let trigger_bounds = trigger_placement.world_bounds();
            for (&other, &body_key) in &self.rigid_bodies {
                if body_key == trigger_key {
                    continue;
                }
                let Some(body_placement) = self.volumes.get(body_key).map(Volume::placement) else {
                    continue;
                };
                if !trigger_bounds.overlaps(&body_placement.world_bounds()) {
                    continue;
                }
                if GjkEngine::new(&trigger_placement, &body_placement).intersection(&mut simplex) {
                    current.insert((trigger, other));
                }
            }
        }

        let mut events = Vec::new();
        for &(trigger, other) in current.difference(&self.overlaps) {
            events.push(TriggerEvent {
                trigger,
                other,
                kind: TriggerEventKind::Enter,
            });
        }
        for &(trigger, other) in self.overlaps.difference(&current) {
            events.push(TriggerEvent {
                trigger,
                other,
                kind: TriggerEventKind::Exit,
            });
        }
        self.overlaps = current;
        events
    }
}

/// Geometry of a body whose rigid body has been taken out of its volume
#[derive(Clone, Copy, Debug)]
struct BodyShape {
    shape: Shape,
    skin_depth: f32,
}

impl BodyShape {
    fn at(&self, body: &RigidBody) -> Placement {
        Placement::new(self.shape, body.solver_pose(), self.skin_depth)
    }
}

/// One resting-contact pass of `body` against every collider but itself
fn idle_contacts(
    volumes: &SlotMap<VolumeKey, Volume>,
    key: VolumeKey,
    shape: BodyShape,
    body: &mut RigidBody,
    colliders: &[VolumeKey],
) -> bool {
    let mut any_response = false;
    for &other in colliders {
        if other == key {
            continue;
        }
        if let Some(collider) = volumes.get(other) {
            let placement = shape.at(body);
            any_response |= collider.idle_solver(&placement, body);
        }
    }
    any_response
}

/// One swept pass of `body` against every collider, then resolve the earliest hit
fn motion_contacts(
    volumes: &SlotMap<VolumeKey, Volume>,
    key: VolumeKey,
    shape: BodyShape,
    body: &mut RigidBody,
    colliders: &[VolumeKey],
) -> bool {
    let placement = shape.at(body);
    for &other in colliders {
        if other == key {
            continue;
        }
        if let Some(collider) = volumes.get(other) {
            collider.motion_solver(&placement, body);
        }
    }
    body.response()
}
