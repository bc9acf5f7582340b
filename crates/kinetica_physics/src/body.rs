//! Rigid body dynamics and the per-tick solver state
//!
//! Each tick a body goes through the same phases:
//! 1. [`RigidBody::calculate`] integrates forces into velocity
//! 2. the idle phase pushes the body out of resting contacts
//! 3. the motion phase sweeps the body along its velocity, stopping at the
//!    earliest contact and sliding along it with what is left of the tick
//! 4. [`RigidBody::apply`] commits the solver result to the volume pose and
//!    stamps it for interpolation
//!
//! The world drives these phases; the body only keeps the scratch state.

use glam::{Quat, Vec3};

use crate::contact::ContactData;
use crate::interpolation::{PoseInterpolator, Stamp};
use crate::pose::Pose;
use crate::shapes::DIRECTION_EPSILON;

/// Contact normals steeper than this (on the Y component) count as ground
pub const GROUND_NORMAL_THRESHOLD: f32 = 0.7;

/// Contacts closer together in time than this are resolved as one group
pub const CONTACT_TIME_TOLERANCE: f32 = 1e-4;

/// Smallest back-off applied after a swept hit when the skins sum to zero
pub const MIN_SEPARATION: f32 = 1e-4;

/// Squared push length below which an idle contact changes nothing
const PUSH_EPSILON: f32 = 1e-10;

/// Where a body is in the per-tick cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BodyPhase {
    /// Before the first tick or after a reset
    #[default]
    Idle,
    Integrating,
    SolvingIdle,
    SolvingMotion,
    Applied,
}

/// Scratch position and velocity the solver works on
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
}

impl Default for SolverState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// A dynamic body attached to a volume
#[derive(Debug)]
pub struct RigidBody {
    velocity: Vec3,
    /// Rotation rate as a scaled axis (radians per second)
    angular_velocity: Vec3,
    /// Constant acceleration on top of gravity
    acceleration: Vec3,
    /// Force accumulated since the last integration
    force: Vec3,
    mass: f32,
    /// Fraction of velocity kept per second (1.0 = no damping)
    damping: f32,
    affected_by_gravity: bool,
    is_static: bool,

    phase: BodyPhase,
    dt: f32,
    solver: SolverState,
    /// Where the body ends up if nothing else is hit this tick
    final_state: SolverState,
    /// Fraction of the tick's motion not yet resolved
    remaining: f32,
    contacts: Vec<ContactData>,
    /// Set while the motion phase still has displacement to sweep
    invalid: bool,
    was_hit: bool,
    on_ground: bool,

    /// Simulated time since the last stamp was pushed
    unstamped: f32,
    interpolator: PoseInterpolator,
}

impl Default for RigidBody {
    fn default() -> Self {
        Self::new()
    }
}

impl RigidBody {
    /// Create a unit-mass body at rest
    pub fn new() -> Self {
        Self {
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            force: Vec3::ZERO,
            mass: 1.0,
            damping: 1.0,
            affected_by_gravity: true,
            is_static: false,
            phase: BodyPhase::Idle,
            dt: 0.0,
            solver: SolverState::default(),
            final_state: SolverState::default(),
            remaining: 0.0,
            contacts: Vec::new(),
            invalid: false,
            was_hit: false,
            on_ground: false,
            unstamped: 0.0,
            interpolator: PoseInterpolator::new(),
        }
    }

    /// Set the velocity of this body
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    /// Set the angular velocity (scaled axis, radians per second)
    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    /// Set a constant acceleration applied every tick
    pub fn with_acceleration(mut self, acceleration: Vec3) -> Self {
        self.acceleration = acceleration;
        self
    }

    /// Set the mass of this body; non-positive masses are clamped to a tiny value
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass.max(1e-6);
        self
    }

    /// Set the fraction of velocity kept per second
    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping.clamp(0.0, 1.0);
        self
    }

    /// Set whether this body is affected by gravity
    pub fn with_gravity(mut self, affected: bool) -> Self {
        self.affected_by_gravity = affected;
        self
    }

    /// Set whether this body is static (never integrated)
    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        if is_static {
            self.affected_by_gravity = false;
            self.velocity = Vec3::ZERO;
        }
        self
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    pub fn set_angular_velocity(&mut self, angular_velocity: Vec3) {
        self.angular_velocity = angular_velocity;
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn phase(&self) -> BodyPhase {
        self.phase
    }

    /// Whether a ground-like contact was seen during the last tick
    pub fn on_ground(&self) -> bool {
        self.on_ground
    }

    pub fn solver_state(&self) -> &SolverState {
        &self.solver
    }

    /// Provisional end-of-tick state
    pub fn final_state(&self) -> &SolverState {
        &self.final_state
    }

    pub fn contacts(&self) -> &[ContactData] {
        &self.contacts
    }

    /// Force accumulated for the next integration
    pub fn pending_force(&self) -> Vec3 {
        self.force
    }

    /// Handle for sampling this body's interpolated pose
    pub fn interpolator(&self) -> PoseInterpolator {
        self.interpolator.clone()
    }

    /// Accumulate a force for the next integration
    pub fn add_force(&mut self, force: Vec3) {
        if !self.is_static {
            self.force += force;
        }
    }

    /// Change velocity instantly by `impulse / mass`
    pub fn apply_impulse(&mut self, impulse: Vec3) {
        if !self.is_static {
            self.velocity += impulse / self.mass;
        }
    }

    /// Integrate acceleration and gravity over `dt`
    ///
    /// Accumulated force changes velocity by `force / mass` once per tick.
    /// Clears the force accumulator and the ground flag.
    pub fn calculate(&mut self, dt: f32, gravity: Vec3) {
        self.phase = BodyPhase::Integrating;
        self.dt = dt.max(0.0);
        self.on_ground = false;

        if self.is_static {
            self.velocity = Vec3::ZERO;
            self.angular_velocity = Vec3::ZERO;
            self.force = Vec3::ZERO;
            return;
        }

        let gravity = if self.affected_by_gravity { gravity } else { Vec3::ZERO };
        self.velocity += (self.acceleration + gravity) * self.dt;
        self.velocity += self.force / self.mass;
        if self.damping < 1.0 {
            let keep = self.damping.powf(self.dt);
            self.velocity *= keep;
            self.angular_velocity *= keep;
        }
        self.force = Vec3::ZERO;
    }

    /// Load the solver from `pose` and the current velocity
    pub fn reset_solver_state(&mut self, pose: &Pose) {
        self.solver = SolverState {
            position: pose.position,
            velocity: self.velocity,
            rotation: pose.rotation,
        };
        self.remaining = 1.0;
        self.contacts.clear();
        self.invalid = !self.is_static && self.pending_displacement().length_squared() > DIRECTION_EPSILON;
        self.update_final_state();
    }

    /// Start the idle phase from the committed pose
    pub fn setup_idle_solver(&mut self, pose: &Pose) {
        self.reset_solver_state(pose);
        self.was_hit = false;
        self.phase = BodyPhase::SolvingIdle;
    }

    /// Apply one resting-contact push
    ///
    /// Moves the solver position by `push` and removes the velocity component
    /// heading into `normal`. Returns whether the push changed anything.
    pub fn step_idle_solver(&mut self, push: Vec3, normal: Vec3) -> bool {
        if self.is_static {
            return false;
        }
        self.solver.position += push;

        if normal.y > GROUND_NORMAL_THRESHOLD {
            self.on_ground = true;
            if self.solver.velocity.y < 0.0 {
                self.solver.velocity.y = 0.0;
            }
        }
        let into = self.solver.velocity.dot(normal);
        if into < 0.0 {
            self.solver.velocity -= normal * into;
        }

        self.update_final_state();
        push.length_squared() > PUSH_EPSILON
    }

    /// Commit the idle outcome to `pose` and start the motion phase from it
    pub fn begin_motion(&mut self, pose: &mut Pose) {
        pose.position = self.solver.position;
        self.velocity = self.solver.velocity;
        self.reset_solver_state(pose);
        self.phase = BodyPhase::SolvingMotion;
    }

    /// Whether the motion phase still has displacement to sweep
    pub fn needs_motion(&self) -> bool {
        self.invalid
    }

    /// Displacement still to be swept this tick
    pub fn pending_displacement(&self) -> Vec3 {
        self.solver.velocity * self.dt * self.remaining
    }

    /// Seconds of motion still to be swept this tick
    pub fn remaining_interval(&self) -> f32 {
        self.dt * self.remaining
    }

    /// Pose the solver currently holds
    pub fn solver_pose(&self) -> Pose {
        Pose::new(self.solver.position, self.solver.rotation)
    }

    /// Record a swept contact, keeping only the earliest group
    pub fn add_contact(&mut self, contact: ContactData) {
        let Some(first) = self.contacts.first() else {
            self.contacts.push(contact);
            return;
        };
        if contact.time < first.time - CONTACT_TIME_TOLERANCE {
            self.contacts.clear();
            self.contacts.push(contact);
        } else if contact.time <= first.time + CONTACT_TIME_TOLERANCE {
            self.contacts.push(contact);
        }
    }

    /// Resolve the earliest contact group of this pass
    ///
    /// Advances to the time of impact, backs off by the skin separation,
    /// removes the velocity heading into the contacts and keeps the rest of
    /// the tick for the next pass. Without contacts the body moves freely for
    /// the rest of the tick. Returns whether a contact was resolved.
    pub fn response(&mut self) -> bool {
        let displacement = self.pending_displacement();

        if self.contacts.is_empty() {
            self.solver.position += displacement;
            self.remaining = 0.0;
            self.invalid = false;
            self.update_final_state();
            return false;
        }

        let time = self.contacts[0].time;
        let mut normal_sum = Vec3::ZERO;
        let mut separation: f32 = 0.0;
        for contact in &self.contacts {
            normal_sum += contact.normal;
            separation = separation.max(contact.separation);
            let into = self.solver.velocity.dot(contact.normal);
            if into < 0.0 {
                self.solver.velocity -= contact.normal * into;
            }
            if contact.normal.y > GROUND_NORMAL_THRESHOLD {
                self.on_ground = true;
            }
        }
        let normal = normal_sum.normalize_or_zero();

        self.solver.position += displacement * time + normal * separation.max(MIN_SEPARATION);
        self.remaining *= 1.0 - time;
        self.was_hit = true;
        self.contacts.clear();
        self.invalid = self.pending_displacement().length_squared() > DIRECTION_EPSILON;
        self.update_final_state();
        true
    }

    /// Drop whatever motion is left after the solver gave up on this tick
    pub fn abandon_motion(&mut self) {
        self.remaining = 0.0;
        self.contacts.clear();
        self.invalid = false;
        self.update_final_state();
    }

    /// Commit the solver result to `pose`
    ///
    /// When the body was hit this tick, `settle` runs up to `settle_iterations`
    /// extra resting-contact passes first (stopping early once it reports no
    /// change). A stamp is pushed when the pose actually moved, carrying the
    /// time since the previous stamp.
    pub fn apply<F>(&mut self, pose: &mut Pose, settle_iterations: usize, mut settle: F)
    where
        F: FnMut(&mut RigidBody) -> bool,
    {
        if self.was_hit {
            for _ in 0..settle_iterations {
                if !settle(self) {
                    break;
                }
            }
        }

        let rotation = if self.angular_velocity.length_squared() > DIRECTION_EPSILON {
            (Quat::from_scaled_axis(self.angular_velocity * self.dt) * self.solver.rotation).normalize()
        } else {
            self.solver.rotation
        };
        self.solver.rotation = rotation;

        let moved = self.solver.position.distance_squared(pose.position) > DIRECTION_EPSILON
            || rotation.dot(pose.rotation).abs() < 1.0 - 1e-7;

        pose.position = self.solver.position;
        pose.rotation = rotation;
        self.velocity = self.solver.velocity;
        self.phase = BodyPhase::Applied;

        self.unstamped += self.dt;
        if moved {
            self.interpolator.push(Stamp { dt: self.unstamped, pose: *pose });
            self.unstamped = 0.0;
        }
    }

    /// Jump to `pose` without interpolating
    pub fn teleport(&mut self, pose: &Pose) {
        self.solver.position = pose.position;
        self.solver.rotation = pose.rotation;
        self.final_state = self.solver;
        self.unstamped = 0.0;
        self.interpolator.snap(*pose);
    }

    /// Return to rest: all motion, forces and solver state are cleared
    pub fn reset(&mut self) {
        self.velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
        self.force = Vec3::ZERO;
        self.solver.velocity = Vec3::ZERO;
        self.final_state = self.solver;
        self.remaining = 0.0;
        self.contacts.clear();
        self.invalid = false;
        self.was_hit = false;
        self.on_ground = false;
        self.phase = BodyPhase::Idle;
        self.unstamped = 0.0;
        self.interpolator.snap(Pose::new(self.solver.position, self.solver.rotation));
    }

    fn update_final_state(&mut self) {
        self.final_state = SolverState {
            position: self.solver.position + self.pending_displacement(),
            ..self.solver
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::ObjectId;

    fn contact(time: f32, normal: Vec3) -> ContactData {
        ContactData {
            point: Vec3::ZERO,
            normal,
            time,
            interval: 0.1,
            volume: ObjectId(1),
            index: 0,
            separation: 0.02,
        }
    }

    #[test]
    fn test_new_body_defaults() {
        let body = RigidBody::new();
        assert_eq!(body.velocity(), Vec3::ZERO);
        assert_eq!(body.mass(), 1.0);
        assert_eq!(body.damping(), 1.0);
        assert_eq!(body.phase(), BodyPhase::Idle);
        assert!(!body.on_ground());
    }

    #[test]
    fn test_calculate_applies_gravity() {
        let mut body = RigidBody::new();
        body.calculate(0.5, Vec3::new(0.0, -10.0, 0.0));
        assert_eq!(body.velocity(), Vec3::new(0.0, -5.0, 0.0));
        assert_eq!(body.phase(), BodyPhase::Integrating);
    }

    #[test]
    fn test_calculate_uses_force_and_mass() {
        let mut body = RigidBody::new().with_mass(2.0).with_gravity(false);
        body.add_force(Vec3::new(4.0, 0.0, 0.0));
        body.calculate(1.0, Vec3::new(0.0, -10.0, 0.0));
        assert_eq!(body.velocity(), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(body.pending_force(), Vec3::ZERO);
    }

    #[test]
    fn test_force_is_not_scaled_by_dt() {
        let mut body = RigidBody::new().with_mass(2.0).with_gravity(false);
        body.add_force(Vec3::new(4.0, 0.0, 0.0));
        body.calculate(0.5, Vec3::ZERO);
        assert_eq!(body.velocity(), Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_damping_per_second() {
        let mut body = RigidBody::new()
            .with_velocity(Vec3::new(8.0, 0.0, 0.0))
            .with_damping(0.5)
            .with_gravity(false);
        body.calculate(1.0, Vec3::ZERO);
        assert!((body.velocity().x - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_static_body_never_moves() {
        let mut body = RigidBody::new().with_static(true);
        body.apply_impulse(Vec3::X);
        body.add_force(Vec3::Y);
        body.calculate(1.0, Vec3::new(0.0, -10.0, 0.0));
        assert_eq!(body.velocity(), Vec3::ZERO);
        body.setup_idle_solver(&Pose::IDENTITY);
        assert!(!body.needs_motion());
        assert!(!body.step_idle_solver(Vec3::Y, Vec3::Y));
    }

    #[test]
    fn test_step_idle_solver_grounds_body() {
        let mut body = RigidBody::new().with_velocity(Vec3::new(1.0, -3.0, 0.0));
        body.calculate(0.1, Vec3::ZERO);
        body.setup_idle_solver(&Pose::IDENTITY);
        assert!(body.step_idle_solver(Vec3::new(0.0, 0.01, 0.0), Vec3::Y));
        assert!(body.on_ground());
        assert_eq!(body.solver_state().velocity, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(body.solver_state().position, Vec3::new(0.0, 0.01, 0.0));
        // a zero push reports no change
        assert!(!body.step_idle_solver(Vec3::ZERO, Vec3::Y));
    }

    #[test]
    fn test_wall_contact_removes_normal_velocity_only() {
        let mut body = RigidBody::new().with_velocity(Vec3::new(-2.0, 0.0, 1.0));
        body.calculate(0.1, Vec3::ZERO);
        body.setup_idle_solver(&Pose::IDENTITY);
        body.step_idle_solver(Vec3::ZERO, Vec3::X);
        assert!(!body.on_ground());
        assert_eq!(body.solver_state().velocity, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_earliest_contact_group_wins() {
        let mut body = RigidBody::new();
        body.add_contact(contact(0.5, Vec3::Y));
        body.add_contact(contact(0.8, Vec3::X));
        assert_eq!(body.contacts().len(), 1);
        body.add_contact(contact(0.5, Vec3::Z));
        assert_eq!(body.contacts().len(), 2);
        body.add_contact(contact(0.2, Vec3::NEG_X));
        assert_eq!(body.contacts().len(), 1);
        assert_eq!(body.contacts()[0].normal, Vec3::NEG_X);
    }

    #[test]
    fn test_response_without_contacts_moves_freely() {
        let mut body = RigidBody::new().with_velocity(Vec3::new(0.0, 0.0, 10.0));
        body.calculate(0.1, Vec3::ZERO);
        let mut pose = Pose::IDENTITY;
        body.setup_idle_solver(&pose);
        body.begin_motion(&mut pose);
        assert!(body.needs_motion());
        assert!(!body.response());
        assert!(!body.needs_motion());
        assert!((body.solver_state().position - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_response_slides_along_ground() {
        let mut body = RigidBody::new().with_velocity(Vec3::new(4.0, -4.0, 0.0));
        body.calculate(0.5, Vec3::ZERO);
        let mut pose = Pose::IDENTITY;
        body.setup_idle_solver(&pose);
        body.begin_motion(&mut pose);

        body.add_contact(contact(0.25, Vec3::Y));
        assert!(body.response());
        assert!(body.on_ground());
        // a quarter of (2, -2, 0) plus the skin back-off
        assert!((body.solver_state().position - Vec3::new(0.5, -0.48, 0.0)).length() < 1e-5);
        assert_eq!(body.solver_state().velocity, Vec3::new(4.0, 0.0, 0.0));
        assert!(body.needs_motion());
        // the remaining 3/4 of the tick continues along the ground
        assert!((body.pending_displacement() - Vec3::new(1.5, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_apply_commits_and_stamps() {
        let mut body = RigidBody::new().with_velocity(Vec3::X);
        body.calculate(1.0, Vec3::ZERO);
        let mut pose = Pose::IDENTITY;
        body.setup_idle_solver(&pose);
        body.begin_motion(&mut pose);
        body.response();

        let interpolator = body.interpolator();
        let mut settled = 0;
        body.apply(&mut pose, 4, |_| {
            settled += 1;
            true
        });
        // not hit, so no settling passes
        assert_eq!(settled, 0);
        assert_eq!(pose.position, Vec3::X);
        assert_eq!(body.phase(), BodyPhase::Applied);
        assert_eq!(interpolator.pending(), 1);
        assert_eq!(interpolator.committed().position, Vec3::X);
    }

    fn free_tick(body: &mut RigidBody, pose: &mut Pose, dt: f32) {
        body.calculate(dt, Vec3::ZERO);
        body.setup_idle_solver(pose);
        body.begin_motion(pose);
        body.response();
        body.apply(pose, 0, |_| false);
    }

    #[test]
    fn test_stamp_covers_ticks_spent_at_rest() {
        let mut body = RigidBody::new().with_velocity(Vec3::X).with_gravity(false);
        let interpolator = body.interpolator();
        let mut pose = Pose::IDENTITY;
        free_tick(&mut body, &mut pose, 1.0);
        assert_eq!(interpolator.pending(), 1);

        body.set_velocity(Vec3::ZERO);
        free_tick(&mut body, &mut pose, 1.0);
        free_tick(&mut body, &mut pose, 1.0);
        assert_eq!(interpolator.pending(), 1);

        body.set_velocity(Vec3::X);
        free_tick(&mut body, &mut pose, 1.0);
        assert_eq!(interpolator.pending(), 2);
        assert_eq!(pose.position, Vec3::new(2.0, 0.0, 0.0));

        // the second stamp spans all three ticks, so half of it is 1.5s
        let mut visual = Pose::IDENTITY;
        interpolator.update_transform(1.5, &mut visual);
        assert!((visual.position.x - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_apply_settles_after_hit() {
        let mut body = RigidBody::new().with_velocity(Vec3::NEG_Y);
        body.calculate(1.0, Vec3::ZERO);
        let mut pose = Pose::IDENTITY;
        body.setup_idle_solver(&pose);
        body.begin_motion(&mut pose);
        body.add_contact(contact(0.5, Vec3::Y));
        body.response();

        let mut passes = 0;
        body.apply(&mut pose, 4, |_| {
            passes += 1;
            passes < 2
        });
        assert_eq!(passes, 2);
    }

    #[test]
    fn test_angular_velocity_rotates_pose() {
        let mut body = RigidBody::new()
            .with_angular_velocity(Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0))
            .with_gravity(false);
        body.calculate(1.0, Vec3::ZERO);
        let mut pose = Pose::IDENTITY;
        body.setup_idle_solver(&pose);
        body.begin_motion(&mut pose);
        body.apply(&mut pose, 0, |_| false);
        let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        assert!(pose.rotation.dot(expected).abs() > 1.0 - 1e-5);
    }

    #[test]
    fn test_reset_clears_motion() {
        let mut body = RigidBody::new().with_velocity(Vec3::ONE);
        body.add_force(Vec3::ONE);
        body.reset();
        assert_eq!(body.velocity(), Vec3::ZERO);
        assert_eq!(body.pending_force(), Vec3::ZERO);
        assert_eq!(body.phase(), BodyPhase::Idle);
    }
}
