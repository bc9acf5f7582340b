//! Contact results produced by the GJK engine

use glam::Vec3;

use crate::volume::ObjectId;

/// A swept contact recorded on a rigid body during the motion phase
///
/// Only lives for the pass that produced it; [`RigidBody::response`]
/// consumes it.
///
/// [`RigidBody::response`]: crate::RigidBody::response
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactData {
    /// Contact point on the moving body at the time of impact
    pub point: Vec3,
    /// Unit normal pointing from the obstacle toward the moving body
    pub normal: Vec3,
    /// Time of impact as a fraction of the swept displacement, in `[0, 1]`
    pub time: f32,
    /// Seconds of motion covered by the sweep that found this contact
    pub interval: f32,
    /// Owner of the obstacle volume
    pub volume: ObjectId,
    /// Obstacle feature that was hit (see [`Shape::feature_index`](crate::Shape::feature_index))
    pub index: usize,
    /// Gap to restore between the surfaces (sum of both skin depths)
    pub separation: f32,
}

/// Time of impact found by a conservative-advancement sweep
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepHit {
    /// Fraction of the displacement travelled before touching
    pub time: f32,
    /// Unit normal from the obstacle toward the moving shape
    pub normal: Vec3,
    /// Contact point on the moving shape at the time of impact
    pub point: Vec3,
}

/// A resting (non-swept) contact between two nearby shapes
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestingContact {
    /// Unit normal from B toward A
    pub normal: Vec3,
    /// Translation of A that restores the skin gap (zero when already outside it)
    pub push: Vec3,
    /// Surface point of A facing B
    pub point_a: Vec3,
    /// Surface point of B facing A
    pub point_b: Vec3,
}
