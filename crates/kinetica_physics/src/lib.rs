//! Convex collision and rigid body dynamics for Kinetica
//!
//! This crate is the single-threaded simulation core:
//! - Convex shapes (spheres, oriented boxes, capsules) wrapped in volumes
//! - A GJK engine for intersection, distance, swept and resting contacts
//! - Rigid body integration with a two-phase contact solver
//! - Interpolation stamps for rendering between simulation ticks
//! - Force fields and trigger volumes
//!
//! Threading lives one level up, in `kinetica_runtime`.

pub mod body;
pub mod contact;
pub mod force;
pub mod gjk;
pub mod interpolation;
pub mod pose;
pub mod ray;
pub mod shapes;
pub mod volume;
pub mod world;

// Re-export commonly used types
pub use body::{BodyPhase, RigidBody, SolverState, GROUND_NORMAL_THRESHOLD};
pub use contact::{ContactData, RestingContact, SweepHit};
pub use force::ForceField;
pub use gjk::{GjkEngine, Simplex, EPSILON_TOLERANCE, MAX_ITERATIONS};
pub use interpolation::{PoseInterpolator, Stamp, StampQueue, MAX_STAMPS};
pub use pose::Pose;
pub use ray::{QueryRay, Ray, RayHit, RaycastCallback, RaycastInfo};
pub use shapes::{Aabb, Capsule, OrientedBox, Shape, Sphere};
pub use volume::{Capabilities, CollisionMode, ObjectId, Placement, Volume, VolumeKey, DEFAULT_SKIN_DEPTH};
pub use world::{PhysicsConfig, PhysicsWorld, StepReport, TriggerEvent, TriggerEventKind};
