//! Threading layer for Kinetica physics
//!
//! Runs a [`kinetica_physics::PhysicsWorld`] on a dedicated thread and
//! bridges it to the owning thread with one-directional queues.

pub mod clock;
pub mod config;
pub mod error;
pub mod queue;
pub mod service;
pub mod update;

pub use clock::FrameClock;
pub use config::ServiceConfig;
pub use error::ServiceError;
pub use queue::{event_queue, QueueReceiver, QueueSender};
pub use service::{DirtyNotifier, PhysicsService, THREAD_NAME};
pub use update::{PhysicsUpdateFn, PhysicsUpdates, UpdateKey};
