//! Per-tick callbacks run on the simulation thread

use kinetica_physics::PhysicsWorld;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle for a registered per-tick update
    pub struct UpdateKey;
}

/// Callback run once per tick before the world steps
pub type PhysicsUpdateFn = Box<dyn FnMut(&mut PhysicsWorld, f32) + Send + 'static>;

/// Batch of per-tick updates stored in one slotmap
#[derive(Default)]
pub struct PhysicsUpdates {
    callbacks: SlotMap<UpdateKey, PhysicsUpdateFn>,
}

impl PhysicsUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, callback: PhysicsUpdateFn) -> UpdateKey {
        self.callbacks.insert(callback)
    }

    /// Remove an update; stale keys return false
    pub fn remove(&mut self, key: UpdateKey) -> bool {
        self.callbacks.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Run every update with the tick's world and delta
    pub fn run(&mut self, world: &mut PhysicsWorld, dt: f32) {
        for (_, callback) in self.callbacks.iter_mut() {
            callback(world, dt);
        }
    }
}

impl std::fmt::Debug for PhysicsUpdates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsUpdates").field("len", &self.callbacks.len()).finish()
    }
}
