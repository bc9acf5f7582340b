//! The physics service: a dedicated simulation thread and its public API
//!
//! The owning thread talks to the simulation only through queues. Volumes,
//! rigid bodies and the world belong to the simulation thread once
//! registered; the owning thread keeps a [`PoseInterpolator`] per body to
//! read smoothed poses back.
//!
//! Per tick, the simulation thread:
//! 1. ticks the frame clock
//! 2. applies queued insertions, then deletions, then dirty transforms
//! 3. runs the per-tick updates
//! 4. steps the world
//! 5. answers ray queries
//! 6. forwards trigger events

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use glam::Mat4;
use kinetica_physics::{
    ObjectId, PhysicsWorld, PoseInterpolator, QueryRay, Ray, RaycastInfo, RigidBody, TriggerEvent, Volume,
};

use crate::clock::FrameClock;
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::queue::{event_queue, QueueReceiver, QueueSender};
use crate::update::{PhysicsUpdates, UpdateKey};

/// Name of the simulation thread
pub const THREAD_NAME: &str = "kinetica-physics";

type TriggerListener = Box<dyn FnMut(TriggerEvent) + Send + 'static>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Receiving halves of the service queues; owned by the simulation thread while it runs
struct Inbox {
    inserts: QueueReceiver<Volume>,
    deletes: QueueReceiver<ObjectId>,
    dirty: QueueReceiver<(ObjectId, Mat4)>,
    rays: QueueReceiver<QueryRay>,
}

impl Inbox {
    /// Drop everything still queued; returns how many items were dropped
    fn discard(&self) -> usize {
        self.inserts.drain().len() + self.deletes.drain().len() + self.dirty.drain().len() + self.rays.drain().len()
    }
}

/// Forwards dirtied world transforms from the transform layer
///
/// Cheap to clone; objects that never registered a volume are ignored.
#[derive(Clone)]
pub struct DirtyNotifier {
    registered: Arc<Mutex<HashSet<ObjectId>>>,
    dirty: QueueSender<(ObjectId, Mat4)>,
}

impl DirtyNotifier {
    /// Queue a pose update for `owner`; returns false when it has no volume
    pub fn notify(&self, owner: ObjectId, world: &Mat4) -> bool {
        let registered = lock(&self.registered);
        if !registered.contains(&owner) {
            return false;
        }
        // pushed under the lock so halt() cannot miss it
        self.dirty.push((owner, *world));
        true
    }
}

/// Owner of the simulation thread
///
/// Construct one explicitly and pass it to whatever needs physics.
pub struct PhysicsService {
    config: ServiceConfig,
    inserts: QueueSender<Volume>,
    deletes: QueueSender<ObjectId>,
    notifier: DirtyNotifier,
    rays: QueueSender<QueryRay>,
    /// Present while the thread is stopped
    inbox: Option<Inbox>,
    updates: Arc<Mutex<PhysicsUpdates>>,
    trigger_listener: Arc<Mutex<Option<TriggerListener>>>,
    exit: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    thread: Option<JoinHandle<Simulation>>,
}

impl PhysicsService {
    pub fn new(config: ServiceConfig) -> Self {
        let (inserts, insert_rx) = event_queue();
        let (deletes, delete_rx) = event_queue();
        let (dirty, dirty_rx) = event_queue();
        let (rays, ray_rx) = event_queue();
        Self {
            config,
            inserts,
            deletes,
            notifier: DirtyNotifier {
                registered: Arc::new(Mutex::new(HashSet::new())),
                dirty,
            },
            rays,
            inbox: Some(Inbox {
                inserts: insert_rx,
                deletes: delete_rx,
                dirty: dirty_rx,
                rays: ray_rx,
            }),
            updates: Arc::new(Mutex::new(PhysicsUpdates::new())),
            trigger_listener: Arc::new(Mutex::new(None)),
            exit: Arc::new(AtomicBool::new(false)),
            ticks: Arc::new(AtomicU64::new(0)),
            thread: None,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Ticks completed since the service was created
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Spawn the simulation thread with a fresh world
    pub fn initialize(&mut self) -> Result<(), ServiceError> {
        if self.thread.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }
        let Some(inbox) = self.inbox.take() else {
            return Err(ServiceError::AlreadyRunning);
        };

        self.exit.store(false, Ordering::Release);
        let simulation = Simulation {
            world: PhysicsWorld::with_config(self.config.physics.clone()),
            inbox,
            updates: Arc::clone(&self.updates),
            trigger_listener: Arc::clone(&self.trigger_listener),
            exit: Arc::clone(&self.exit),
            ticks: Arc::clone(&self.ticks),
        };
        let clock = FrameClock::new(self.config.tick_rate, self.config.max_delta);

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || simulation.run(clock));
        match handle {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                log::warn!("could not start {THREAD_NAME}: {e}");
                Err(ServiceError::Spawn(e))
            }
        }
    }

    /// Stop the simulation thread and return its world
    ///
    /// Blocks until the thread finishes its current tick. Everything queued
    /// before the call is applied to the returned world; the identity set and
    /// the queues start empty for the next [`initialize`](Self::initialize).
    pub fn halt(&mut self) -> Result<PhysicsWorld, ServiceError> {
        let handle = self.thread.take().ok_or(ServiceError::NotRunning)?;
        self.exit.store(true, Ordering::Release);
        let simulation = handle.join().map_err(|_| ServiceError::ThreadPanicked)?;

        lock(&self.notifier.registered).clear();
        // dirty poses a cloned notifier pushed after the final flush
        let dropped = simulation.inbox.discard();
        if dropped > 0 {
            log::debug!("dropped {dropped} events queued while halting");
        }
        self.inbox = Some(simulation.inbox);
        Ok(simulation.world)
    }

    /// Hand a volume to the simulation
    ///
    /// The volume takes its pose from `world` before it is queued. Returns the
    /// interpolation handle when the volume carries a rigid body.
    pub fn register_volume(&self, mut volume: Volume, world: &Mat4) -> Option<PoseInterpolator> {
        let owner = volume.owner();
        let mut registered = lock(&self.notifier.registered);
        let newly_registered = registered.insert(owner);
        debug_assert!(newly_registered, "{owner} registered twice");
        if !newly_registered {
            log::warn!("ignoring second registration of {owner}");
            return None;
        }

        volume.register(world);
        let interpolator = volume.rigid_body().map(RigidBody::interpolator);
        // pushed under the lock so no dirty pose can be queued ahead of it
        self.inserts.push(volume);
        interpolator
    }

    /// Remove `owner`'s volume from the simulation
    pub fn deregister_volume(&self, owner: ObjectId) -> bool {
        let mut registered = lock(&self.notifier.registered);
        if !registered.remove(&owner) {
            log::warn!("deregistering {owner}, which has no volume");
            return false;
        }
        self.deletes.push(owner);
        true
    }

    /// Queue a new world transform for `owner`'s volume
    pub fn mark_object_as_dirty(&self, owner: ObjectId, world: &Mat4) -> bool {
        self.notifier.notify(owner, world)
    }

    /// Handle for the transform layer's dirty-transform callback
    pub fn dirty_notifier(&self) -> DirtyNotifier {
        self.notifier.clone()
    }

    pub fn is_registered(&self, owner: ObjectId) -> bool {
        lock(&self.notifier.registered).contains(&owner)
    }

    pub fn registered_count(&self) -> usize {
        lock(&self.notifier.registered).len()
    }

    /// Queue a ray cast
    ///
    /// `callback` runs on the simulation thread during a later tick with every
    /// hit, nearest first. It must not block.
    pub fn cast_ray<F>(&self, ray: Ray, callback: F)
    where
        F: FnOnce(&[RaycastInfo]) + Send + 'static,
    {
        self.rays.push(QueryRay::new(ray, callback));
    }

    /// Run `callback` on the simulation thread every tick, before the world steps
    pub fn create_physics_update<F>(&self, callback: F) -> UpdateKey
    where
        F: FnMut(&mut PhysicsWorld, f32) + Send + 'static,
    {
        lock(&self.updates).insert(Box::new(callback))
    }

    pub fn destroy_physics_update(&self, key: UpdateKey) -> bool {
        lock(&self.updates).remove(key)
    }

    /// Receive trigger enter/exit events on the simulation thread
    ///
    /// Replaces any previous listener.
    pub fn on_trigger<F>(&self, listener: F)
    where
        F: FnMut(TriggerEvent) + Send + 'static,
    {
        *lock(&self.trigger_listener) = Some(Box::new(listener));
    }
}

impl Drop for PhysicsService {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.halt() {
                log::warn!("physics service stopped with an error: {e}");
            }
        }
    }
}

/// State owned by the simulation thread
struct Simulation {
    world: PhysicsWorld,
    inbox: Inbox,
    updates: Arc<Mutex<PhysicsUpdates>>,
    trigger_listener: Arc<Mutex<Option<TriggerListener>>>,
    exit: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
}

impl Simulation {
    fn run(mut self, mut clock: FrameClock) -> Self {
        log::info!(
            "{THREAD_NAME} started ({} Hz)",
            clock.interval().map_or(0.0, |i| 1.0 / i.as_secs_f64())
        );
        let mut ticks = 0u64;
        while !self.exit.load(Ordering::Acquire) {
            let dt = clock.tick();
            self.tick(dt);
            ticks += 1;
        }
        self.flush();
        log::info!("{THREAD_NAME} stopped after {ticks} ticks");
        self
    }

    /// Apply whatever was queued after the last tick without stepping
    fn flush(&mut self) {
        self.apply_queued();
        for query in self.inbox.rays.drain() {
            self.world.cast_ray(query);
        }
    }

    fn apply_queued(&mut self) {
        // Drained in reverse so any captured delete or dirty pose also has its
        // insert captured. Applied in the usual order below.
        let dirty = self.inbox.dirty.drain();
        let deletes = self.inbox.deletes.drain();
        let inserts = self.inbox.inserts.drain();
        if !(inserts.is_empty() && deletes.is_empty() && dirty.is_empty()) {
            log::debug!(
                "draining {} inserts, {} deletes, {} dirty poses",
                inserts.len(),
                deletes.len(),
                dirty.len()
            );
        }

        for volume in inserts {
            self.world.add_volume(volume);
        }
        for owner in deletes {
            if self.world.remove_volume(owner).is_none() {
                log::warn!("deregistered {owner} was never added to the world");
            }
        }
        for (owner, matrix) in dirty {
            // dirty poses for volumes deleted this tick are dropped
            self.world.update_transform(owner, &matrix);
        }
    }

    fn tick(&mut self, dt: f32) {
        self.apply_queued();

        lock(&self.updates).run(&mut self.world, dt);

        let report = self.world.step(dt);

        for query in self.inbox.rays.drain() {
            self.world.cast_ray(query);
        }

        if !report.trigger_events.is_empty() {
            if let Some(listener) = lock(&self.trigger_listener).as_mut() {
                for event in report.trigger_events {
                    listener(event);
                }
            }
        }

        self.ticks.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use kinetica_physics::Shape;

    fn stopped_service() -> PhysicsService {
        PhysicsService::new(ServiceConfig::default().with_tick_rate(0))
    }

    #[test]
    fn test_registration_bookkeeping() {
        let service = stopped_service();
        let body = Volume::new(ObjectId(1), Shape::sphere(0.5)).with_rigid_body(RigidBody::new());
        let interpolator = service.register_volume(body, &Mat4::from_translation(Vec3::Y));
        assert!(interpolator.is_some());
        assert_eq!(interpolator.unwrap().committed().position, Vec3::Y);

        let wall = Volume::new(ObjectId(2), Shape::cuboid(Vec3::ONE));
        assert!(service.register_volume(wall, &Mat4::IDENTITY).is_none());
        assert_eq!(service.registered_count(), 2);

        assert!(service.mark_object_as_dirty(ObjectId(2), &Mat4::IDENTITY));
        assert!(!service.mark_object_as_dirty(ObjectId(3), &Mat4::IDENTITY));
        assert!(service.deregister_volume(ObjectId(2)));
        assert!(!service.deregister_volume(ObjectId(2)));
        assert!(!service.dirty_notifier().notify(ObjectId(2), &Mat4::IDENTITY));
        assert!(service.is_registered(ObjectId(1)));
    }

    #[test]
    fn test_simulation_tick_order() {
        let service = stopped_service();
        let mut simulation = Simulation {
            world: PhysicsWorld::new(),
            inbox: Inbox {
                inserts: {
                    let (tx, rx) = event_queue();
                    let mut volume = Volume::new(ObjectId(1), Shape::sphere(0.5));
                    volume.register(&Mat4::IDENTITY);
                    tx.push(volume);
                    rx
                },
                deletes: event_queue().1,
                dirty: {
                    let (tx, rx) = event_queue();
                    tx.push((ObjectId(1), Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0))));
                    rx
                },
                rays: event_queue().1,
            },
            updates: Arc::clone(&service.updates),
            trigger_listener: Arc::clone(&service.trigger_listener),
            exit: Arc::clone(&service.exit),
            ticks: Arc::clone(&service.ticks),
        };

        simulation.tick(0.01);

        // inserted, then moved by the dirty pose in the same tick
        let volume = simulation.world.volume(ObjectId(1)).unwrap();
        assert_eq!(volume.position(), Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(service.tick_count(), 1);
    }
}
