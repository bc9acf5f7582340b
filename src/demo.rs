//! Headless demo scene
//!
//! Drops a row of mixed bodies onto a ground slab through a wind zone and a
//! trigger, samples their interpolated poses from the owning thread, then
//! halts the service and reports what happened.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use glam::{Mat4, Quat, Vec3};
use kinetica_physics::{
    CollisionMode, ForceField, ObjectId, Pose, PoseInterpolator, Ray, RigidBody, Shape, TriggerEventKind, Volume,
};
use kinetica_runtime::{PhysicsService, ServiceError};

use crate::config::AppConfig;

const GROUND: ObjectId = ObjectId(1);
const WIND_ZONE: ObjectId = ObjectId(2);
const FINISH_ZONE: ObjectId = ObjectId(3);
const FIRST_BODY: u64 = 100;

/// How often the owning thread samples interpolated poses
const FRAME: Duration = Duration::from_millis(16);

/// Summary of a demo run
#[derive(Debug, Clone, Default)]
pub struct DemoReport {
    pub ticks: u64,
    pub bodies: usize,
    /// Bodies standing on something when the service halted
    pub grounded: usize,
    /// Lowest committed body height seen at halt
    pub lowest_y: f32,
    pub trigger_entries: usize,
    /// Distance reported by the downward ray query, if it hit anything
    pub ground_distance: Option<f32>,
}

fn body_shape(index: u32) -> Shape {
    match index % 3 {
        0 => Shape::sphere(0.4),
        1 => Shape::cuboid(Vec3::splat(0.35)),
        _ => Shape::capsule(0.25, 0.3),
    }
}

/// Build the scene, run it for `config.demo.duration` seconds and halt
pub fn run(config: &AppConfig) -> Result<DemoReport, ServiceError> {
    let mut service = PhysicsService::new(config.physics.to_service_config());

    let entries = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&entries);
    service.on_trigger(move |event| {
        if event.kind == TriggerEventKind::Enter {
            log::debug!("{} entered {}", event.other, event.trigger);
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    service.initialize()?;

    let ground = Volume::new(GROUND, Shape::cuboid(Vec3::new(20.0, 0.5, 20.0)));
    service.register_volume(ground, &Mat4::IDENTITY);

    let wind = Volume::new(WIND_ZONE, Shape::cuboid(Vec3::new(4.0, 1.0, 4.0)))
        .with_mode(CollisionMode::None)
        .with_ray_test(false)
        .with_force_field(ForceField::Directional {
            force: Vec3::new(config.demo.wind, 0.0, 0.0),
        });
    service.register_volume(wind, &Mat4::from_translation(Vec3::new(0.0, 2.5, 0.0)));

    let finish = Volume::new(FINISH_ZONE, Shape::cuboid(Vec3::new(20.0, 0.3, 20.0)))
        .with_mode(CollisionMode::Trigger)
        .with_ray_test(false);
    service.register_volume(finish, &Mat4::from_translation(Vec3::new(0.0, 0.8, 0.0)));

    let mut interpolators: Vec<(ObjectId, PoseInterpolator)> = Vec::new();
    for i in 0..config.demo.body_count {
        let owner = ObjectId(FIRST_BODY + u64::from(i));
        let x = (i as f32 - config.demo.body_count as f32 * 0.5) * 1.5;
        let height = config.demo.drop_height + (i % 3) as f32;
        let transform = Mat4::from_rotation_translation(
            Quat::from_rotation_z(0.3 * i as f32),
            Vec3::new(x, height, 0.0),
        );
        let body = RigidBody::new()
            .with_mass(1.0 + i as f32 * 0.5)
            .with_angular_velocity(Vec3::new(0.0, 0.5, 0.0));
        let volume = Volume::new(owner, body_shape(i)).with_rigid_body(body);
        if let Some(interpolator) = service.register_volume(volume, &transform) {
            interpolators.push((owner, interpolator));
        }
    }
    log::info!("demo scene registered with {} bodies", interpolators.len());

    let (ray_tx, ray_rx) = mpsc::channel();
    service.cast_ray(
        Ray::new(Vec3::new(15.0, 50.0, 0.0), Vec3::NEG_Y, 100.0),
        move |hits| {
            let _ = ray_tx.send(hits.first().map(|hit| hit.distance));
        },
    );

    let duration = Duration::from_secs_f32(config.demo.duration);
    let start = Instant::now();
    let mut last_frame = start;
    let mut visual = vec![Pose::IDENTITY; interpolators.len()];
    while start.elapsed() < duration {
        thread::sleep(FRAME);
        let now = Instant::now();
        let render_dt = (now - last_frame).as_secs_f32();
        last_frame = now;
        for ((_, interpolator), pose) in interpolators.iter().zip(visual.iter_mut()) {
            interpolator.update_transform(render_dt, pose);
        }
        if let Some((owner, _)) = interpolators.first() {
            log::trace!("{owner} drawn at {:?}", visual[0].position);
        }
    }

    let ground_distance = ray_rx.recv_timeout(Duration::from_secs(1)).ok().flatten();
    let ticks = service.tick_count();
    let world = service.halt()?;

    let mut report = DemoReport {
        ticks,
        bodies: interpolators.len(),
        lowest_y: f32::INFINITY,
        trigger_entries: entries.load(Ordering::Relaxed),
        ground_distance,
        ..Default::default()
    };
    for (owner, interpolator) in &interpolators {
        if world.rigid_body(*owner).is_some_and(RigidBody::on_ground) {
            report.grounded += 1;
        }
        report.lowest_y = report.lowest_y.min(interpolator.committed().position.y);
    }

    log::info!(
        "demo finished after {} ticks: {}/{} bodies grounded, {} trigger entries",
        report.ticks,
        report.grounded,
        report.bodies,
        report.trigger_entries
    );
    Ok(report)
}
