//! Runs the headless demo end to end on a short clock

use kinetica::config::AppConfig;
use kinetica::demo;

#[test]
fn test_demo_settles_bodies() {
    let mut config = AppConfig::default();
    config.physics.tick_rate = 240;
    config.demo.duration = 2.0;
    config.demo.body_count = 3;
    config.demo.drop_height = 2.0;

    let report = demo::run(&config).unwrap();
    assert_eq!(report.bodies, 3);
    assert!(report.ticks > 0);
    assert!(report.trigger_entries >= 1);
    // nothing fell through the ground slab (top face at y = 0.5)
    assert!(report.lowest_y > 0.5);
    let distance = report.ground_distance.unwrap();
    assert!((distance - 49.5).abs() < 1e-3);
}
