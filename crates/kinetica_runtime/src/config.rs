//! Service configuration

use kinetica_physics::PhysicsConfig;
use serde::{Deserialize, Serialize};

/// Settings fixed when the simulation thread starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Target ticks per second (0 = run as fast as possible)
    pub tick_rate: u32,
    /// Longest tick delta in seconds; longer stalls are clamped
    pub max_delta: f32,
    /// Solver and gravity settings for the world
    pub physics: PhysicsConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            max_delta: 0.25,
            physics: PhysicsConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn with_tick_rate(mut self, tick_rate: u32) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    pub fn with_physics(mut self, physics: PhysicsConfig) -> Self {
        self.physics = physics;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.max_delta, 0.25);
        assert_eq!(config.physics.idle_iterations, 8);
    }

    #[test]
    fn test_builder() {
        let config = ServiceConfig::default()
            .with_tick_rate(0)
            .with_physics(PhysicsConfig::new(glam::Vec3::ZERO));
        assert_eq!(config.tick_rate, 0);
        assert_eq!(config.physics.gravity, glam::Vec3::ZERO);
    }
}
