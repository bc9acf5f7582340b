//! Application configuration
//!
//! Configuration is loaded from multiple sources with the following priority (lowest to highest):
//! 1. `config/default.toml` (version controlled)
//! 2. `config/user.toml` (gitignored, user overrides)
//! 3. Environment variables (`KIN_SECTION__KEY`)

use figment::{Figment, providers::{Format, Toml, Env}};
use glam::Vec3;
use kinetica_physics::PhysicsConfig as WorldConfig;
use kinetica_runtime::ServiceConfig;
use serde::{Serialize, Deserialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Physics thread and solver configuration
    #[serde(default)]
    pub physics: PhysicsConfig,
    /// Demo scene configuration
    #[serde(default)]
    pub demo: DemoConfig,
    /// Debug configuration
    #[serde(default)]
    pub debug: DebugConfig,
}

impl AppConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific config directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let default_path = config_dir.join("default.toml");
        let user_path = config_dir.join("user.toml");

        let mut figment = Figment::new();

        if default_path.exists() {
            figment = figment.merge(Toml::file(&default_path));
        }

        if user_path.exists() {
            figment = figment.merge(Toml::file(&user_path));
        }

        // KIN_PHYSICS__TICK_RATE=30 -> physics.tick_rate = 30
        figment = figment.merge(Env::prefixed("KIN_").split("__"));

        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.physics.max_delta <= 0.0 {
            return Err(ConfigError::invalid("physics.max_delta must be positive"));
        }
        if self.physics.gravity.iter().any(|g| !g.is_finite()) {
            return Err(ConfigError::invalid("physics.gravity must be finite"));
        }
        if !self.demo.duration.is_finite() || self.demo.duration < 0.0 {
            return Err(ConfigError::invalid("demo.duration must be finite and not negative"));
        }
        Ok(())
    }
}

/// Physics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Simulation ticks per second (0 = unthrottled)
    pub tick_rate: u32,
    /// Largest delta a single tick may simulate, in seconds
    pub max_delta: f32,
    /// Gravity acceleration [x, y, z]
    pub gravity: [f32; 3],
    pub idle_iterations: usize,
    pub motion_iterations: usize,
    pub settle_iterations: usize,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        let world = WorldConfig::default();
        let service = ServiceConfig::default();
        Self {
            tick_rate: service.tick_rate,
            max_delta: service.max_delta,
            gravity: world.gravity.to_array(),
            idle_iterations: world.idle_iterations,
            motion_iterations: world.motion_iterations,
            settle_iterations: world.settle_iterations,
        }
    }
}

impl PhysicsConfig {
    /// Convert to the world's solver configuration
    pub fn to_physics_config(&self) -> WorldConfig {
        WorldConfig {
            gravity: Vec3::from_array(self.gravity),
            idle_iterations: self.idle_iterations,
            motion_iterations: self.motion_iterations,
            settle_iterations: self.settle_iterations,
        }
    }

    /// Convert to the physics service configuration
    pub fn to_service_config(&self) -> ServiceConfig {
        ServiceConfig {
            tick_rate: self.tick_rate,
            max_delta: self.max_delta,
            physics: self.to_physics_config(),
        }
    }
}

/// Demo scene configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Wall-clock seconds to run before halting
    pub duration: f32,
    /// Number of dynamic bodies dropped onto the ground
    pub body_count: u32,
    /// Height of the lowest dropped body
    pub drop_height: f32,
    /// Sideways velocity change per tick inside the wind zone
    pub wind: f32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            duration: 3.0,
            body_count: 6,
            drop_height: 4.0,
            wind: 0.05,
        }
    }
}

/// Debug configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Configuration error
#[derive(Debug)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn invalid(message: &str) -> Self {
        ConfigError {
            message: message.to_string(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError {
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}
