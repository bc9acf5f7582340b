//! Kinetica - threaded convex rigid-body physics
//!
//! The simulation lives in `kinetica_physics` and its threading layer in
//! `kinetica_runtime`; this crate adds file/env configuration and a headless
//! demo scene.

pub mod config;
pub mod demo;

pub use kinetica_physics as physics;
pub use kinetica_runtime as runtime;
