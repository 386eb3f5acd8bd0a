//! Gumweld - sticky projectiles welded into a stepped physics world
//!
//! Core modules:
//! - `sim`: Deterministic simulation (physics world, contact dispatch, attachment lifecycle)
//! - `settings`: Data-driven tuning
//! - `error`: Error types shared by the simulation

pub mod error;
pub mod settings;
pub mod sim;

pub use error::{ContactError, FireError, SettingsError, WorldError};
pub use settings::Settings;

use glam::Vec2;

/// Simulation configuration constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// A gum can hold at most this many weld joints
    pub const MAX_STUCK: u8 = 2;

    /// Gum defaults
    pub const GUM_RADIUS: f32 = 0.25;
    pub const GUM_SPEED: f32 = 12.0;
    pub const GUM_DENSITY: f32 = 0.5;
    pub const STARTING_AMMO: u32 = 4;
    /// Free-flight lifetime before a stray gum is retired (5 seconds)
    pub const MAX_FLIGHT_TICKS: u32 = 5 * 60;

    /// Solver iterations per physics step
    pub const WELD_ITERATIONS: u32 = 4;

    /// Default world gravity (y up)
    pub const GRAVITY_Y: f32 = -9.8;
}

/// Rotate a vector by an angle in radians
#[inline]
pub fn rotate(v: Vec2, angle: f32) -> Vec2 {
    Vec2::from_angle(angle).rotate(v)
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}
