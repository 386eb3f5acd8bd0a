//! Simulation tuning
//!
//! Loaded from JSON so levels can be replayed with different feel, validated
//! before a `Level` is built.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::SettingsError;

/// Tunable simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === World ===
    /// World gravity
    pub gravity: Vec2,
    /// Solver iterations per physics step (welds and contacts)
    pub weld_iterations: u32,

    // === Gum ===
    pub gum_radius: f32,
    /// Default launch speed used by the demo and `FireCommand::toward`
    pub gum_speed: f32,
    /// 0 = gum flies straight, 1 = full gravity
    pub gum_gravity_scale: f32,
    /// Max random deviation of a shot (radians, 0 = none)
    pub gum_spread: f32,
    /// Ticks a gum may fly without touching anything
    pub max_flight_ticks: u32,

    // === Ammo ===
    pub starting_ammo: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, GRAVITY_Y),
            weld_iterations: WELD_ITERATIONS,

            gum_radius: GUM_RADIUS,
            gum_speed: GUM_SPEED,
            gum_gravity_scale: 0.0,
            gum_spread: 0.0,
            max_flight_ticks: MAX_FLIGHT_TICKS,

            starting_ammo: STARTING_AMMO,
        }
    }
}

impl Settings {
    /// Parse and validate settings from JSON (missing fields use defaults)
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        log::info!("Loaded settings (ammo {}, spread {})", settings.starting_ammo, settings.gum_spread);
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.gum_radius > 0.0) {
            return Err(SettingsError::Invalid {
                field: "gum_radius",
                reason: "must be positive",
            });
        }
        if !(self.gum_speed > 0.0) {
            return Err(SettingsError::Invalid {
                field: "gum_speed",
                reason: "must be positive",
            });
        }
        if self.weld_iterations == 0 {
            return Err(SettingsError::Invalid {
                field: "weld_iterations",
                reason: "must be at least 1",
            });
        }
        if self.gum_spread < 0.0 || !self.gum_spread.is_finite() {
            return Err(SettingsError::Invalid {
                field: "gum_spread",
                reason: "must be a finite, non-negative angle",
            });
        }
        Ok(())
    }
}
