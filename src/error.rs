//! Error types
//!
//! None of these are fatal to a tick: world and contact errors degrade to
//! "drop the request" at the call site.

use thiserror::Error;

use crate::sim::obstacle::ObstacleId;
use crate::sim::world::{BodyHandle, FixtureHandle, JointHandle};

/// Failures reported by the physics world
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("unknown body {0:?}")]
    UnknownBody(BodyHandle),
    #[error("unknown fixture {0:?}")]
    UnknownFixture(FixtureHandle),
    #[error("unknown joint {0:?}")]
    UnknownJoint(JointHandle),
    #[error("cannot weld body {0:?} to itself")]
    SelfJoint(BodyHandle),
}

/// A contact that could not be classified
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContactError {
    #[error("fixture {0:?} carries no user data")]
    MissingUserData(FixtureHandle),
    #[error("fixture {fixture:?} points at unknown obstacle {owner:?}")]
    UnknownObstacle {
        fixture: FixtureHandle,
        owner: ObstacleId,
    },
    #[error("obstacle {0:?} has category {1} but a different kind")]
    KindMismatch(ObstacleId, &'static str),
}

/// Why a gum could not be fired
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FireError {
    #[error("no gum ammo left")]
    OutOfAmmo,
    #[error("fire direction has zero length")]
    ZeroDirection,
    #[error("level is not in play")]
    LevelNotPlaying,
    #[error(transparent)]
    World(#[from] WorldError),
}

/// Settings could not be loaded or failed validation
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
