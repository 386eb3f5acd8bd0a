//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (slotmap keys, sorted contact pairs)
//! - Joints change only between physics steps

pub mod attachment;
pub mod dispatch;
pub mod filter;
pub mod ground;
pub mod gum;
pub mod obstacle;
pub mod state;
pub mod sync;
pub mod tick;
pub mod world;

pub use attachment::{
    AttachmentLifecycleManager, AttachmentRequest, EnqueueOutcome, PendingAttachment,
    RealizedAttachment, WeldDescriptor,
};
pub use dispatch::{CollisionDispatcher, Route, classify};
pub use filter::{Category, CollisionFilter};
pub use gum::{GumProjectile, GumState};
pub use obstacle::{FixtureData, FixtureRole, Obstacle, ObstacleId, ObstacleKind, Obstacles};
pub use state::{GameEvent, Level, LevelPhase};
pub use sync::{JointSynchronizer, SyncReport};
pub use tick::{FireCommand, TickInput, tick};
pub use world::{BodyHandle, BodyType, JointHandle, PhysicsWorld};
