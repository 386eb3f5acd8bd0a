//! Gum projectiles
//!
//! A gum flies until it touches something, then welds itself in place. It can
//! hold at most `MAX_STUCK` joints. Slots are reserved when an attachment is
//! queued and confirmed when the joint is realized, so simultaneous contacts
//! in one step can never oversubscribe a gum.

use glam::Vec2;

use super::filter::CollisionFilter;
use crate::consts::MAX_STUCK;

/// Where a gum is in its attachment lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GumState {
    /// Fired, not yet touching anything
    FreeFlight,
    /// Waiting for joints; the count includes realized ones
    Pending(u8),
    /// All requested joints realized
    Attached(u8),
    /// Unstuck or expired, waiting to be swept
    Removed,
}

/// A sticky projectile
#[derive(Debug, Clone)]
pub struct GumProjectile {
    /// Mirrored from the physics body each tick
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    alive: bool,
    /// Realized joints
    stuck_count: u8,
    /// Requests waiting in the pending-assembly queue
    reserved: u8,
    filter: CollisionFilter,
    narrowed: bool,
    flight_ticks: u32,
}

impl GumProjectile {
    pub fn new(position: Vec2, velocity: Vec2, radius: f32) -> Self {
        Self {
            position,
            velocity,
            radius,
            alive: true,
            stuck_count: 0,
            reserved: 0,
            filter: CollisionFilter::gum_free(),
            narrowed: false,
            flight_ticks: 0,
        }
    }

    pub fn alive(&self) -> bool {
        self.alive
    }

    pub fn stuck_count(&self) -> u8 {
        self.stuck_count
    }

    pub fn reserved(&self) -> u8 {
        self.reserved
    }

    pub fn filter(&self) -> CollisionFilter {
        self.filter
    }

    pub fn flight_ticks(&self) -> u32 {
        self.flight_ticks
    }

    pub fn state(&self) -> GumState {
        if !self.alive {
            return GumState::Removed;
        }
        match (self.stuck_count, self.reserved) {
            (0, 0) => GumState::FreeFlight,
            (stuck, 0) => GumState::Attached(stuck),
            (stuck, reserved) => GumState::Pending(stuck + reserved),
        }
    }

    /// Never touched anything
    pub fn in_free_flight(&self) -> bool {
        self.state() == GumState::FreeFlight
    }

    /// Room for another attachment request
    pub fn has_free_slot(&self) -> bool {
        self.stuck_count + self.reserved < MAX_STUCK
    }

    /// Claim a slot for a queued request; false when saturated or dead
    pub(crate) fn reserve_slot(&mut self) -> bool {
        if !self.alive || !self.has_free_slot() {
            return false;
        }
        self.reserved += 1;
        true
    }

    /// Give back a slot whose request was dropped
    pub(crate) fn release_slot(&mut self) {
        self.reserved = self.reserved.saturating_sub(1);
    }

    /// Turn a reserved slot into a realized joint, returning the new count
    pub(crate) fn confirm_slot(&mut self) -> u8 {
        self.reserved = self.reserved.saturating_sub(1);
        self.stuck_count = (self.stuck_count + 1).min(MAX_STUCK);
        self.stuck_count
    }

    /// A realized joint was destroyed
    pub(crate) fn detach_one(&mut self) {
        self.stuck_count = self.stuck_count.saturating_sub(1);
    }

    /// Switch to the limited mask. Returns true only the first time.
    pub(crate) fn narrow_filter(&mut self) -> bool {
        if self.narrowed {
            return false;
        }
        self.narrowed = true;
        self.filter = CollisionFilter::gum_limited();
        true
    }

    /// Stop moving the instant it first touches anything
    pub(crate) fn freeze(&mut self) {
        self.velocity = Vec2::ZERO;
    }

    pub(crate) fn kill(&mut self) {
        self.alive = false;
    }

    pub(crate) fn advance_flight(&mut self) -> u32 {
        self.flight_ticks += 1;
        self.flight_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_progression() {
        let mut gum = GumProjectile::new(Vec2::ZERO, Vec2::X, 0.25);
        assert_eq!(gum.state(), GumState::FreeFlight);

        assert!(gum.reserve_slot());
        assert_eq!(gum.state(), GumState::Pending(1));
        assert_eq!(gum.confirm_slot(), 1);
        assert_eq!(gum.state(), GumState::Attached(1));

        assert!(gum.reserve_slot());
        assert_eq!(gum.state(), GumState::Pending(2));
        assert_eq!(gum.confirm_slot(), 2);
        assert_eq!(gum.state(), GumState::Attached(2));

        gum.kill();
        assert_eq!(gum.state(), GumState::Removed);
    }

    #[test]
    fn test_slots_are_bounded() {
        let mut gum = GumProjectile::new(Vec2::ZERO, Vec2::X, 0.25);
        assert!(gum.reserve_slot());
        assert!(gum.reserve_slot());
        assert!(!gum.reserve_slot());
        assert_eq!(gum.reserved(), 2);

        gum.release_slot();
        assert!(gum.has_free_slot());
    }

    #[test]
    fn test_dead_gum_reserves_nothing() {
        let mut gum = GumProjectile::new(Vec2::ZERO, Vec2::X, 0.25);
        gum.kill();
        assert!(!gum.reserve_slot());
        assert_eq!(gum.reserved(), 0);
    }

    #[test]
    fn test_filter_narrows_once() {
        let mut gum = GumProjectile::new(Vec2::ZERO, Vec2::X, 0.25);
        assert_eq!(gum.filter(), CollisionFilter::gum_free());
        assert!(gum.narrow_filter());
        assert!(!gum.narrow_filter());
        assert_eq!(gum.filter(), CollisionFilter::gum_limited());
    }
}
