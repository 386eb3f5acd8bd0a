//! Ground contact tracking
//!
//! A character is grounded while its foot sensor overlaps at least one solid
//! fixture. Only membership changes are reported.

use std::collections::{BTreeSet, HashMap};

use super::obstacle::ObstacleId;
use super::world::FixtureHandle;

#[derive(Debug, Default)]
pub struct GroundTracker {
    under_foot: HashMap<ObstacleId, BTreeSet<FixtureHandle>>,
}

impl GroundTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the character just became grounded
    pub fn touch(&mut self, character: ObstacleId, fixture: FixtureHandle) -> bool {
        let set = self.under_foot.entry(character).or_default();
        let was_empty = set.is_empty();
        set.insert(fixture);
        was_empty
    }

    /// Returns true if the character just left the ground
    pub fn release(&mut self, character: ObstacleId, fixture: FixtureHandle) -> bool {
        let Some(set) = self.under_foot.get_mut(&character) else {
            return false;
        };
        if !set.remove(&fixture) {
            return false;
        }
        if set.is_empty() {
            self.under_foot.remove(&character);
            return true;
        }
        false
    }

    pub fn is_grounded(&self, character: ObstacleId) -> bool {
        self.under_foot.get(&character).is_some_and(|s| !s.is_empty())
    }

    /// Drop a character that left the level
    pub fn forget(&mut self, character: ObstacleId) {
        self.under_foot.remove(&character);
    }

    pub fn clear(&mut self) {
        self.under_foot.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn ids() -> (ObstacleId, FixtureHandle, FixtureHandle) {
        (
            ObstacleId::from(KeyData::from_ffi(1)),
            FixtureHandle::from(KeyData::from_ffi(2)),
            FixtureHandle::from(KeyData::from_ffi(3)),
        )
    }

    #[test]
    fn test_grounded_while_any_fixture_underfoot() {
        let mut tracker = GroundTracker::new();
        let (player, floor, crate_top) = ids();
        assert!(!tracker.is_grounded(player));

        assert!(tracker.touch(player, floor));
        assert!(!tracker.touch(player, crate_top));
        assert!(!tracker.release(player, floor));
        assert!(tracker.is_grounded(player));
        assert!(tracker.release(player, crate_top));
        assert!(!tracker.is_grounded(player));
    }

    #[test]
    fn test_release_unknown_is_noop() {
        let mut tracker = GroundTracker::new();
        let (player, floor, _) = ids();
        assert!(!tracker.release(player, floor));
        tracker.touch(player, floor);
        tracker.forget(player);
        assert!(!tracker.is_grounded(player));
    }
}
