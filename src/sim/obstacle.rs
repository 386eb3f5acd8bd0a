//! Obstacles: every game object that owns a physics body
//!
//! The kind of an obstacle is fixed at construction and carried as a closed
//! enum, so contact dispatch never compares names.

use slotmap::{SlotMap, new_key_type};

use super::filter::{Category, CollisionFilter};
use super::gum::GumProjectile;
use super::world::BodyHandle;

new_key_type! {
    pub struct ObstacleId;
}

/// What a fixture is for on its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureRole {
    /// The solid shape of the obstacle
    Body,
    /// Sensor under a character's feet
    FootSensor,
}

/// User data attached to every fixture the level creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixtureData {
    pub owner: ObstacleId,
    pub role: FixtureRole,
}

/// Obstacle kinds
#[derive(Debug, Clone)]
pub enum ObstacleKind {
    Player,
    Enemy,
    Terrain,
    /// Doors, crushers and other moving level pieces
    Door,
    /// Reaching this wins the level
    Goal,
    Pickup {
        ammo: u32,
    },
    /// Enemy shot
    Projectile,
    Gum(GumProjectile),
}

impl ObstacleKind {
    pub fn category(&self) -> Category {
        match self {
            ObstacleKind::Player => Category::PLAYER,
            ObstacleKind::Enemy => Category::ENEMY,
            ObstacleKind::Terrain => Category::TERRAIN,
            ObstacleKind::Door => Category::DOOR,
            ObstacleKind::Goal => Category::GOAL,
            ObstacleKind::Pickup { .. } => Category::PICKUP,
            ObstacleKind::Projectile => Category::PROJECTILE,
            ObstacleKind::Gum(_) => Category::GUM,
        }
    }

    /// Filter given to fixtures when the obstacle is built
    pub fn default_filter(&self) -> CollisionFilter {
        match self {
            ObstacleKind::Gum(_) => CollisionFilter::gum_free(),
            ObstacleKind::Goal | ObstacleKind::Pickup { .. } => {
                CollisionFilter::new(self.category(), Category::PLAYER)
            }
            ObstacleKind::Projectile => CollisionFilter::new(
                Category::PROJECTILE,
                Category::all()
                    - Category::ENEMY
                    - Category::PROJECTILE
                    - Category::GOAL
                    - Category::PICKUP,
            ),
            _ => CollisionFilter::solid(self.category()),
        }
    }

    /// Whether a gum may weld itself to this kind (shots are too short-lived)
    pub fn is_gummable(&self) -> bool {
        !matches!(self, ObstacleKind::Gum(_) | ObstacleKind::Projectile)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObstacleKind::Player => "player",
            ObstacleKind::Enemy => "enemy",
            ObstacleKind::Terrain => "terrain",
            ObstacleKind::Door => "door",
            ObstacleKind::Goal => "goal",
            ObstacleKind::Pickup { .. } => "pickup",
            ObstacleKind::Projectile => "projectile",
            ObstacleKind::Gum(_) => "gum",
        }
    }
}

/// A game object backed by one physics body
#[derive(Debug, Clone)]
pub struct Obstacle {
    pub kind: ObstacleKind,
    pub body: BodyHandle,
    /// Opaque tag for renderers (texture/animation key)
    pub tag: String,
    removed: bool,
    /// Gums currently welded to this obstacle
    gum_count: u32,
}

impl Obstacle {
    pub fn new(kind: ObstacleKind, body: BodyHandle, tag: impl Into<String>) -> Self {
        Self {
            kind,
            body,
            tag: tag.into(),
            removed: false,
            gum_count: 0,
        }
    }

    /// True while at least one gum is welded here
    pub fn gummed(&self) -> bool {
        self.gum_count > 0
    }

    pub fn gum_count(&self) -> u32 {
        self.gum_count
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Flag for the garbage-collection pass
    pub fn mark_removed(&mut self) {
        self.removed = true;
    }

    pub fn as_gum(&self) -> Option<&GumProjectile> {
        match &self.kind {
            ObstacleKind::Gum(gum) => Some(gum),
            _ => None,
        }
    }

    pub fn as_gum_mut(&mut self) -> Option<&mut GumProjectile> {
        match &mut self.kind {
            ObstacleKind::Gum(gum) => Some(gum),
            _ => None,
        }
    }

    pub(crate) fn add_gum(&mut self) {
        self.gum_count += 1;
    }

    pub(crate) fn remove_gum(&mut self) {
        self.gum_count = self.gum_count.saturating_sub(1);
    }

    pub(crate) fn clear_gum(&mut self) {
        self.gum_count = 0;
    }
}

/// Registry of all obstacles in a level
#[derive(Debug, Default)]
pub struct Obstacles {
    inner: SlotMap<ObstacleId, Obstacle>,
}

impl Obstacles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, obstacle: Obstacle) -> ObstacleId {
        self.inner.insert(obstacle)
    }

    pub fn get(&self, id: ObstacleId) -> Option<&Obstacle> {
        self.inner.get(id)
    }

    pub fn get_mut(&mut self, id: ObstacleId) -> Option<&mut Obstacle> {
        self.inner.get_mut(id)
    }

    pub fn gum(&self, id: ObstacleId) -> Option<&GumProjectile> {
        self.inner.get(id).and_then(Obstacle::as_gum)
    }

    pub fn gum_mut(&mut self, id: ObstacleId) -> Option<&mut GumProjectile> {
        self.inner.get_mut(id).and_then(Obstacle::as_gum_mut)
    }

    /// A gum that exists, is alive and has not been swept
    pub fn live_gum(&self, id: ObstacleId) -> Option<&GumProjectile> {
        self.inner
            .get(id)
            .filter(|o| !o.removed)
            .and_then(Obstacle::as_gum)
            .filter(|g| g.alive())
    }

    pub fn remove(&mut self, id: ObstacleId) -> Option<Obstacle> {
        self.inner.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObstacleId, &Obstacle)> {
        self.inner.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ObstacleId, &mut Obstacle)> {
        self.inner.iter_mut()
    }

    pub fn gum_ids(&self) -> Vec<ObstacleId> {
        self.inner
            .iter()
            .filter(|(_, o)| o.as_gum().is_some())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn removed_ids(&self) -> Vec<ObstacleId> {
        self.inner
            .iter()
            .filter(|(_, o)| o.removed)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use slotmap::KeyData;

    fn body() -> BodyHandle {
        BodyHandle::from(KeyData::from_ffi(1))
    }

    #[test]
    fn test_kind_categories_and_filters() {
        assert_eq!(ObstacleKind::Door.category(), Category::DOOR);
        let goal = ObstacleKind::Goal.default_filter();
        assert!(goal.collides_with(&ObstacleKind::Player.default_filter()));
        assert!(!goal.collides_with(&ObstacleKind::Enemy.default_filter()));

        let gum = ObstacleKind::Gum(GumProjectile::new(Vec2::ZERO, Vec2::X, 0.25));
        assert_eq!(gum.default_filter(), CollisionFilter::gum_free());
        assert!(!gum.is_gummable());
        assert!(ObstacleKind::Terrain.is_gummable());
        assert!(!ObstacleKind::Projectile.is_gummable());
    }

    #[test]
    fn test_gum_count_drives_gummed_flag() {
        let mut door = Obstacle::new(ObstacleKind::Door, body(), "door_red");
        assert!(!door.gummed());
        door.add_gum();
        door.add_gum();
        door.remove_gum();
        assert!(door.gummed());
        door.remove_gum();
        door.remove_gum();
        assert!(!door.gummed());
        assert_eq!(door.gum_count(), 0);
    }

    #[test]
    fn test_live_gum_lookup() {
        let mut obstacles = Obstacles::new();
        let wall = obstacles.insert(Obstacle::new(ObstacleKind::Terrain, body(), "wall"));
        let gum = obstacles.insert(Obstacle::new(
            ObstacleKind::Gum(GumProjectile::new(Vec2::ZERO, Vec2::X, 0.25)),
            body(),
            "gum",
        ));

        assert!(obstacles.live_gum(wall).is_none());
        assert!(obstacles.live_gum(gum).is_some());
        obstacles.get_mut(gum).expect("exists").mark_removed();
        assert!(obstacles.live_gum(gum).is_none());
        assert_eq!(obstacles.removed_ids(), vec![gum]);
        assert_eq!(obstacles.gum_ids(), vec![gum]);
    }
}
