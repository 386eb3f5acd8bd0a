//! Collision categories and filtering
//!
//! Every fixture carries one category bit and a mask of categories it is
//! willing to touch. Two fixtures collide iff each one's category is in the
//! other's mask.

use bitflags::bitflags;

bitflags! {
    /// Collision category bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Category: u16 {
        const PLAYER = 1 << 0;
        const ENEMY = 1 << 1;
        const TERRAIN = 1 << 2;
        const GUM = 1 << 3;
        /// Enemy shots
        const PROJECTILE = 1 << 4;
        const DOOR = 1 << 5;
        const GOAL = 1 << 6;
        const PICKUP = 1 << 7;
    }
}

impl Category {
    /// Readable name of a single-bit category (for logs and errors)
    pub fn label(self) -> &'static str {
        self.iter_names()
            .next()
            .filter(|_| self.bits().count_ones() == 1)
            .map(|(name, _)| name)
            .unwrap_or("mixed")
    }
}

/// Category/mask pair attached to a fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollisionFilter {
    pub category: Category,
    pub mask: Category,
}

impl CollisionFilter {
    pub const fn new(category: Category, mask: Category) -> Self {
        Self { category, mask }
    }

    /// Filter that touches every category
    pub const fn solid(category: Category) -> Self {
        Self::new(category, Category::all())
    }

    /// Mutual category/mask test
    #[inline]
    pub fn collides_with(&self, other: &CollisionFilter) -> bool {
        self.category.intersects(other.mask) && other.category.intersects(self.mask)
    }

    /// A gum in flight: everything except the player and other gum
    pub const fn gum_free() -> Self {
        Self::new(
            Category::GUM,
            Category::all()
                .difference(Category::PLAYER)
                .difference(Category::GUM),
        )
    }

    /// A gum holding two joints: additionally ignores enemies
    pub const fn gum_limited() -> Self {
        Self::new(
            Category::GUM,
            Self::gum_free().mask.difference(Category::ENEMY),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_is_mutual() {
        let player = CollisionFilter::solid(Category::PLAYER);
        let gum = CollisionFilter::gum_free();
        let terrain = CollisionFilter::solid(Category::TERRAIN);

        assert!(gum.collides_with(&terrain));
        assert!(terrain.collides_with(&gum));
        // Player accepts gum, but gum refuses the player
        assert!(!player.collides_with(&gum));
        assert!(!gum.collides_with(&player));
    }

    #[test]
    fn test_gum_ignores_gum() {
        let gum = CollisionFilter::gum_free();
        assert!(!gum.collides_with(&gum));
    }

    #[test]
    fn test_limited_mask_drops_enemies_only() {
        let enemy = CollisionFilter::solid(Category::ENEMY);
        let door = CollisionFilter::solid(Category::DOOR);

        assert!(CollisionFilter::gum_free().collides_with(&enemy));
        assert!(!CollisionFilter::gum_limited().collides_with(&enemy));
        assert!(CollisionFilter::gum_limited().collides_with(&door));
        assert_eq!(
            CollisionFilter::gum_free().mask.difference(CollisionFilter::gum_limited().mask),
            Category::ENEMY
        );
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(Category::GUM.label(), "GUM");
        assert_eq!((Category::GUM | Category::DOOR).label(), "mixed");
    }
}
