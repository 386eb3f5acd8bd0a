//! Contact classification and routing
//!
//! The dispatcher is the level's `ContactListener`. It turns raw fixture
//! pairs into semantic interactions using a table keyed on collision
//! categories, then hands each one to its resolver. It never touches the
//! physics world; the only lasting effects are queued attachment requests,
//! obstacle flags, ground state and events.
//!
//! A malformed contact is logged and skipped. It never stops the remaining
//! contacts of the step from being processed.

use super::attachment::{AttachmentLifecycleManager, ContactSide};
use super::filter::Category;
use super::ground::GroundTracker;
use super::obstacle::{FixtureRole, ObstacleId, ObstacleKind, Obstacles};
use super::state::GameEvent;
use super::world::{Contact, ContactFixture, ContactListener};
use crate::error::ContactError;

/// Semantic interaction a contact can trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    GumAttachment,
    WinCondition,
    Pickup,
    ProjectileImpact,
}

/// (category of the driving side, categories of the other side, route)
const ROUTES: &[(Category, Category, Route)] = &[
    (Category::GUM, Category::all(), Route::GumAttachment),
    (Category::PLAYER, Category::GOAL, Route::WinCondition),
    (Category::PLAYER, Category::PICKUP, Route::Pickup),
    (Category::PROJECTILE, Category::all(), Route::ProjectileImpact),
];

/// Routes for a category pair; `true` means side B drives the route
pub fn classify(a: Category, b: Category) -> Vec<(Route, bool)> {
    ROUTES
        .iter()
        .filter_map(|&(driver, target, route)| {
            if a.intersects(driver) && b.intersects(target) {
                Some((route, false))
            } else if b.intersects(driver) && a.intersects(target) {
                Some((route, true))
            } else {
                None
            }
        })
        .collect()
}

/// A contact side resolved against the obstacle registry
#[derive(Debug, Clone, Copy)]
struct Side<'c> {
    fixture: &'c ContactFixture,
    owner: ObstacleId,
    role: FixtureRole,
}

impl Side<'_> {
    fn contact_side(&self) -> ContactSide {
        ContactSide {
            obstacle: self.owner,
            body: self.fixture.body,
            pose: self.fixture.pose,
        }
    }
}

/// Routes contacts from one physics step
pub struct CollisionDispatcher<'a> {
    obstacles: &'a mut Obstacles,
    attachments: &'a mut AttachmentLifecycleManager,
    ground: &'a mut GroundTracker,
    events: &'a mut Vec<GameEvent>,
    skipped: usize,
}

impl<'a> CollisionDispatcher<'a> {
    pub fn new(
        obstacles: &'a mut Obstacles,
        attachments: &'a mut AttachmentLifecycleManager,
        ground: &'a mut GroundTracker,
        events: &'a mut Vec<GameEvent>,
    ) -> Self {
        Self {
            obstacles,
            attachments,
            ground,
            events,
            skipped: 0,
        }
    }

    /// Contacts dropped as malformed so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn side<'c>(&self, fixture: &'c ContactFixture) -> Result<Side<'c>, ContactError> {
        let data = fixture
            .user_data
            .ok_or(ContactError::MissingUserData(fixture.fixture))?;
        let obstacle = self
            .obstacles
            .get(data.owner)
            .ok_or(ContactError::UnknownObstacle {
                fixture: fixture.fixture,
                owner: data.owner,
            })?;
        if !fixture.filter.category.contains(obstacle.kind.category()) {
            return Err(ContactError::KindMismatch(
                data.owner,
                fixture.filter.category.label(),
            ));
        }
        Ok(Side {
            fixture,
            owner: data.owner,
            role: data.role,
        })
    }

    fn try_begin(&mut self, contact: &Contact) -> Result<(), ContactError> {
        let a = self.side(&contact.a)?;
        let b = self.side(&contact.b)?;

        self.resolve_ground(&a, &b);
        self.resolve_ground(&b, &a);

        for (route, swapped) in classify(a.fixture.filter.category, b.fixture.filter.category) {
            let (driver, other) = if swapped { (&b, &a) } else { (&a, &b) };
            match route {
                Route::GumAttachment => self.resolve_gum(driver, other),
                Route::WinCondition => self.resolve_win(driver),
                Route::Pickup => self.resolve_pickup(driver, other),
                Route::ProjectileImpact => self.resolve_projectile(driver, other),
            }
        }
        Ok(())
    }

    fn resolve_ground(&mut self, foot: &Side, other: &Side) {
        if foot.role != FixtureRole::FootSensor
            || other.fixture.is_sensor
            || other.owner == foot.owner
        {
            return;
        }
        if self.ground.touch(foot.owner, other.fixture.fixture) {
            self.events.push(GameEvent::GroundedChanged {
                character: foot.owner,
                grounded: true,
            });
        }
    }

    fn resolve_gum(&mut self, gum: &Side, other: &Side) {
        if gum.fixture.is_sensor || other.fixture.is_sensor {
            return;
        }
        let outcome = self.attachments.enqueue_attachment(
            self.obstacles,
            gum.contact_side(),
            other.contact_side(),
        );
        log::trace!("gum {:?} touched {:?}: {outcome:?}", gum.owner, other.owner);
    }

    fn resolve_win(&mut self, player: &Side) {
        if player.role == FixtureRole::Body {
            self.events.push(GameEvent::LevelWon);
        }
    }

    fn resolve_pickup(&mut self, player: &Side, pickup: &Side) {
        if player.role != FixtureRole::Body {
            return;
        }
        let Some(obstacle) = self.obstacles.get_mut(pickup.owner) else {
            return;
        };
        let ObstacleKind::Pickup { ammo } = obstacle.kind else {
            return;
        };
        if obstacle.is_removed() {
            return;
        }
        obstacle.mark_removed();
        self.events.push(GameEvent::PickupCollected {
            pickup: pickup.owner,
            ammo,
        });
    }

    fn resolve_projectile(&mut self, projectile: &Side, target: &Side) {
        if projectile.fixture.is_sensor || target.fixture.is_sensor {
            return;
        }
        let Some(shot) = self.obstacles.get_mut(projectile.owner) else {
            return;
        };
        if shot.is_removed() {
            return;
        }
        shot.mark_removed();
        self.events.push(GameEvent::ProjectileImpact {
            projectile: projectile.owner,
            target: target.owner,
        });

        let hit_player = self
            .obstacles
            .get(target.owner)
            .is_some_and(|o| matches!(o.kind, ObstacleKind::Player));
        if hit_player {
            self.events.push(GameEvent::PlayerHit {
                player: target.owner,
            });
        }
    }
}

impl ContactListener for CollisionDispatcher<'_> {
    fn begin_contact(&mut self, contact: &Contact) {
        if let Err(err) = self.try_begin(contact) {
            self.skipped += 1;
            log::warn!("skipping contact: {err}");
        }
    }

    /// Only the ground tracker cares; attachment has no "un-collide"
    fn end_contact(&mut self, contact: &Contact) {
        for (foot, other) in [(&contact.a, &contact.b), (&contact.b, &contact.a)] {
            let Some(data) = foot.user_data else {
                continue;
            };
            if data.role != FixtureRole::FootSensor || other.is_sensor {
                continue;
            }
            if self.ground.release(data.owner, other.fixture) {
                self.events.push(GameEvent::GroundedChanged {
                    character: data.owner,
                    grounded: false,
                });
            }
        }
    }
}
