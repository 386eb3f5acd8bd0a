//! Level state
//!
//! A `Level` owns everything one play-through needs: the physics world, the
//! obstacle registry and the attachment queues. Nothing here is global, so
//! two levels never share attachment state.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::attachment::AttachmentLifecycleManager;
use super::dispatch::CollisionDispatcher;
use super::filter::CollisionFilter;
use super::ground::GroundTracker;
use super::gum::GumProjectile;
use super::obstacle::{FixtureData, FixtureRole, Obstacle, ObstacleId, ObstacleKind, Obstacles};
use super::sync::{JointSynchronizer, SyncReport};
use super::world::{BodyDef, BodyType, FixtureDef, PhysicsWorld, Shape};
use crate::consts::*;
use crate::error::{FireError, SettingsError, WorldError};
use crate::rotate;
use crate::settings::Settings;

/// Player collision box (half extents)
pub const PLAYER_HALF_EXTENTS: Vec2 = Vec2::new(0.3, 0.6);
/// Foot sensor, a thin strip under the player's box
pub const FOOT_HALF_EXTENTS: Vec2 = Vec2::new(0.25, 0.05);
pub const ENEMY_HALF_EXTENTS: Vec2 = Vec2::new(0.4, 0.4);
pub const PICKUP_RADIUS: f32 = 0.3;
pub const PROJECTILE_RADIUS: f32 = 0.1;

/// Current phase of a level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelPhase {
    Playing,
    /// Player reached the goal
    Won,
    /// Player was hit
    Lost,
}

/// Game events (for UI, sound and scripting hooks)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    GumFired {
        gum: ObstacleId,
    },
    /// A weld joint now exists
    GumAttached {
        gum: ObstacleId,
        other: ObstacleId,
        stuck_count: u8,
    },
    /// Gum holds its last joint and stopped colliding with enemies
    GumSaturated {
        gum: ObstacleId,
    },
    GumRemoved {
        gum: ObstacleId,
    },
    /// Flew too long without landing
    GumExpired {
        gum: ObstacleId,
    },
    GroundedChanged {
        character: ObstacleId,
        grounded: bool,
    },
    PickupCollected {
        pickup: ObstacleId,
        ammo: u32,
    },
    ProjectileImpact {
        projectile: ObstacleId,
        target: ObstacleId,
    },
    PlayerHit {
        player: ObstacleId,
    },
    LevelWon,
}

/// Everything belonging to one level
pub struct Level {
    /// Seed of the shot-spread RNG, reused on restart
    seed: u64,
    settings: Settings,
    world: PhysicsWorld,
    obstacles: Obstacles,
    attachments: AttachmentLifecycleManager,
    synchronizer: JointSynchronizer,
    ground: GroundTracker,
    rng: Pcg32,
    player: Option<ObstacleId>,
    ammo: u32,
    phase: LevelPhase,
    events: Vec<GameEvent>,
    time_ticks: u64,
}

impl Level {
    /// Create an empty level
    pub fn new(settings: Settings, seed: u64) -> Result<Self, SettingsError> {
        settings.validate()?;
        let world = PhysicsWorld::new(settings.gravity).with_weld_iterations(settings.weld_iterations);
        Ok(Self {
            seed,
            ammo: settings.starting_ammo,
            settings,
            world,
            obstacles: Obstacles::new(),
            attachments: AttachmentLifecycleManager::new(),
            synchronizer: JointSynchronizer::new(),
            ground: GroundTracker::new(),
            rng: Pcg32::seed_from_u64(seed),
            player: None,
            phase: LevelPhase::Playing,
            events: Vec::new(),
            time_ticks: 0,
        })
    }

    // === Builders ===

    /// Create a body with one `Body` fixture using the kind's default filter
    pub fn add_obstacle(
        &mut self,
        kind: ObstacleKind,
        body: BodyDef,
        fixture: FixtureDef,
        tag: &str,
    ) -> Result<ObstacleId, WorldError> {
        let handle = self.world.create_body(&body);
        let id = self.obstacles.insert(Obstacle::new(kind, handle, tag));
        self.attach_fixture(id, fixture, FixtureRole::Body)?;
        log::debug!("added {tag} {id:?}");
        Ok(id)
    }

    fn attach_fixture(
        &mut self,
        owner: ObstacleId,
        fixture: FixtureDef,
        role: FixtureRole,
    ) -> Result<(), WorldError> {
        let Some(obstacle) = self.obstacles.get(owner) else {
            return Ok(());
        };
        self.world.add_fixture(
            obstacle.body,
            fixture.with_user_data(FixtureData { owner, role }),
        )?;
        Ok(())
    }

    fn kind_fixture(kind: &ObstacleKind, shape: Shape) -> FixtureDef {
        let fixture = FixtureDef::new(shape, kind.default_filter());
        match kind {
            ObstacleKind::Goal | ObstacleKind::Pickup { .. } => fixture.sensor(),
            _ => fixture,
        }
    }

    fn add_simple(
        &mut self,
        kind: ObstacleKind,
        body: BodyDef,
        shape: Shape,
        tag: &str,
    ) -> Result<ObstacleId, WorldError> {
        let fixture = Self::kind_fixture(&kind, shape);
        self.add_obstacle(kind, body, fixture, tag)
    }

    /// Static level geometry
    pub fn add_terrain(&mut self, center: Vec2, half_extents: Vec2) -> Result<ObstacleId, WorldError> {
        self.add_simple(
            ObstacleKind::Terrain,
            BodyDef::new(BodyType::Static, center),
            Shape::Box { half_extents },
            "terrain",
        )
    }

    /// Door or crusher; kinematic ones are driven with `set_velocity`
    pub fn add_door(
        &mut self,
        center: Vec2,
        half_extents: Vec2,
        body_type: BodyType,
    ) -> Result<ObstacleId, WorldError> {
        self.add_simple(
            ObstacleKind::Door,
            BodyDef::new(body_type, center),
            Shape::Box { half_extents },
            "door",
        )
    }

    /// The player, with a foot sensor for ground detection
    pub fn add_player(&mut self, position: Vec2) -> Result<ObstacleId, WorldError> {
        let kind = ObstacleKind::Player;
        let filter = kind.default_filter();
        let id = self.add_simple(
            kind,
            BodyDef::new(BodyType::Dynamic, position).with_fixed_rotation(),
            Shape::Box {
                half_extents: PLAYER_HALF_EXTENTS,
            },
            "player",
        )?;
        let foot = FixtureDef::new(
            Shape::Box {
                half_extents: FOOT_HALF_EXTENTS,
            },
            filter,
        )
        .sensor()
        .with_offset(Vec2::new(0.0, -PLAYER_HALF_EXTENTS.y));
        self.attach_fixture(id, foot, FixtureRole::FootSensor)?;
        self.player = Some(id);
        Ok(id)
    }

    pub fn add_enemy(&mut self, position: Vec2) -> Result<ObstacleId, WorldError> {
        self.add_simple(
            ObstacleKind::Enemy,
            BodyDef::new(BodyType::Dynamic, position).with_fixed_rotation(),
            Shape::Box {
                half_extents: ENEMY_HALF_EXTENTS,
            },
            "enemy",
        )
    }

    pub fn add_goal(&mut self, center: Vec2, half_extents: Vec2) -> Result<ObstacleId, WorldError> {
        self.add_simple(
            ObstacleKind::Goal,
            BodyDef::new(BodyType::Static, center),
            Shape::Box { half_extents },
            "goal",
        )
    }

    pub fn add_pickup(&mut self, position: Vec2, ammo: u32) -> Result<ObstacleId, WorldError> {
        self.add_simple(
            ObstacleKind::Pickup { ammo },
            BodyDef::new(BodyType::Static, position),
            Shape::Circle {
                radius: PICKUP_RADIUS,
            },
            "pickup",
        )
    }

    /// Enemy shot, unaffected by gravity
    pub fn spawn_projectile(&mut self, position: Vec2, velocity: Vec2) -> Result<ObstacleId, WorldError> {
        self.add_simple(
            ObstacleKind::Projectile,
            BodyDef::new(BodyType::Dynamic, position)
                .with_velocity(velocity)
                .with_gravity_scale(0.0),
            Shape::Circle {
                radius: PROJECTILE_RADIUS,
            },
            "projectile",
        )
    }

    // === Commands ===

    /// Fire a gum from `origin`; consumes one ammo
    pub fn fire_gum(
        &mut self,
        origin: Vec2,
        direction: Vec2,
        speed: f32,
    ) -> Result<ObstacleId, FireError> {
        if self.phase != LevelPhase::Playing {
            return Err(FireError::LevelNotPlaying);
        }
        if self.ammo == 0 {
            return Err(FireError::OutOfAmmo);
        }
        let mut direction = direction.normalize_or_zero();
        if direction == Vec2::ZERO {
            return Err(FireError::ZeroDirection);
        }
        let spread = self.settings.gum_spread;
        if spread > 0.0 {
            direction = rotate(direction, self.rng.random_range(-spread..=spread));
        }

        let velocity = direction * speed;
        let radius = self.settings.gum_radius;
        let kind = ObstacleKind::Gum(GumProjectile::new(origin, velocity, radius));
        let fixture = FixtureDef::new(Shape::Circle { radius }, CollisionFilter::gum_free())
            .with_density(GUM_DENSITY);
        let body = BodyDef::new(BodyType::Dynamic, origin)
            .with_velocity(velocity)
            .with_gravity_scale(self.settings.gum_gravity_scale);
        let gum = self.add_obstacle(kind, body, fixture, "gum")?;

        self.ammo -= 1;
        self.attachments.register_fired(gum);
        self.events.push(GameEvent::GumFired { gum });
        log::debug!("fired gum {gum:?}, {} ammo left", self.ammo);
        Ok(gum)
    }

    /// Release a gum; its joints go away at the next synchronization
    ///
    /// Returns false if `gum` is not a live gum.
    pub fn unstick(&mut self, gum: ObstacleId) -> bool {
        if self.obstacles.live_gum(gum).is_none() {
            return false;
        }
        self.attachments.unstick(&mut self.obstacles, gum);
        true
    }

    /// Drive a kinematic body (doors, crushers)
    pub fn set_velocity(&mut self, obstacle: ObstacleId, velocity: Vec2) -> Result<(), WorldError> {
        let Some(o) = self.obstacles.get(obstacle) else {
            return Ok(());
        };
        self.world.set_linear_velocity(o.body, velocity)
    }

    /// Flag an obstacle for the next garbage-collection pass
    pub fn remove_obstacle(&mut self, obstacle: ObstacleId) {
        if let Some(o) = self.obstacles.get_mut(obstacle) {
            o.mark_removed();
        }
    }

    /// Start over: every gum and shot is destroyed, ammo is refilled
    ///
    /// The spread RNG is reseeded, so a restarted level replays the same shots.
    pub fn restart(&mut self) {
        let transient: Vec<ObstacleId> = self
            .obstacles
            .iter()
            .filter(|(_, o)| matches!(o.kind, ObstacleKind::Gum(_) | ObstacleKind::Projectile))
            .map(|(id, _)| id)
            .collect();
        let count = transient.len();
        for id in transient {
            if let Some(obstacle) = self.obstacles.remove(id) {
                if let Err(err) = self.world.destroy_body(obstacle.body) {
                    log::warn!("restart: {err}");
                }
            }
        }
        for (_, obstacle) in self.obstacles.iter_mut() {
            obstacle.clear_gum();
        }

        self.attachments.reset_all();
        self.ground.clear();
        self.events.clear();
        self.ammo = self.settings.starting_ammo;
        self.phase = LevelPhase::Playing;
        self.rng = Pcg32::seed_from_u64(self.seed);
        log::info!("level restarted, {count} gums and shots cleared");
    }

    // === Queries ===

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn obstacles(&self) -> &Obstacles {
        &self.obstacles
    }

    pub fn obstacle(&self, id: ObstacleId) -> Option<&Obstacle> {
        self.obstacles.get(id)
    }

    pub fn gum(&self, id: ObstacleId) -> Option<&GumProjectile> {
        self.obstacles.gum(id)
    }

    pub fn attachments(&self) -> &AttachmentLifecycleManager {
        &self.attachments
    }

    pub fn synchronizer(&self) -> &JointSynchronizer {
        &self.synchronizer
    }

    pub fn player(&self) -> Option<ObstacleId> {
        self.player
    }

    pub fn is_grounded(&self, character: ObstacleId) -> bool {
        self.ground.is_grounded(character)
    }

    pub fn ammo(&self) -> u32 {
        self.ammo
    }

    pub fn phase(&self) -> LevelPhase {
        self.phase
    }

    pub fn time_ticks(&self) -> u64 {
        self.time_ticks
    }

    pub fn gums_in_flight(&self) -> usize {
        self.attachments.in_flight()
    }

    pub fn joint_count(&self) -> usize {
        self.world.joint_count()
    }

    /// Events since the last drain, oldest first
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    // === Tick stages ===

    /// Physics step with the dispatcher listening
    pub(crate) fn step_physics(&mut self, dt: f32) {
        let first_new = self.events.len();
        let mut dispatcher = CollisionDispatcher::new(
            &mut self.obstacles,
            &mut self.attachments,
            &mut self.ground,
            &mut self.events,
        );
        self.world.step(dt, &mut dispatcher);
        let skipped = dispatcher.skipped();
        if skipped > 0 {
            log::debug!("tick {}: {skipped} contacts skipped", self.time_ticks);
        }

        for event in &self.events[first_new..] {
            match *event {
                GameEvent::PickupCollected { ammo, .. } => self.ammo += ammo,
                GameEvent::PlayerHit { .. } if self.phase == LevelPhase::Playing => {
                    log::info!("player hit, level lost");
                    self.phase = LevelPhase::Lost;
                }
                GameEvent::LevelWon if self.phase == LevelPhase::Playing => {
                    log::info!("goal reached, level won");
                    self.phase = LevelPhase::Won;
                }
                _ => {}
            }
        }
    }

    /// Realize and destroy queued joints; retired gums give their ammo back
    pub(crate) fn synchronize(&mut self) -> SyncReport {
        let report = self.synchronizer.synchronize(
            &mut self.world,
            &mut self.obstacles,
            &mut self.attachments,
        );
        for &(gum, other, realized) in &report.realized {
            self.events.push(GameEvent::GumAttached {
                gum,
                other,
                stuck_count: realized.stuck_count,
            });
            if realized.narrowed {
                self.events.push(GameEvent::GumSaturated { gum });
            }
        }
        for &gum in &report.retired {
            self.ammo += 1;
            self.events.push(GameEvent::GumRemoved { gum });
        }
        report
    }

    /// Mirror gum bodies into their projectiles and expire stray shots
    pub(crate) fn update_gums(&mut self) {
        for id in self.obstacles.gum_ids() {
            let Some(obstacle) = self.obstacles.get_mut(id) else {
                continue;
            };
            let Some(body) = self.world.body(obstacle.body) else {
                continue;
            };
            let (position, velocity) = (body.position, body.linear_velocity);
            if let Some(gum) = obstacle.as_gum_mut() {
                gum.position = position;
                // Frozen from the first contact on
                if gum.in_free_flight() {
                    gum.velocity = velocity;
                }
            }
        }

        let max_flight = self.settings.max_flight_ticks;
        let flying: Vec<ObstacleId> = self.attachments.free_flight().collect();
        for id in flying {
            let Some(gum) = self.obstacles.gum_mut(id) else {
                continue;
            };
            if gum.advance_flight() > max_flight {
                log::debug!("gum {id:?} expired after {max_flight} ticks");
                self.attachments.unstick(&mut self.obstacles, id);
                self.events.push(GameEvent::GumExpired { gum: id });
            }
        }
    }

    /// Sweep removed obstacles out of the level
    ///
    /// An obstacle still tied to a joint is not swept yet. Its gums are
    /// unstuck and the synchronizer destroys their joints on the next tick,
    /// after which the body can go.
    pub(crate) fn collect_garbage(&mut self) {
        for id in self.obstacles.removed_ids() {
            let Some(obstacle) = self.obstacles.get(id) else {
                continue;
            };
            let body = obstacle.body;
            let label = obstacle.kind.label();

            let is_gum = obstacle.as_gum().is_some();
            let holding = match obstacle.as_gum() {
                Some(gum) if gum.alive() || self.attachments.awaits_sync(id) => vec![id],
                Some(_) => Vec::new(),
                None => self.attachments.gums_attached_to(id),
            };
            if !holding.is_empty() {
                for gum in holding {
                    self.attachments.unstick(&mut self.obstacles, gum);
                }
                log::debug!("{label} {id:?} waits for its joints before sweeping");
                continue;
            }

            if is_gum {
                self.attachments.forget_gum(id);
            }
            if self.player == Some(id) {
                self.player = None;
            }
            self.ground.forget(id);
            if let Err(err) = self.world.destroy_body(body) {
                log::warn!("sweeping {label} {id:?}: {err}");
            }
            self.obstacles.remove(id);
            log::trace!("swept {label} {id:?}");
        }
    }

    pub(crate) fn advance_clock(&mut self) {
        self.time_ticks += 1;
    }
}
