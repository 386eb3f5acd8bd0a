//! Fixed timestep simulation tick
//!
//! Stage order matters: joints are only created or destroyed by the
//! synchronizer, which runs after the physics step has fully returned.

use glam::Vec2;

use super::obstacle::ObstacleId;
use super::state::{Level, LevelPhase};
use crate::settings::Settings;

/// Request to fire one gum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireCommand {
    pub origin: Vec2,
    pub direction: Vec2,
    pub speed: f32,
}

impl FireCommand {
    /// Aim from `origin` at `target` with the configured launch speed
    pub fn toward(origin: Vec2, target: Vec2, settings: &Settings) -> Self {
        Self {
            origin,
            direction: target - origin,
            speed: settings.gum_speed,
        }
    }
}

/// Input commands for a single tick (deterministic)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    pub fire: Option<FireCommand>,
    /// Gums to release
    pub unstick: Vec<ObstacleId>,
    /// Restart the level before anything else
    pub restart: bool,
}

/// Advance the level by one fixed timestep
pub fn tick(level: &mut Level, input: &TickInput, dt: f32) {
    if input.restart {
        level.restart();
    }

    // Finished levels only react to restart
    if level.phase() != LevelPhase::Playing {
        return;
    }

    if let Some(cmd) = input.fire {
        if let Err(err) = level.fire_gum(cmd.origin, cmd.direction, cmd.speed) {
            log::debug!("fire rejected: {err}");
        }
    }
    for &gum in &input.unstick {
        level.unstick(gum);
    }

    // Contacts only enqueue; the world is not mutated from callbacks
    level.step_physics(dt);
    // Deferred joint creation/destruction
    level.synchronize();
    level.update_gums();
    level.collect_garbage();
    level.advance_clock();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::*;
    use crate::sim::filter::CollisionFilter;
    use crate::sim::gum::GumState;
    use crate::sim::state::GameEvent;
    use crate::sim::world::{BodyType, FixtureHandle};

    fn level_with(settings: Settings) -> Level {
        Level::new(settings, 11).expect("valid settings")
    }

    fn level() -> Level {
        level_with(Settings::default())
    }

    fn run(level: &mut Level, ticks: usize) {
        for _ in 0..ticks {
            tick(level, &TickInput::default(), SIM_DT);
        }
    }

    /// Tick until `done` holds, at most `limit` ticks
    fn run_until(level: &mut Level, limit: usize, done: impl Fn(&Level) -> bool) -> bool {
        for _ in 0..limit {
            tick(level, &TickInput::default(), SIM_DT);
            if done(level) {
                return true;
            }
        }
        false
    }

    fn fire(level: &mut Level, origin: Vec2, direction: Vec2) -> ObstacleId {
        level.fire_gum(origin, direction, GUM_SPEED).expect("fired")
    }

    fn main_fixture(level: &Level, id: ObstacleId) -> FixtureHandle {
        let body = level.obstacle(id).expect("obstacle").body;
        level.world().body(body).expect("body").fixtures()[0]
    }

    fn gum_fixture_filter(level: &Level, gum: ObstacleId) -> CollisionFilter {
        level.world().filter(main_fixture(level, gum)).expect("fixture")
    }

    #[test]
    fn test_single_contact_sticks_once() {
        let mut level = level();
        let wall = level
            .add_terrain(Vec2::new(3.0, 0.0), Vec2::new(0.5, 2.0))
            .expect("added");
        let gum = fire(&mut level, Vec2::ZERO, Vec2::X);

        let stuck = run_until(&mut level, 60, |l| {
            l.gum(gum).is_some_and(|g| g.stuck_count() == 1)
        });
        assert!(stuck);
        assert_eq!(level.joint_count(), 1);
        assert_eq!(gum_fixture_filter(&level, gum), CollisionFilter::gum_free());
        assert!(level.obstacle(wall).expect("wall").gummed());
        assert_eq!(level.gum(gum).expect("gum").state(), GumState::Attached(1));
        assert_eq!(level.gums_in_flight(), 0);

        // Staying in contact does not add joints
        run(&mut level, 30);
        assert_eq!(level.joint_count(), 1);
        assert_eq!(level.gum(gum).expect("gum").velocity, Vec2::ZERO);
    }

    #[test]
    fn test_two_simultaneous_contacts_saturate() {
        let mut level = level();
        let half = Vec2::new(0.9, 1.0);
        level.add_terrain(Vec2::new(-1.0, 0.0), half).expect("added");
        level.add_terrain(Vec2::new(1.0, 0.0), half).expect("added");
        let gum = fire(&mut level, Vec2::ZERO, Vec2::Y);
        level.drain_events();

        run(&mut level, 1);
        let projectile = level.gum(gum).expect("gum");
        assert_eq!(projectile.stuck_count(), 2);
        assert_eq!(level.joint_count(), 2);
        assert_eq!(gum_fixture_filter(&level, gum), CollisionFilter::gum_limited());

        let events = level.drain_events();
        let attached = events
            .iter()
            .filter(|e| matches!(e, GameEvent::GumAttached { .. }))
            .count();
        assert_eq!(attached, 2);
        assert!(events.contains(&GameEvent::GumSaturated { gum }));
    }

    #[test]
    fn test_third_body_never_adds_a_joint() {
        let mut level = level();
        let half = Vec2::new(0.9, 1.0);
        level.add_terrain(Vec2::new(-1.0, 0.0), half).expect("added");
        level.add_terrain(Vec2::new(1.0, 0.0), half).expect("added");
        level
            .add_door(Vec2::new(0.0, 1.1), Vec2::new(0.1, 0.9), BodyType::Static)
            .expect("added");
        let gum = fire(&mut level, Vec2::ZERO, Vec2::Y);

        run(&mut level, 5);
        assert_eq!(level.gum(gum).expect("gum").stuck_count(), 2);
        assert_eq!(level.joint_count(), 2);
        assert_eq!(gum_fixture_filter(&level, gum), CollisionFilter::gum_limited());

        // Later contacts leave the narrowed filter alone
        run(&mut level, 20);
        assert_eq!(level.joint_count(), 2);
        assert_eq!(gum_fixture_filter(&level, gum), CollisionFilter::gum_limited());
    }

    #[test]
    fn test_saturated_gum_ignores_enemies() {
        let mut level = level_with(Settings {
            gravity: Vec2::ZERO,
            ..Settings::default()
        });
        let half = Vec2::new(0.9, 1.0);
        level.add_terrain(Vec2::new(-1.0, 1.0), half).expect("added");
        level.add_terrain(Vec2::new(1.0, 1.0), half).expect("added");
        let gum = fire(&mut level, Vec2::ZERO, -Vec2::Y);
        run(&mut level, 1);
        assert_eq!(level.gum(gum).expect("gum").state(), GumState::Attached(2));
        level.drain_events();

        let enemy = level.add_enemy(Vec2::new(0.0, -1.6)).expect("added");
        level.set_velocity(enemy, Vec2::new(0.0, 3.0)).expect("enemy");
        let (gum_fixture, enemy_fixture) = (main_fixture(&level, gum), main_fixture(&level, enemy));

        for _ in 0..40 {
            run(&mut level, 1);
            assert!(!level.world().is_touching(gum_fixture, enemy_fixture));
        }
        assert_eq!(level.gum(gum).expect("gum").stuck_count(), 2);
        assert_eq!(level.joint_count(), 2);
        assert_eq!(gum_fixture_filter(&level, gum), CollisionFilter::gum_limited());
        assert!(!level.obstacle(enemy).expect("enemy").gummed());
        let attached = level
            .drain_events()
            .into_iter()
            .filter(|e| {
                matches!(e, GameEvent::GumAttached { .. } | GameEvent::GumSaturated { .. })
            })
            .count();
        assert_eq!(attached, 0);
    }

    #[test]
    fn test_saturation_is_reported_once() {
        let mut level = level();
        let half = Vec2::new(0.9, 1.0);
        level.add_terrain(Vec2::new(-1.0, 0.0), half).expect("added");
        level.add_terrain(Vec2::new(1.0, 0.0), half).expect("added");
        let gum = fire(&mut level, Vec2::ZERO, Vec2::Y);

        let mut saturated = 0;
        for _ in 0..20 {
            run(&mut level, 1);
            saturated += level
                .drain_events()
                .iter()
                .filter(|e| **e == GameEvent::GumSaturated { gum })
                .count();
        }
        assert_eq!(saturated, 1);
    }

    #[test]
    fn test_unstick_releases_on_next_tick() {
        let mut level = level();
        let wall = level
            .add_terrain(Vec2::new(3.0, 0.0), Vec2::new(0.5, 2.0))
            .expect("added");
        let gum = fire(&mut level, Vec2::ZERO, Vec2::X);
        assert!(run_until(&mut level, 60, |l| l.joint_count() == 1));
        assert_eq!(level.ammo(), STARTING_AMMO - 1);

        let input = TickInput {
            unstick: vec![gum],
            ..TickInput::default()
        };
        // Commands run before the step, destruction waits for the drain
        assert!(level.unstick(gum));
        assert!(!level.gum(gum).expect("gum").alive());
        assert_eq!(level.joint_count(), 1);
        level.drain_events();

        tick(&mut level, &input, SIM_DT);
        assert_eq!(level.joint_count(), 0);
        assert!(!level.obstacle(wall).expect("wall").gummed());
        // Swept in the same tick
        assert!(level.obstacle(gum).is_none());
        assert_eq!(level.ammo(), STARTING_AMMO);
        assert_eq!(level.drain_events(), vec![GameEvent::GumRemoved { gum }]);
    }

    #[test]
    fn test_welded_gum_rides_a_moving_door() {
        let mut level = level();
        let door = level
            .add_door(Vec2::new(2.0, 0.0), Vec2::new(0.5, 1.0), BodyType::Kinematic)
            .expect("added");
        let gum = fire(&mut level, Vec2::ZERO, Vec2::X);
        assert!(run_until(&mut level, 60, |l| l.joint_count() == 1));
        let before = level.gum(gum).expect("gum").position;

        level.set_velocity(door, Vec2::new(0.0, 1.0)).expect("door");
        run(&mut level, 60);
        let after = level.gum(gum).expect("gum").position;
        assert!((after.y - before.y - 1.0).abs() < 0.05, "moved {}", after.y - before.y);
        assert!((after.x - before.x).abs() < 0.05);
    }

    #[test]
    fn test_removed_obstacle_releases_its_gum() {
        let mut level = level();
        let door = level
            .add_door(Vec2::new(2.0, 0.0), Vec2::new(0.5, 1.0), BodyType::Kinematic)
            .expect("added");
        let gum = fire(&mut level, Vec2::ZERO, Vec2::X);
        assert!(run_until(&mut level, 60, |l| l.joint_count() == 1));
        let gum_body = level.obstacle(gum).expect("gum").body;

        level.remove_obstacle(door);
        run(&mut level, 1);
        // Released, but the joint waits for the synchronizer
        assert!(!level.gum(gum).expect("gum").alive());
        assert_eq!(level.joint_count(), 1);
        assert!(level.obstacle(door).is_some());
        let stuck = level.gum(gum).expect("gum").stuck_count() as usize;
        assert!(stuck <= level.world().joints_of_body(gum_body).len());

        run(&mut level, 1);
        assert!(level.obstacle(door).is_none());
        assert!(level.obstacle(gum).is_none());
        assert_eq!(level.joint_count(), 0);
        assert_eq!(level.ammo(), STARTING_AMMO);
    }

    #[test]
    fn test_removed_gum_releases_what_it_held() {
        let mut level = level();
        let wall = level
            .add_terrain(Vec2::new(3.0, 0.0), Vec2::new(0.5, 2.0))
            .expect("added");
        let gum = fire(&mut level, Vec2::ZERO, Vec2::X);
        assert!(run_until(&mut level, 60, |l| l.joint_count() == 1));
        assert_eq!(level.ammo(), STARTING_AMMO - 1);
        level.drain_events();

        level.remove_obstacle(gum);
        run(&mut level, 1);
        assert!(!level.gum(gum).expect("gum").alive());
        assert_eq!(level.joint_count(), 1);
        assert!(level.obstacle(wall).expect("wall").gummed());

        run(&mut level, 1);
        assert!(level.obstacle(gum).is_none());
        assert_eq!(level.joint_count(), 0);
        let wall = level.obstacle(wall).expect("wall");
        assert!(!wall.gummed());
        assert_eq!(wall.gum_count(), 0);
        assert_eq!(level.ammo(), STARTING_AMMO);
        assert_eq!(level.drain_events(), vec![GameEvent::GumRemoved { gum }]);
    }

    #[test]
    fn test_stray_gum_expires() {
        let mut level = level_with(Settings {
            max_flight_ticks: 5,
            ..Settings::default()
        });
        let gum = fire(&mut level, Vec2::ZERO, Vec2::X);
        level.drain_events();

        run(&mut level, 10);
        let events = level.drain_events();
        assert_eq!(
            events,
            vec![GameEvent::GumExpired { gum }, GameEvent::GumRemoved { gum }]
        );
        assert!(level.obstacle(gum).is_none());
        assert_eq!(level.gums_in_flight(), 0);
        assert_eq!(level.ammo(), STARTING_AMMO);
    }

    #[test]
    fn test_gum_passes_through_player() {
        let mut level = level_with(Settings {
            gravity: Vec2::ZERO,
            ..Settings::default()
        });
        let player = level.add_player(Vec2::new(2.0, 0.0)).expect("added");
        let gum = fire(&mut level, Vec2::ZERO, Vec2::X);

        run(&mut level, 40);
        assert_eq!(level.gum(gum).expect("gum").state(), GumState::FreeFlight);
        assert!(!level.obstacle(player).expect("player").gummed());
        assert_eq!(level.joint_count(), 0);
    }

    #[test]
    fn test_player_lands_and_collects_pickup() {
        let mut level = level();
        level
            .add_terrain(Vec2::new(0.0, -0.5), Vec2::new(10.0, 0.5))
            .expect("added");
        let player = level.add_player(Vec2::new(0.0, 0.7)).expect("added");
        let pickup = level.add_pickup(Vec2::new(0.0, 1.0), 3).expect("added");

        assert!(run_until(&mut level, 60, |l| l.is_grounded(player)));
        assert!(level.obstacle(pickup).is_none());
        assert_eq!(level.ammo(), STARTING_AMMO + 3);
        let events = level.drain_events();
        assert!(events.contains(&GameEvent::PickupCollected { pickup, ammo: 3 }));
        assert!(events.contains(&GameEvent::GroundedChanged {
            character: player,
            grounded: true
        }));
    }

    #[test]
    fn test_reaching_goal_wins() {
        let mut level = level();
        level
            .add_terrain(Vec2::new(0.0, -0.5), Vec2::new(10.0, 0.5))
            .expect("added");
        level.add_player(Vec2::new(0.0, 0.7)).expect("added");
        level
            .add_goal(Vec2::new(0.0, 1.0), Vec2::new(0.5, 0.5))
            .expect("added");

        run(&mut level, 2);
        assert_eq!(level.phase(), LevelPhase::Won);
        assert!(level.drain_events().contains(&GameEvent::LevelWon));

        // Won levels are frozen until restart
        let frozen_at = level.time_ticks();
        run(&mut level, 5);
        assert_eq!(level.time_ticks(), frozen_at);
        let restart = TickInput {
            restart: true,
            ..TickInput::default()
        };
        tick(&mut level, &restart, SIM_DT);
        assert_eq!(level.phase(), LevelPhase::Playing);
    }

    #[test]
    fn test_enemy_shot_loses_level() {
        let mut level = level_with(Settings {
            gravity: Vec2::ZERO,
            ..Settings::default()
        });
        let player = level.add_player(Vec2::ZERO).expect("added");
        let shot = level
            .spawn_projectile(Vec2::new(3.0, 0.0), Vec2::new(-10.0, 0.0))
            .expect("spawned");

        assert!(run_until(&mut level, 60, |l| l.phase() == LevelPhase::Lost));
        let events = level.drain_events();
        assert!(events.contains(&GameEvent::ProjectileImpact {
            projectile: shot,
            target: player
        }));
        assert!(events.contains(&GameEvent::PlayerHit { player }));
        assert_eq!(
            level.fire_gum(Vec2::ZERO, Vec2::X, GUM_SPEED),
            Err(crate::error::FireError::LevelNotPlaying)
        );
    }

    #[test]
    fn test_restart_after_attachment() {
        let mut level = level();
        level
            .add_terrain(Vec2::new(3.0, 0.0), Vec2::new(0.5, 2.0))
            .expect("added");
        fire(&mut level, Vec2::ZERO, Vec2::X);
        fire(&mut level, Vec2::new(0.0, 1.0), Vec2::X);
        assert!(run_until(&mut level, 60, |l| l.joint_count() == 2));

        let input = TickInput {
            restart: true,
            ..TickInput::default()
        };
        tick(&mut level, &input, SIM_DT);
        assert_eq!(level.joint_count(), 0);
        assert_eq!(level.ammo(), STARTING_AMMO);
        assert_eq!(level.attachments().attached_len(), 0);
        assert_eq!(level.attachments().pending_len(), 0);
        assert!(level.obstacles().iter().all(|(_, o)| !o.gummed()));
    }

    #[test]
    fn test_fire_command_toward_target() {
        let settings = Settings::default();
        let cmd = FireCommand::toward(Vec2::ZERO, Vec2::new(0.0, 4.0), &settings);
        assert_eq!(cmd.direction, Vec2::new(0.0, 4.0));
        assert_eq!(cmd.speed, settings.gum_speed);

        let mut level = level();
        let input = TickInput {
            fire: Some(cmd),
            ..TickInput::default()
        };
        tick(&mut level, &input, SIM_DT);
        assert_eq!(level.gums_in_flight(), 1);
        assert_eq!(level.time_ticks(), 1);
    }
}
