//! Gumweld demo
//!
//! Scripts a short level (two shots, a moving door, an unstick) and logs
//! every game event. Run with `RUST_LOG=debug` to watch the queues.

use std::path::PathBuf;

use glam::Vec2;

use gumweld::Settings;
use gumweld::consts::*;
use gumweld::sim::{BodyType, FireCommand, Level, ObstacleId, TickInput, tick};

/// Frame time of the pretend renderer (30 fps, two sim ticks per frame)
const FRAME_DT: f32 = 1.0 / 30.0;
const DEMO_FRAMES: u32 = 150;

/// Fixed-timestep driver
struct Demo {
    level: Level,
    accumulator: f32,
    input: TickInput,
    door: ObstacleId,
    first_gum: Option<ObstacleId>,
}

impl Demo {
    fn new(settings: Settings) -> Result<Self, Box<dyn std::error::Error>> {
        let mut level = Level::new(settings, 42)?;
        level.add_terrain(Vec2::new(0.0, -0.5), Vec2::new(12.0, 0.5))?;
        level.add_terrain(Vec2::new(6.0, 2.0), Vec2::new(0.5, 2.0))?;
        let door = level.add_door(Vec2::new(-4.0, 1.5), Vec2::new(0.3, 1.5), BodyType::Kinematic)?;
        level.add_player(Vec2::new(0.0, 0.7))?;
        level.add_pickup(Vec2::new(1.0, 0.5), 2)?;
        level.add_enemy(Vec2::new(3.0, 0.4))?;

        Ok(Self {
            level,
            accumulator: 0.0,
            input: TickInput::default(),
            door,
            first_gum: None,
        })
    }

    /// Scripted "player input" for a frame
    fn script(&mut self, frame: u32) {
        let origin = Vec2::new(0.0, 1.5);
        let settings = self.level.settings().clone();
        match frame {
            5 => {
                self.input.fire = Some(FireCommand::toward(origin, Vec2::new(6.0, 1.5), &settings));
            }
            20 => {
                self.input.fire = Some(FireCommand::toward(origin, Vec2::new(-4.0, 1.5), &settings));
            }
            40 => {
                if let Err(err) = self.level.set_velocity(self.door, Vec2::new(0.0, 1.0)) {
                    log::warn!("door: {err}");
                }
            }
            90 => {
                if let Some(gum) = self.first_gum {
                    self.input.unstick.push(gum);
                }
            }
            _ => {}
        }
    }

    fn update(&mut self, dt: f32) {
        self.accumulator += dt.min(0.1);

        let mut substeps = 0;
        while self.accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
            let input = std::mem::take(&mut self.input);
            tick(&mut self.level, &input, SIM_DT);
            self.accumulator -= SIM_DT;
            substeps += 1;
        }

        for event in self.level.drain_events() {
            if let gumweld::sim::GameEvent::GumFired { gum } = event {
                self.first_gum.get_or_insert(gum);
            }
            log::info!("t={} {event:?}", self.level.time_ticks());
        }
    }
}

fn load_settings() -> Result<Settings, Box<dyn std::error::Error>> {
    match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)?;
            Ok(Settings::from_json(&json)?)
        }
        None => Ok(Settings::default()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(not(target_arch = "wasm32"))]
    env_logger::init();
    log::info!("Gumweld demo starting...");

    let mut demo = Demo::new(load_settings()?)?;
    for frame in 0..DEMO_FRAMES {
        demo.script(frame);
        demo.update(FRAME_DT);
    }

    let level = &demo.level;
    log::info!(
        "done after {} ticks: phase {:?}, ammo {}, {} joints, {} gums in flight",
        level.time_ticks(),
        level.phase(),
        level.ammo(),
        level.joint_count(),
        level.gums_in_flight()
    );
    let sync = level.synchronizer();
    log::info!(
        "seed {}: {} welds made, {} destroyed, {} stale requests dropped",
        level.seed(),
        sync.realized_total(),
        sync.destroyed_total(),
        sync.dropped_total()
    );
    Ok(())
}
