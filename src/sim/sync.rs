//! Joint synchronization
//!
//! Runs once per tick, after `PhysicsWorld::step` has returned and before the
//! next one starts. It is the only code that creates or destroys joints.

use glam::Vec2;

use super::attachment::{AttachmentLifecycleManager, PendingAttachment, Realized};
use super::obstacle::{ObstacleId, Obstacles};
use super::world::PhysicsWorld;
use crate::error::WorldError;

/// What one synchronization pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// (gum, other, result) in realization order
    pub realized: Vec<(ObstacleId, ObstacleId, Realized)>,
    pub destroyed: usize,
    /// Stale requests thrown away
    pub dropped: usize,
    /// Gums marked for removal
    pub retired: Vec<ObstacleId>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.realized.is_empty() && self.destroyed == 0 && self.dropped == 0 && self.retired.is_empty()
    }
}

/// Drains the attachment queues into the physics world
#[derive(Debug, Default)]
pub struct JointSynchronizer {
    realized_total: u64,
    destroyed_total: u64,
    dropped_total: u64,
}

impl JointSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn realized_total(&self) -> u64 {
        self.realized_total
    }

    pub fn destroyed_total(&self) -> u64 {
        self.destroyed_total
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    /// Realize pending welds, carry out destroy requests, retire dead gums
    pub fn synchronize(
        &mut self,
        world: &mut PhysicsWorld,
        obstacles: &mut Obstacles,
        attachments: &mut AttachmentLifecycleManager,
    ) -> SyncReport {
        let mut report = SyncReport::default();

        for request in attachments.dequeue_pending_for_realization() {
            if !is_live(world, obstacles, &request) {
                attachments.drop_pending(obstacles, request);
                report.dropped += 1;
                continue;
            }
            let (gum, other) = (request.gum(), request.other());
            let descriptor = *request.descriptor();

            let joint = match world.create_joint(&descriptor.joint_def()) {
                Ok(joint) => joint,
                Err(err) => {
                    log::warn!("could not weld gum {gum:?} to {other:?}: {err}");
                    attachments.drop_pending(obstacles, request);
                    report.dropped += 1;
                    continue;
                }
            };
            if let Err(err) = world
                .set_linear_velocity(descriptor.gum_body, Vec2::ZERO)
                .and_then(|()| world.set_angular_velocity(descriptor.gum_body, 0.0))
            {
                log::warn!("could not stop gum {gum:?}: {err}");
            }

            match attachments.record_realized(obstacles, world, request, joint) {
                Some(realized) => {
                    log::debug!(
                        "welded gum {gum:?} to {other:?} ({} joints)",
                        realized.stuck_count
                    );
                    report.realized.push((gum, other, realized));
                }
                None => {
                    if let Err(err) = world.destroy_joint(joint) {
                        log::warn!("could not undo weld of gum {gum:?}: {err}");
                    }
                    report.dropped += 1;
                }
            }
        }

        for request in attachments.dequeue_destroy_requests() {
            match world.destroy_joint(request.joint) {
                Ok(()) => {}
                Err(WorldError::UnknownJoint(joint)) => {
                    log::debug!("joint {joint:?} already gone with its body");
                }
                Err(err) => log::warn!("destroying joint failed: {err}"),
            }
            attachments.record_destroyed(obstacles, request);
            report.destroyed += 1;
        }

        for gum in attachments.dequeue_retiring() {
            if attachments.has_attachments(gum) {
                log::warn!("retiring gum {gum:?} that still holds joints");
            }
            // May already be flagged by `Level::remove_obstacle`
            if let Some(obstacle) = obstacles.get_mut(gum) {
                obstacle.mark_removed();
                report.retired.push(gum);
            }
        }

        self.realized_total += report.realized.len() as u64;
        self.destroyed_total += report.destroyed as u64;
        self.dropped_total += report.dropped as u64;
        report
    }
}

/// Gum still alive and both bodies still in the world
fn is_live(world: &PhysicsWorld, obstacles: &Obstacles, request: &PendingAttachment) -> bool {
    let descriptor = request.descriptor();
    obstacles.live_gum(request.gum()).is_some()
        && obstacles
            .get(request.other())
            .is_some_and(|o| !o.is_removed())
        && world.body(descriptor.gum_body).is_some()
        && world.body(descriptor.other_body).is_some()
}
