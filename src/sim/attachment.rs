//! Attachment lifecycle
//!
//! Contact callbacks fire while the physics step is still running, when the
//! world must not gain or lose joints. So attachment is two-phase:
//!
//! 1. During the step, the dispatcher calls `enqueue_attachment`, which only
//!    records a weld descriptor in the pending-assembly queue.
//! 2. After the step, the `JointSynchronizer` drains that queue, creates the
//!    joints and reports each one back through `record_realized`.
//!
//! Detachment takes the same route: `unstick` queues destroy requests that the
//! synchronizer carries out.

use std::collections::VecDeque;

use glam::Vec2;

use super::obstacle::{ObstacleId, Obstacles};
use super::world::{BodyHandle, JointHandle, PhysicsWorld, Pose, WeldJointDef};
use crate::consts::MAX_STUCK;
use crate::{normalize_angle, rotate};

/// Everything needed to build a weld joint later, captured at contact time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeldDescriptor {
    /// The obstacle the gum landed on
    pub other_body: BodyHandle,
    pub gum_body: BodyHandle,
    /// Gum center in the other body's frame
    pub local_anchor: Vec2,
    /// Gum angle minus other body angle
    pub reference_angle: f32,
}

impl WeldDescriptor {
    pub fn between(other_body: BodyHandle, other: Pose, gum_body: BodyHandle, gum: Pose) -> Self {
        Self {
            other_body,
            gum_body,
            local_anchor: rotate(gum.position - other.position, -other.angle),
            reference_angle: normalize_angle(gum.angle - other.angle),
        }
    }

    pub fn joint_def(&self) -> WeldJointDef {
        WeldJointDef {
            body_a: self.other_body,
            body_b: self.gum_body,
            local_anchor_a: self.local_anchor,
            local_anchor_b: Vec2::ZERO,
            reference_angle: self.reference_angle,
        }
    }
}

/// A weld waiting for the synchronizer
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAttachment {
    gum: ObstacleId,
    other: ObstacleId,
    descriptor: WeldDescriptor,
}

impl PendingAttachment {
    pub fn gum(&self) -> ObstacleId {
        self.gum
    }

    pub fn other(&self) -> ObstacleId {
        self.other
    }

    pub fn descriptor(&self) -> &WeldDescriptor {
        &self.descriptor
    }

    /// Consumes the pending request: it cannot exist in both states
    fn realize(self, joint: JointHandle) -> RealizedAttachment {
        RealizedAttachment {
            gum: self.gum,
            other: self.other,
            joint,
        }
    }
}

/// A weld that exists in the physics world
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedAttachment {
    gum: ObstacleId,
    other: ObstacleId,
    joint: JointHandle,
}

impl RealizedAttachment {
    pub fn gum(&self) -> ObstacleId {
        self.gum
    }

    pub fn other(&self) -> ObstacleId {
        self.other
    }

    pub fn joint(&self) -> JointHandle {
        self.joint
    }
}

/// A gum/obstacle pairing, before or after its joint exists
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentRequest {
    Pending(PendingAttachment),
    Realized(RealizedAttachment),
}

impl AttachmentRequest {
    pub fn gum(&self) -> ObstacleId {
        match self {
            AttachmentRequest::Pending(p) => p.gum,
            AttachmentRequest::Realized(r) => r.gum,
        }
    }

    pub fn other(&self) -> ObstacleId {
        match self {
            AttachmentRequest::Pending(p) => p.other,
            AttachmentRequest::Realized(r) => r.other,
        }
    }

    pub fn joint(&self) -> Option<JointHandle> {
        match self {
            AttachmentRequest::Pending(_) => None,
            AttachmentRequest::Realized(r) => Some(r.joint),
        }
    }
}

/// A joint `unstick` wants gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyRequest {
    pub gum: ObstacleId,
    pub other: ObstacleId,
    pub joint: JointHandle,
}

/// One side of a contact as seen by the attachment resolver
#[derive(Debug, Clone, Copy)]
pub struct ContactSide {
    pub obstacle: ObstacleId,
    pub body: BodyHandle,
    pub pose: Pose,
}

/// Result of `enqueue_attachment`; everything but `Queued` is a no-op
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    GumMissing,
    GumNotAlive,
    /// Already holding or waiting on `MAX_STUCK` joints
    Saturated,
    /// The other side is gum, or unknown
    NotGummable,
    /// Same gum and obstacle are already paired
    Duplicate,
}

/// Result of `record_realized`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Realized {
    pub stuck_count: u8,
    /// The collision filter was narrowed by this realization
    pub narrowed: bool,
}

/// Owns the free-flight, pending-assembly and attached queues of one level
#[derive(Debug, Default)]
pub struct AttachmentLifecycleManager {
    free_flight: VecDeque<ObstacleId>,
    pending: VecDeque<PendingAttachment>,
    attached: VecDeque<RealizedAttachment>,
    destroy_requests: VecDeque<DestroyRequest>,
    /// Gums killed by `unstick`, swept by the synchronizer once jointless
    retiring: Vec<ObstacleId>,
    /// Gums fired and not yet landed (ammo/UI bookkeeping)
    in_flight: usize,
}

impl AttachmentLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    // === Queries ===

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn free_flight(&self) -> impl Iterator<Item = ObstacleId> + '_ {
        self.free_flight.iter().copied()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn attached_len(&self) -> usize {
        self.attached.len()
    }

    pub fn destroy_requests_len(&self) -> usize {
        self.destroy_requests.len()
    }

    /// Every request involving `gum`, pending first
    pub fn requests_for(&self, gum: ObstacleId) -> Vec<AttachmentRequest> {
        self.pending
            .iter()
            .filter(|p| p.gum == gum)
            .cloned()
            .map(AttachmentRequest::Pending)
            .chain(
                self.attached
                    .iter()
                    .filter(|r| r.gum == gum)
                    .cloned()
                    .map(AttachmentRequest::Realized),
            )
            .collect()
    }

    pub fn realized_joints(&self, gum: ObstacleId) -> Vec<JointHandle> {
        self.attached
            .iter()
            .filter(|r| r.gum == gum)
            .map(|r| r.joint)
            .collect()
    }

    /// Gum still has, or is about to get, a joint
    pub fn has_attachments(&self, gum: ObstacleId) -> bool {
        self.pending.iter().any(|p| p.gum == gum) || self.attached.iter().any(|r| r.gum == gum)
    }

    /// Anything left for the synchronizer to do for `gum`
    pub(crate) fn awaits_sync(&self, gum: ObstacleId) -> bool {
        self.has_attachments(gum)
            || self.destroy_requests.iter().any(|d| d.gum == gum)
            || self.retiring.contains(&gum)
    }

    fn is_paired(&self, gum: ObstacleId, other: ObstacleId) -> bool {
        self.pending.iter().any(|p| p.gum == gum && p.other == other)
            || self.attached.iter().any(|r| r.gum == gum && r.other == other)
    }

    // === Phase 1: contact time ===

    /// Track a freshly fired gum
    pub(crate) fn register_fired(&mut self, gum: ObstacleId) {
        self.free_flight.push_back(gum);
        self.in_flight += 1;
    }

    fn leave_free_flight(&mut self, gum: ObstacleId) {
        if let Some(index) = self.free_flight.iter().position(|&id| id == gum) {
            self.free_flight.remove(index);
            self.in_flight = self.in_flight.saturating_sub(1);
        }
    }

    /// Queue a weld between a gum and whatever it touched
    ///
    /// Never touches the physics world. The gum's velocity is zeroed and a
    /// slot is reserved so that `stuck_count + reserved` never exceeds
    /// `MAX_STUCK`.
    pub fn enqueue_attachment(
        &mut self,
        obstacles: &mut Obstacles,
        gum: ContactSide,
        other: ContactSide,
    ) -> EnqueueOutcome {
        let gummable = obstacles
            .get(other.obstacle)
            .is_some_and(|o| !o.is_removed() && o.kind.is_gummable());
        if !gummable {
            log::trace!("gum {:?} touched non-gummable {:?}", gum.obstacle, other.obstacle);
            return EnqueueOutcome::NotGummable;
        }
        if self.is_paired(gum.obstacle, other.obstacle) {
            return EnqueueOutcome::Duplicate;
        }

        let Some(projectile) = obstacles.gum_mut(gum.obstacle) else {
            return EnqueueOutcome::GumMissing;
        };
        if !projectile.alive() {
            return EnqueueOutcome::GumNotAlive;
        }
        if !projectile.reserve_slot() {
            log::trace!("gum {:?} saturated, ignoring contact", gum.obstacle);
            return EnqueueOutcome::Saturated;
        }
        projectile.freeze();

        self.leave_free_flight(gum.obstacle);
        self.pending.push_back(PendingAttachment {
            gum: gum.obstacle,
            other: other.obstacle,
            descriptor: WeldDescriptor::between(other.body, other.pose, gum.body, gum.pose),
        });
        log::debug!(
            "queued weld gum {:?} -> {:?} ({} pending)",
            gum.obstacle,
            other.obstacle,
            self.pending.len()
        );
        EnqueueOutcome::Queued
    }

    // === Phase 2: synchronizer only ===

    /// Take everything waiting for realization, oldest first
    pub(crate) fn dequeue_pending_for_realization(&mut self) -> Vec<PendingAttachment> {
        self.pending.drain(..).collect()
    }

    /// A joint now exists for `request`
    ///
    /// Reaching `MAX_STUCK` narrows the gum's filter, once, on every fixture
    /// of its body.
    pub(crate) fn record_realized(
        &mut self,
        obstacles: &mut Obstacles,
        world: &mut PhysicsWorld,
        request: PendingAttachment,
        joint: JointHandle,
    ) -> Option<Realized> {
        let (gum_body, stuck_count, narrowed, filter) = {
            let obstacle = obstacles.get_mut(request.gum)?;
            let body = obstacle.body;
            let gum = obstacle.as_gum_mut()?;
            let stuck_count = gum.confirm_slot();
            let narrowed = stuck_count >= MAX_STUCK && gum.narrow_filter();
            (body, stuck_count, narrowed, gum.filter())
        };

        if let Some(other) = obstacles.get_mut(request.other) {
            other.add_gum();
        }
        if narrowed {
            let fixtures = world
                .body(gum_body)
                .map(|b| b.fixtures().to_vec())
                .unwrap_or_default();
            for fixture in fixtures {
                if let Err(err) = world.set_filter(fixture, filter) {
                    log::warn!("could not narrow gum filter: {err}");
                }
            }
            log::info!("gum {:?} saturated, filter narrowed", request.gum);
        }

        self.attached.push_back(request.realize(joint));
        Some(Realized {
            stuck_count,
            narrowed,
        })
    }

    /// A pending request was not realized; give its slot back
    ///
    /// A live gum left with nothing to hold goes back into free flight.
    pub(crate) fn drop_pending(&mut self, obstacles: &mut Obstacles, request: PendingAttachment) {
        let mut back_in_flight = false;
        if let Some(gum) = obstacles.gum_mut(request.gum) {
            gum.release_slot();
            back_in_flight = gum.in_free_flight();
        }
        if back_in_flight && !self.free_flight.contains(&request.gum) {
            self.register_fired(request.gum);
        }
        log::debug!("dropped stale weld gum {:?} -> {:?}", request.gum, request.other);
    }

    pub(crate) fn dequeue_destroy_requests(&mut self) -> Vec<DestroyRequest> {
        self.destroy_requests.drain(..).collect()
    }

    /// The joint behind `request` is gone from the world
    pub(crate) fn record_destroyed(&mut self, obstacles: &mut Obstacles, request: DestroyRequest) {
        let before = self.attached.len();
        self.attached.retain(|r| r.joint != request.joint);
        if self.attached.len() == before {
            return;
        }
        if let Some(gum) = obstacles.gum_mut(request.gum) {
            gum.detach_one();
        }
        if let Some(other) = obstacles.get_mut(request.other) {
            other.remove_gum();
        }
    }

    pub(crate) fn dequeue_retiring(&mut self) -> Vec<ObstacleId> {
        std::mem::take(&mut self.retiring)
    }

    // === Commands ===

    /// Kill a gum and request destruction of each of its joints
    ///
    /// Returns how many joints were queued for destruction. Pending requests
    /// for the gum are dropped by the synchronizer's liveness check.
    pub fn unstick(&mut self, obstacles: &mut Obstacles, gum: ObstacleId) -> usize {
        let Some(projectile) = obstacles.gum_mut(gum) else {
            log::trace!("unstick ignored, {gum:?} is not a gum");
            return 0;
        };
        if !projectile.alive() {
            return 0;
        }
        projectile.kill();
        self.leave_free_flight(gum);

        let requests: Vec<DestroyRequest> = self
            .attached
            .iter()
            .filter(|r| r.gum == gum)
            .map(|r| DestroyRequest {
                gum,
                other: r.other,
                joint: r.joint,
            })
            .collect();
        let count = requests.len();
        self.destroy_requests.extend(requests);
        self.retiring.push(gum);
        log::debug!("unstick gum {gum:?}: {count} joints to destroy");
        count
    }

    /// Gums holding on to `other`, which is about to disappear
    pub fn gums_attached_to(&self, other: ObstacleId) -> Vec<ObstacleId> {
        let mut gums: Vec<ObstacleId> = self
            .pending
            .iter()
            .filter(|p| p.other == other)
            .map(|p| p.gum)
            .chain(self.attached.iter().filter(|r| r.other == other).map(|r| r.gum))
            .collect();
        gums.sort();
        gums.dedup();
        gums
    }

    /// Remove every trace of a gum that has been swept from the level
    pub(crate) fn forget_gum(&mut self, gum: ObstacleId) {
        self.leave_free_flight(gum);
        self.pending.retain(|p| p.gum != gum);
        self.attached.retain(|r| r.gum != gum);
        self.destroy_requests.retain(|d| d.gum != gum);
        self.retiring.retain(|&id| id != gum);
    }

    /// Clear every queue and counter for a level restart
    ///
    /// Unconditional: the in-flight counter can be zero while queues still
    /// hold requests.
    pub fn reset_all(&mut self) {
        log::info!(
            "resetting attachments ({} in flight, {} pending, {} attached)",
            self.in_flight,
            self.pending.len(),
            self.attached.len()
        );
        self.free_flight.clear();
        self.pending.clear();
        self.attached.clear();
        self.destroy_requests.clear();
        self.retiring.clear();
        self.in_flight = 0;
    }
}
