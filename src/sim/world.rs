//! Stepped 2D rigid-body world
//!
//! A thin layer over rapier2d. Bodies, fixtures and joints are addressed by
//! slotmap handles; rapier's own handles never leave this module. Contact
//! begin/end events are collected while rapier steps and handed to a
//! `ContactListener` before `step` returns: ends first, then begins, each
//! group in fixture order.
//!
//! Listeners receive contact snapshots, never the world itself. `step` holds
//! `&mut self` for the whole callback window, so nothing can create or destroy
//! bodies, fixtures or joints while contacts are being reported.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use glam::Vec2;
use rapier2d::prelude::{
    ActiveEvents, CCDSolver, ColliderBuilder, ColliderHandle, ColliderSet, CollisionEvent,
    ContactPair, DefaultBroadPhase, EventHandler, FixedJointBuilder, Group, ImpulseJointHandle,
    ImpulseJointSet, IntegrationParameters, InteractionGroups, IslandManager, Isometry,
    MultibodyJointSet, NarrowPhase, PhysicsPipeline, Point, Real, RigidBodyBuilder,
    RigidBodyHandle, RigidBodySet, RigidBodyType, Vector,
};
use slotmap::{Key, KeyData, SlotMap, new_key_type};

use super::filter::CollisionFilter;
use super::obstacle::FixtureData;
use crate::consts::WELD_ITERATIONS;
use crate::error::WorldError;

new_key_type! {
    pub struct BodyHandle;
    pub struct FixtureHandle;
    pub struct JointHandle;
}

fn to_na(v: Vec2) -> Vector<Real> {
    Vector::new(v.x, v.y)
}

fn from_na(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

/// How a body participates in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// Never moves
    Static,
    /// Moves by its velocity only, unaffected by gravity or contacts
    Kinematic,
    /// Fully simulated
    Dynamic,
}

impl BodyType {
    fn to_rapier(self) -> RigidBodyType {
        match self {
            BodyType::Static => RigidBodyType::Fixed,
            BodyType::Kinematic => RigidBodyType::KinematicVelocityBased,
            BodyType::Dynamic => RigidBodyType::Dynamic,
        }
    }
}

/// Position and orientation of a body
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: Vec2,
    pub angle: f32,
}

/// Body construction parameters
#[derive(Debug, Clone)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub gravity_scale: f32,
    /// Contacts and joints never rotate the body
    pub fixed_rotation: bool,
}

impl BodyDef {
    pub fn new(body_type: BodyType, position: Vec2) -> Self {
        Self {
            body_type,
            position,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            gravity_scale: 1.0,
            fixed_rotation: false,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn with_fixed_rotation(mut self) -> Self {
        self.fixed_rotation = true;
        self
    }
}

/// Snapshot of a simulated body
#[derive(Debug, Clone)]
pub struct Body {
    pub body_type: BodyType,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub gravity_scale: f32,
    fixtures: Vec<FixtureHandle>,
}

impl Body {
    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            angle: self.angle,
        }
    }

    pub fn fixtures(&self) -> &[FixtureHandle] {
        &self.fixtures
    }
}

/// Collision shape, centered on the fixture offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle { radius: f32 },
    Box { half_extents: Vec2 },
}

impl Shape {
    fn collider(&self) -> ColliderBuilder {
        match *self {
            Shape::Circle { radius } => ColliderBuilder::ball(radius),
            Shape::Box { half_extents } => ColliderBuilder::cuboid(half_extents.x, half_extents.y),
        }
    }
}

/// Fixture construction parameters
#[derive(Debug, Clone)]
pub struct FixtureDef {
    pub shape: Shape,
    /// Shape center relative to the body origin
    pub offset: Vec2,
    pub filter: CollisionFilter,
    pub is_sensor: bool,
    pub density: f32,
    pub user_data: Option<FixtureData>,
}

impl FixtureDef {
    pub fn new(shape: Shape, filter: CollisionFilter) -> Self {
        Self {
            shape,
            offset: Vec2::ZERO,
            filter,
            is_sensor: false,
            density: 1.0,
            user_data: None,
        }
    }

    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    pub fn with_offset(mut self, offset: Vec2) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_user_data(mut self, data: FixtureData) -> Self {
        self.user_data = Some(data);
        self
    }
}

/// A shape attached to a body
#[derive(Debug, Clone)]
pub struct Fixture {
    pub body: BodyHandle,
    pub shape: Shape,
    pub offset: Vec2,
    pub filter: CollisionFilter,
    pub is_sensor: bool,
    pub density: f32,
    pub user_data: Option<FixtureData>,
    collider: ColliderHandle,
}

/// Rigid constraint between two bodies
///
/// Holds `body_b` at `local_anchor_a` in body A's frame, rotated by
/// `reference_angle` relative to body A.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeldJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub reference_angle: f32,
}

/// A live weld joint
#[derive(Debug, Clone)]
pub struct WeldJoint {
    pub def: WeldJointDef,
    /// Monotonic creation order
    pub serial: u64,
    impulse: ImpulseJointHandle,
}

/// One side of a contact, captured when the callback fires
#[derive(Debug, Clone)]
pub struct ContactFixture {
    pub fixture: FixtureHandle,
    pub body: BodyHandle,
    pub filter: CollisionFilter,
    pub is_sensor: bool,
    pub user_data: Option<FixtureData>,
    pub pose: Pose,
}

/// Two fixtures that began or stopped touching
#[derive(Debug, Clone)]
pub struct Contact {
    pub a: ContactFixture,
    pub b: ContactFixture,
}

/// Receives contact events during `PhysicsWorld::step`
pub trait ContactListener {
    fn begin_contact(&mut self, contact: &Contact);
    fn end_contact(&mut self, contact: &Contact);
}

/// Listener that ignores everything
pub struct NoopListener;

impl ContactListener for NoopListener {
    fn begin_contact(&mut self, _contact: &Contact) {}
    fn end_contact(&mut self, _contact: &Contact) {}
}

/// Category bits become rapier membership, the mask becomes its filter
fn interaction_groups(filter: CollisionFilter) -> InteractionGroups {
    InteractionGroups::new(
        Group::from_bits_truncate(u32::from(filter.category.bits())),
        Group::from_bits_truncate(u32::from(filter.mask.bits())),
    )
}

/// Collects rapier collision events during a step (no channels, no threads)
struct ContactCollector {
    events: Mutex<Vec<CollisionEvent>>,
}

impl ContactCollector {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn drain(&self) -> Vec<CollisionEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

#[derive(Debug, Clone)]
struct BodySlot {
    body_type: BodyType,
    rigid: RigidBodyHandle,
    fixtures: Vec<FixtureHandle>,
}

/// The physics world
pub struct PhysicsWorld {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    collector: ContactCollector,

    bodies: SlotMap<BodyHandle, BodySlot>,
    fixtures: SlotMap<FixtureHandle, Fixture>,
    joints: SlotMap<JointHandle, WeldJoint>,
    next_joint_serial: u64,
    /// Pairs touching at the end of the last step (ordered handles)
    touching: BTreeSet<(FixtureHandle, FixtureHandle)>,
    /// End events for contacts lost to `destroy_body`, reported next step
    orphaned: Vec<Contact>,
}

impl PhysicsWorld {
    pub fn new(gravity: Vec2) -> Self {
        Self {
            gravity: to_na(gravity),
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            collector: ContactCollector::new(),
            bodies: SlotMap::with_key(),
            fixtures: SlotMap::with_key(),
            joints: SlotMap::with_key(),
            next_joint_serial: 0,
            touching: BTreeSet::new(),
            orphaned: Vec::new(),
        }
        .with_weld_iterations(WELD_ITERATIONS)
    }

    /// Solver iterations per step, shared by welds and contacts
    pub fn with_weld_iterations(mut self, iterations: u32) -> Self {
        let iterations = NonZeroUsize::new(iterations as usize).unwrap_or(NonZeroUsize::MIN);
        self.integration_parameters.num_solver_iterations = iterations;
        self
    }

    // === Bodies and fixtures ===

    pub fn create_body(&mut self, def: &BodyDef) -> BodyHandle {
        let mut builder = RigidBodyBuilder::new(def.body_type.to_rapier())
            .translation(to_na(def.position))
            .rotation(def.angle)
            .linvel(to_na(def.linear_velocity))
            .angvel(def.angular_velocity)
            .gravity_scale(def.gravity_scale);
        if def.fixed_rotation {
            builder = builder.lock_rotations();
        }
        let rigid = self.rigid_bodies.insert(builder.build());
        self.bodies.insert(BodySlot {
            body_type: def.body_type,
            rigid,
            fixtures: Vec::new(),
        })
    }

    pub fn add_fixture(
        &mut self,
        body: BodyHandle,
        def: FixtureDef,
    ) -> Result<FixtureHandle, WorldError> {
        let rigid = self
            .bodies
            .get(body)
            .map(|slot| slot.rigid)
            .ok_or(WorldError::UnknownBody(body))?;

        let handle = self.fixtures.insert(Fixture {
            body,
            shape: def.shape,
            offset: def.offset,
            filter: def.filter,
            is_sensor: def.is_sensor,
            density: def.density,
            user_data: def.user_data,
            collider: ColliderHandle::invalid(),
        });
        // Sensors carry no mass
        let density = if def.is_sensor { 0.0 } else { def.density };
        let collider = def
            .shape
            .collider()
            .translation(to_na(def.offset))
            .sensor(def.is_sensor)
            .density(density)
            .collision_groups(interaction_groups(def.filter))
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .user_data(u128::from(handle.data().as_ffi()))
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, rigid, &mut self.rigid_bodies);

        if let Some(fixture) = self.fixtures.get_mut(handle) {
            fixture.collider = collider;
        }
        if let Some(slot) = self.bodies.get_mut(body) {
            slot.fixtures.push(handle);
        }
        Ok(handle)
    }

    /// Remove a body with its fixtures and joints
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<(), WorldError> {
        let fixtures = self
            .bodies
            .get(handle)
            .map(|slot| slot.fixtures.clone())
            .ok_or(WorldError::UnknownBody(handle))?;

        let lost: Vec<_> = self
            .touching
            .iter()
            .copied()
            .filter(|(a, b)| fixtures.contains(a) || fixtures.contains(b))
            .collect();
        for pair in lost {
            if let Some(contact) = self.snapshot(pair) {
                self.orphaned.push(contact);
            }
            self.touching.remove(&pair);
        }

        self.joints
            .retain(|_, j| j.def.body_a != handle && j.def.body_b != handle);
        for fixture in fixtures {
            self.fixtures.remove(fixture);
        }
        if let Some(slot) = self.bodies.remove(handle) {
            // Takes the body's colliders and rapier joints with it
            self.rigid_bodies.remove(
                slot.rigid,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            );
        }
        Ok(())
    }

    pub fn body(&self, handle: BodyHandle) -> Option<Body> {
        let slot = self.bodies.get(handle)?;
        let rb = self.rigid_bodies.get(slot.rigid)?;
        Some(Body {
            body_type: slot.body_type,
            position: from_na(rb.translation()),
            angle: rb.rotation().angle(),
            linear_velocity: from_na(rb.linvel()),
            angular_velocity: rb.angvel(),
            gravity_scale: rb.gravity_scale(),
            fixtures: slot.fixtures.clone(),
        })
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn fixture(&self, handle: FixtureHandle) -> Option<&Fixture> {
        self.fixtures.get(handle)
    }

    pub fn set_linear_velocity(
        &mut self,
        handle: BodyHandle,
        velocity: Vec2,
    ) -> Result<(), WorldError> {
        let rigid = self.rigid(handle)?;
        if let Some(rb) = self.rigid_bodies.get_mut(rigid) {
            rb.set_linvel(to_na(velocity), true);
        }
        Ok(())
    }

    pub fn set_angular_velocity(&mut self, handle: BodyHandle, omega: f32) -> Result<(), WorldError> {
        let rigid = self.rigid(handle)?;
        if let Some(rb) = self.rigid_bodies.get_mut(rigid) {
            rb.set_angvel(omega, true);
        }
        Ok(())
    }

    pub fn filter(&self, fixture: FixtureHandle) -> Option<CollisionFilter> {
        self.fixtures.get(fixture).map(|f| f.filter)
    }

    /// Takes effect from the next step; pairs the new filter rejects end then
    pub fn set_filter(
        &mut self,
        fixture: FixtureHandle,
        filter: CollisionFilter,
    ) -> Result<(), WorldError> {
        let f = self
            .fixtures
            .get_mut(fixture)
            .ok_or(WorldError::UnknownFixture(fixture))?;
        f.filter = filter;
        if let Some(collider) = self.colliders.get_mut(f.collider) {
            collider.set_collision_groups(interaction_groups(filter));
        }
        Ok(())
    }

    fn rigid(&self, handle: BodyHandle) -> Result<RigidBodyHandle, WorldError> {
        self.bodies
            .get(handle)
            .map(|slot| slot.rigid)
            .ok_or(WorldError::UnknownBody(handle))
    }

    // === Joints ===

    /// Welded pairs never collide with each other
    pub fn create_joint(&mut self, def: &WeldJointDef) -> Result<JointHandle, WorldError> {
        let rigid_a = self.rigid(def.body_a)?;
        let rigid_b = self.rigid(def.body_b)?;
        if def.body_a == def.body_b {
            return Err(WorldError::SelfJoint(def.body_a));
        }

        let weld = FixedJointBuilder::new()
            .local_frame1(Isometry::new(to_na(def.local_anchor_a), def.reference_angle))
            .local_anchor2(Point::new(def.local_anchor_b.x, def.local_anchor_b.y))
            .contacts_enabled(false)
            .build();
        let impulse = self.impulse_joints.insert(rigid_a, rigid_b, weld, true);

        let serial = self.next_joint_serial;
        self.next_joint_serial += 1;
        Ok(self.joints.insert(WeldJoint {
            def: *def,
            serial,
            impulse,
        }))
    }

    pub fn destroy_joint(&mut self, handle: JointHandle) -> Result<(), WorldError> {
        let joint = self
            .joints
            .remove(handle)
            .ok_or(WorldError::UnknownJoint(handle))?;
        self.impulse_joints.remove(joint.impulse, true);
        Ok(())
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&WeldJoint> {
        self.joints.get(handle)
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn joints_in_creation_order(&self) -> Vec<JointHandle> {
        let mut joints: Vec<_> = self.joints.iter().map(|(h, j)| (j.serial, h)).collect();
        joints.sort_by_key(|(serial, _)| *serial);
        joints.into_iter().map(|(_, h)| h).collect()
    }

    pub fn joints_of_body(&self, body: BodyHandle) -> Vec<JointHandle> {
        self.joints
            .iter()
            .filter(|(_, j)| j.def.body_a == body || j.def.body_b == body)
            .map(|(h, _)| h)
            .collect()
    }

    // === Contacts ===

    pub fn is_touching(&self, a: FixtureHandle, b: FixtureHandle) -> bool {
        self.touching.contains(&ordered(a, b))
    }

    pub fn contact_count(&self) -> usize {
        self.touching.len()
    }

    /// Advance the world by `dt`, reporting contact changes to `listener`
    pub fn step(&mut self, dt: f32, listener: &mut dyn ContactListener) {
        for contact in std::mem::take(&mut self.orphaned) {
            listener.end_contact(&contact);
        }

        self.integration_parameters.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &self.collector,
        );

        // Last event per pair wins; removed colliders resolve to nothing
        let mut latest = BTreeMap::new();
        for event in self.collector.drain() {
            let (Some(a), Some(b)) = (
                self.fixture_of(event.collider1()),
                self.fixture_of(event.collider2()),
            ) else {
                continue;
            };
            latest.insert(ordered(a, b), event.started());
        }

        let mut ended = Vec::new();
        let mut began = Vec::new();
        for (pair, started) in latest {
            if started && self.touching.insert(pair) {
                began.push(pair);
            } else if !started && self.touching.remove(&pair) {
                ended.push(pair);
            }
        }

        for pair in ended {
            if let Some(contact) = self.snapshot(pair) {
                listener.end_contact(&contact);
            }
        }
        for pair in began {
            if let Some(contact) = self.snapshot(pair) {
                listener.begin_contact(&contact);
            }
        }
    }

    fn fixture_of(&self, collider: ColliderHandle) -> Option<FixtureHandle> {
        let data = self.colliders.get(collider)?.user_data;
        let handle = FixtureHandle::from(KeyData::from_ffi(data as u64));
        self.fixtures
            .get(handle)
            .filter(|f| f.collider == collider)
            .map(|_| handle)
    }

    fn snapshot(&self, (a, b): (FixtureHandle, FixtureHandle)) -> Option<Contact> {
        Some(Contact {
            a: self.snapshot_fixture(a)?,
            b: self.snapshot_fixture(b)?,
        })
    }

    fn snapshot_fixture(&self, handle: FixtureHandle) -> Option<ContactFixture> {
        let fixture = self.fixtures.get(handle)?;
        let slot = self.bodies.get(fixture.body)?;
        let rb = self.rigid_bodies.get(slot.rigid)?;
        Some(ContactFixture {
            fixture: handle,
            body: fixture.body,
            filter: fixture.filter,
            is_sensor: fixture.is_sensor,
            user_data: fixture.user_data,
            pose: Pose {
                position: from_na(rb.translation()),
                angle: rb.rotation().angle(),
            },
        })
    }
}

#[inline]
fn ordered(a: FixtureHandle, b: FixtureHandle) -> (FixtureHandle, FixtureHandle) {
    if a <= b { (a, b) } else { (b, a) }
}
