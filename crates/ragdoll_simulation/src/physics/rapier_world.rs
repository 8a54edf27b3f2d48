//! RapierWorld: `PhysicsWorld` поверх rapier (тот же rapier3d, что тянет bevy_rapier3d)
//!
//! Игра плоская, движок трёхмерный:
//! - тела заперты в плоскости XY (translation Z, вращение вокруг X/Y залочены)
//! - полигон fixture вытягивается в призму толщиной `SLAB_DEPTH`, так что
//!   масса = density × площадь полигона
//! - revolute joints вращаются вокруг Z, prismatic ось лежит в XY
//!
//! Силы в rapier постоянные, поэтому после каждого step они сбрасываются:
//! `apply_force_to_center` действует ровно один step.
//!
//! Contacts: rapier шлёт события по парам коллайдеров, здесь они сводятся к парам
//! тел (begin на первом касании, end на последнем) и сортируются, порядок не
//! зависит от потоков solver'а.

use std::collections::BTreeMap;
use std::sync::RwLock;

use bevy::math::Vec2;
use bevy_rapier3d::prelude::{CollisionGroups, Group};
use bevy_rapier3d::rapier::dynamics::{
    CCDSolver, FixedJointBuilder, GenericJoint, ImpulseJointHandle, ImpulseJointSet,
    IntegrationParameters, IslandManager, JointAxis, LockedAxes, MultibodyJointSet,
    PrismaticJointBuilder, RevoluteJointBuilder, RigidBody, RigidBodyBuilder, RigidBodyHandle,
    RigidBodySet, RigidBodyType,
};
use bevy_rapier3d::rapier::geometry::{
    ColliderBuilder, ColliderHandle, ColliderSet, CollisionEvent, ContactPair,
    DefaultBroadPhase, InteractionGroups, NarrowPhase,
};
use bevy_rapier3d::rapier::math::{Isometry, Point, Real, UnitVector, Vector};
use bevy_rapier3d::rapier::pipeline::{ActiveEvents, EventHandler, PhysicsPipeline};

use super::{
    BodyDesc, BodyHandle, BodyType, ContactEvent, FixtureDef, JointDesc, JointHandle, JointKind,
    JointMotor, PhysicsWorld, PixelScale,
};
use crate::config::PhysicsConfig;
use crate::error::{Result, SimulationError};
use crate::logger;

/// Толщина призмы fixture (метры)
pub const SLAB_DEPTH: f32 = 1.0;

/// Damping velocity-мотора revolute joint'а (чем больше, тем жёстче держит скорость)
const MOTOR_DAMPING: f32 = 100.0;

fn planar_axes() -> LockedAxes {
    LockedAxes::TRANSLATION_LOCKED_Z | LockedAxes::ROTATION_LOCKED_X | LockedAxes::ROTATION_LOCKED_Y
}

fn body_handle(handle: RigidBodyHandle) -> BodyHandle {
    let (index, generation) = handle.into_raw_parts();
    BodyHandle { index, generation }
}

fn rigid_body_handle(body: BodyHandle) -> RigidBodyHandle {
    RigidBodyHandle::from_raw_parts(body.index, body.generation)
}

fn joint_handle(handle: ImpulseJointHandle) -> JointHandle {
    let (index, generation) = handle.into_raw_parts();
    JointHandle { index, generation }
}

fn impulse_joint_handle(joint: JointHandle) -> ImpulseJointHandle {
    ImpulseJointHandle::from_raw_parts(joint.index, joint.generation)
}

fn ordered(a: BodyHandle, b: BodyHandle) -> (BodyHandle, BodyHandle) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn planar(v: Vec2) -> Vector<Real> {
    Vector::new(v.x, v.y, 0.0)
}

// ============================================================================
// Contact collector
// ============================================================================

/// Собирает collision события одного step (по образцу EventQueue в bevy_rapier)
#[derive(Default)]
struct ContactCollector {
    /// (started, body, body)
    events: RwLock<Vec<(bool, BodyHandle, BodyHandle)>>,
}

impl ContactCollector {
    fn into_sorted(self) -> Vec<(bool, BodyHandle, BodyHandle)> {
        let mut events = self.events.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        // end раньше begin той же пары
        events.sort();
        events
    }
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        // Коллайдер удалённого тела: пару уже забыл destroy_body
        let parent = |handle: ColliderHandle| colliders.get(handle).and_then(|collider| collider.parent());
        let (Some(a), Some(b)) = (parent(event.collider1()), parent(event.collider2())) else {
            return;
        };
        if a == b {
            return;
        }
        let (a, b) = ordered(body_handle(a), body_handle(b));
        if let Ok(mut events) = self.events.write() {
            events.push((event.started(), a, b));
        }
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

// ============================================================================
// World
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct JointRecord {
    kind: JointKind,
    body_a: BodyHandle,
    body_b: BodyHandle,
    motor: Option<JointMotor>,
}

pub struct RapierWorld {
    gravity: Vector<Real>,
    linear_damping: f32,
    angular_damping: f32,
    scale: PixelScale,

    integration: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,

    joints: BTreeMap<JointHandle, JointRecord>,
    /// Число касающихся пар коллайдеров на пару тел
    touching: BTreeMap<(BodyHandle, BodyHandle), usize>,
    pending_contacts: Vec<ContactEvent>,
}

impl Default for RapierWorld {
    fn default() -> Self {
        Self::new(&PhysicsConfig::default())
    }
}

impl RapierWorld {
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            gravity: planar(Vec2::from(config.gravity)),
            linear_damping: config.linear_damping,
            angular_damping: config.angular_damping,
            scale: PixelScale::new(config.pixels_per_meter),
            integration: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            joints: BTreeMap::new(),
            touching: BTreeMap::new(),
            pending_contacts: Vec::new(),
        }
    }

    /// Ручная подача contact события (тесты, внешние триггеры)
    pub fn inject_contact(&mut self, event: ContactEvent) {
        self.pending_contacts.push(event);
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn joint_count(&self) -> usize {
        self.impulse_joints.len()
    }

    /// Joints, ссылающиеся на тело (как body_a или body_b)
    pub fn joints_of(&self, body: BodyHandle) -> Vec<JointHandle> {
        self.joints
            .iter()
            .filter(|(_, record)| record.body_a == body || record.body_b == body)
            .map(|(handle, _)| *handle)
            .collect()
    }

    pub fn joint_kind(&self, joint: JointHandle) -> Option<JointKind> {
        self.joints.get(&joint).map(|record| record.kind)
    }

    pub fn linear_velocity(&self, body: BodyHandle) -> Result<Vec2> {
        let linvel = self.rigid_body(body)?.linvel();
        Ok(Vec2::new(linvel.x, linvel.y))
    }

    pub fn angular_velocity(&self, body: BodyHandle) -> Result<f32> {
        Ok(self.rigid_body(body)?.angvel().z)
    }

    /// Сила, накопленная до следующего step
    pub fn pending_force(&self, body: BodyHandle) -> Result<Vec2> {
        let force = self.rigid_body(body)?.user_force();
        Ok(Vec2::new(force.x, force.y))
    }

    /// Объединение collision groups всех fixtures тела
    pub fn collision_groups(&self, body: BodyHandle) -> Result<CollisionGroups> {
        let (memberships, filters) = self
            .rigid_body(body)?
            .colliders()
            .iter()
            .filter_map(|handle| self.colliders.get(*handle))
            .map(|collider| collider.collision_groups())
            .fold((0u32, 0u32), |(memberships, filters), groups| {
                (memberships | groups.memberships.bits(), filters | groups.filter.bits())
            });
        Ok(CollisionGroups::new(
            Group::from_bits_truncate(memberships),
            Group::from_bits_truncate(filters),
        ))
    }

    pub fn body_type(&self, body: BodyHandle) -> Result<BodyType> {
        Ok(match self.rigid_body(body)?.body_type() {
            RigidBodyType::Dynamic => BodyType::Dynamic,
            RigidBodyType::Fixed => BodyType::Static,
            RigidBodyType::KinematicPositionBased | RigidBodyType::KinematicVelocityBased => {
                BodyType::Kinematic
            }
        })
    }

    /// Телепорт тела (тесты contact detection)
    pub fn set_body_position(&mut self, body: BodyHandle, position: Vec2) -> Result<()> {
        self.rigid_body_mut(body)?.set_translation(planar(position), true);
        Ok(())
    }

    fn rigid_body(&self, body: BodyHandle) -> Result<&RigidBody> {
        self.bodies
            .get(rigid_body_handle(body))
            .ok_or(SimulationError::StaleBody(body))
    }

    fn rigid_body_mut(&mut self, body: BodyHandle) -> Result<&mut RigidBody> {
        self.bodies
            .get_mut(rigid_body_handle(body))
            .ok_or(SimulationError::StaleBody(body))
    }

    fn pose(&self, body: BodyHandle) -> Result<Isometry<Real>> {
        Ok(*self.rigid_body(body)?.position())
    }

    /// Полигон → выпуклая призма, коллайдер цепляется к телу
    fn insert_collider(&mut self, body: RigidBodyHandle, fixture: &FixtureDef) -> Result<()> {
        let half_depth = SLAB_DEPTH * 0.5;
        let points: Vec<Point<Real>> = fixture
            .vertices
            .iter()
            .flat_map(|v| [Point::new(v.x, v.y, -half_depth), Point::new(v.x, v.y, half_depth)])
            .collect();
        let builder = ColliderBuilder::convex_hull(&points).ok_or_else(|| {
            SimulationError::DegenerateGeometry(format!(
                "fixture with {} vertices has no convex hull",
                fixture.vertices.len()
            ))
        })?;
        let collider = builder
            .density(fixture.density / SLAB_DEPTH)
            .friction(fixture.friction)
            .restitution(fixture.restitution)
            .sensor(fixture.is_sensor)
            .collision_groups(InteractionGroups::from(fixture.groups))
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.colliders.insert_with_parent(collider, body, &mut self.bodies);
        Ok(())
    }

    fn joint_data(&self, desc: &JointDesc) -> Result<GenericJoint> {
        let pose_a = self.pose(desc.body_a)?;
        let pose_b = self.pose(desc.body_b)?;
        let anchor = Point::new(desc.anchor.x, desc.anchor.y, 0.0);
        let anchor_a = pose_a.inverse_transform_point(&anchor);
        let anchor_b = pose_b.inverse_transform_point(&anchor);

        let data: GenericJoint = match desc.kind {
            JointKind::Weld => {
                // Кадры в точке anchor с мировой ориентацией: фиксируется текущий относительный угол
                let frame = Isometry::translation(anchor.x, anchor.y, 0.0);
                FixedJointBuilder::new()
                    .local_frame1(pose_a.inverse() * frame)
                    .local_frame2(pose_b.inverse() * frame)
                    .contacts_enabled(false)
                    .into()
            }
            JointKind::Prismatic { axis, lower, upper } => {
                let world_axis = planar(axis);
                let local_axis = |pose: &Isometry<Real>| {
                    UnitVector::try_new(pose.inverse_transform_vector(&world_axis), 1e-6).ok_or_else(|| {
                        SimulationError::DegenerateGeometry("prismatic joint axis is zero".into())
                    })
                };
                let mut data: GenericJoint = PrismaticJointBuilder::new(local_axis(&pose_a)?)
                    .local_anchor1(anchor_a)
                    .local_anchor2(anchor_b)
                    .limits([lower, upper])
                    .contacts_enabled(false)
                    .into();
                data.set_local_axis2(local_axis(&pose_b)?);
                data
            }
            JointKind::Revolute => {
                let mut data: GenericJoint = RevoluteJointBuilder::new(Vector::z_axis())
                    .local_anchor1(anchor_a)
                    .local_anchor2(anchor_b)
                    .contacts_enabled(false)
                    .into();
                apply_motor(&mut data, desc.motor.unwrap_or(JointMotor::DISABLED));
                data
            }
        };
        Ok(data)
    }
}

/// Velocity-мотор вокруг оси revolute joint'а; выключенный мотор не тянет
fn apply_motor(data: &mut GenericJoint, motor: JointMotor) {
    if motor.enabled {
        data.set_motor_velocity(JointAxis::AngX, motor.speed, MOTOR_DAMPING);
        data.set_motor_max_force(JointAxis::AngX, motor.max_torque);
    } else {
        data.set_motor_velocity(JointAxis::AngX, 0.0, 0.0);
        data.set_motor_max_force(JointAxis::AngX, 0.0);
    }
}

impl PhysicsWorld for RapierWorld {
    fn create_body(&mut self, desc: &BodyDesc) -> BodyHandle {
        let builder = match desc.body_type {
            BodyType::Static => RigidBodyBuilder::fixed(),
            BodyType::Kinematic => RigidBodyBuilder::kinematic_velocity_based(),
            BodyType::Dynamic => RigidBodyBuilder::dynamic(),
        };
        let body = builder
            .translation(planar(desc.position))
            .rotation(Vector::new(0.0, 0.0, desc.angle))
            .locked_axes(planar_axes())
            .linear_damping(self.linear_damping)
            .angular_damping(self.angular_damping)
            .build();
        let handle = self.bodies.insert(body);

        if let Err(err) = self.insert_collider(handle, &desc.fixture) {
            logger::log_warning(&format!(
                "RapierWorld::create_body: body {:?} left without fixture: {}",
                body_handle(handle),
                err
            ));
        }
        body_handle(handle)
    }

    fn destroy_body(&mut self, body: BodyHandle) -> Result<()> {
        let handle = rigid_body_handle(body);
        if !self.bodies.contains(handle) {
            return Err(SimulationError::StaleBody(body));
        }
        let joints = self.impulse_joints.attached_joints(handle).count();
        if joints > 0 {
            return Err(SimulationError::BodyHasJoints { body, joints });
        }

        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.touching.retain(|(a, b), _| *a != body && *b != body);
        Ok(())
    }

    fn attach_fixtures(&mut self, body: BodyHandle, fixtures: &[FixtureDef]) -> Result<()> {
        let handle = rigid_body_handle(body);
        if !self.bodies.contains(handle) {
            return Err(SimulationError::StaleBody(body));
        }
        for fixture in fixtures {
            self.insert_collider(handle, fixture)?;
        }
        Ok(())
    }

    fn create_joint(&mut self, desc: &JointDesc) -> Result<JointHandle> {
        let data = self.joint_data(desc)?;
        let handle = self.impulse_joints.insert(
            rigid_body_handle(desc.body_a),
            rigid_body_handle(desc.body_b),
            data,
            true,
        );
        let joint = joint_handle(handle);
        self.joints.insert(
            joint,
            JointRecord {
                kind: desc.kind,
                body_a: desc.body_a,
                body_b: desc.body_b,
                motor: desc.motor,
            },
        );
        Ok(joint)
    }

    fn destroy_joint(&mut self, joint: JointHandle) -> Result<()> {
        self.impulse_joints
            .remove(impulse_joint_handle(joint), true)
            .ok_or(SimulationError::StaleJoint(joint))?;
        self.joints.remove(&joint);
        Ok(())
    }

    fn set_joint_motor(&mut self, joint: JointHandle, motor: JointMotor) -> Result<()> {
        let stored = self
            .impulse_joints
            .get_mut(impulse_joint_handle(joint), true)
            .ok_or(SimulationError::StaleJoint(joint))?;
        apply_motor(&mut stored.data, motor);
        if let Some(record) = self.joints.get_mut(&joint) {
            record.motor = Some(motor);
        }
        Ok(())
    }

    fn joint_motor(&self, joint: JointHandle) -> Result<Option<JointMotor>> {
        self.joints
            .get(&joint)
            .map(|record| record.motor)
            .ok_or(SimulationError::StaleJoint(joint))
    }

    fn apply_force_to_center(&mut self, body: BodyHandle, force: Vec2) -> Result<()> {
        self.rigid_body_mut(body)?.add_force(planar(force), true);
        Ok(())
    }

    fn apply_angular_impulse(&mut self, body: BodyHandle, impulse: f32) -> Result<()> {
        self.rigid_body_mut(body)?
            .apply_torque_impulse(Vector::new(0.0, 0.0, impulse), true);
        Ok(())
    }

    fn body_position(&self, body: BodyHandle) -> Result<Vec2> {
        let translation = self.rigid_body(body)?.translation();
        Ok(Vec2::new(translation.x, translation.y))
    }

    fn body_angle(&self, body: BodyHandle) -> Result<f32> {
        Ok(self.rigid_body(body)?.rotation().scaled_axis().z)
    }

    fn contains_body(&self, body: BodyHandle) -> bool {
        self.bodies.contains(rigid_body_handle(body))
    }

    fn contains_joint(&self, joint: JointHandle) -> bool {
        self.impulse_joints.contains(impulse_joint_handle(joint))
    }

    fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        self.integration.dt = dt;

        let collector = ContactCollector::default();
        self.pipeline.step(
            &self.gravity,
            &self.integration,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            &(),
            &collector,
        );

        let pushed: Vec<RigidBodyHandle> = self
            .bodies
            .iter()
            .filter(|(_, body)| body.user_force() != Vector::zeros())
            .map(|(handle, _)| handle)
            .collect();
        for handle in pushed {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.reset_forces(false);
            }
        }

        for (started, a, b) in collector.into_sorted() {
            let pair = (a, b);
            if started {
                let count = self.touching.entry(pair).or_insert(0);
                *count += 1;
                if *count == 1 {
                    self.pending_contacts.push(ContactEvent::Started(a, b));
                }
            } else if let Some(count) = self.touching.get_mut(&pair) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.touching.remove(&pair);
                    self.pending_contacts.push(ContactEvent::Ended(a, b));
                }
            }
        }
    }

    fn drain_contacts(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.pending_contacts)
    }

    fn scale(&self) -> PixelScale {
        self.scale
    }

    fn set_scale(&mut self, scale: PixelScale) {
        self.scale = scale;
    }
}

#[cfg(test)]
#[path = "rapier_world_tests.rs"]
mod rapier_world_tests;
