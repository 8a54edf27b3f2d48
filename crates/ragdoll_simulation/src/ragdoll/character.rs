//! RagdollEntity: персонаж из конечностей, оружия и joints
//!
//! ## Lifecycle:
//! `Alive → PendingDestruction → Destroyed`
//! - Alive: принимает движение, swing и урон
//! - PendingDestruction: ставит roster (grace timer живёт в roster'е), ragdoll
//!   уже взорван: joints отпущены, конечности разлетаются
//! - Destroyed: тела отданы движку, entity выбрасывается
//!
//! ## Attack motor:
//! `Idle ⇄ Swinging(timer)`: swing включает мотор revolute joint'а оружия,
//! знак скорости чередуется с каждым успешным swing.

use std::time::Duration;

use bevy::math::Vec2;
use bevy::time::{Timer, TimerMode};

use super::segment::{create_part_body, LimbSegment, PartStats, SegmentKind, Variant, WeaponSegment};
use super::topology::{JointLink, JointLinkKind, JointTopologyBuilder, RagdollParts};
use super::{PartRef, WEAPON_ARM_INDEX};
use crate::config::CharacterTuning;
use crate::error::{Result, SimulationError};
use crate::logger;
use crate::physics::shape_cache::SWORD_KEY;
use crate::physics::{BodyHandle, JointHandle, JointMotor, PhysicsWorld, ShapeCache};
use crate::DeterministicRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterState {
    Alive,
    PendingDestruction,
    Destroyed,
}

#[derive(Debug, Clone)]
pub enum AttackMotor {
    Idle,
    Swinging(Timer),
}

/// Параметры спавна одного персонажа
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnParams {
    pub variant: Variant,
    pub number_of_limbs: usize,
    /// (min, max) множителя размера части
    pub limb_size_range: Vec2,
    /// (min, max) множителя статов части
    pub stat_range: Vec2,
    /// Позиция torso в пикселях
    pub position: Vec2,
}

/// Раскладка конечностей по индексу: (kind, позиция в пикселях)
///
/// 0: torso, 1: head, чётные ≥ 2: руки (слева/справа по очереди, начиная
/// слева), нечётные ≥ 3: ноги (так же).
pub fn layout_limbs(number_of_limbs: usize, position: Vec2, tuning: &CharacterTuning) -> Vec<(SegmentKind, Vec2)> {
    let mut left_arm = true;
    let mut left_leg = true;

    (0..number_of_limbs)
        .map(|index| {
            let mut at = position;
            let kind = match index {
                0 => SegmentKind::Torso,
                1 => {
                    at += Vec2::from(tuning.head_offset);
                    SegmentKind::Head
                }
                _ if index % 2 == 0 => {
                    let kind = if left_arm {
                        at.x -= tuning.arm_offset_x;
                        SegmentKind::ArmLeft
                    } else {
                        at.x += tuning.arm_offset_x;
                        SegmentKind::ArmRight
                    };
                    at.y += index as f32;
                    left_arm = !left_arm;
                    kind
                }
                _ => {
                    let kind = if left_leg {
                        at.x -= tuning.leg_offset_x;
                        SegmentKind::LegLeft
                    } else {
                        at.x += tuning.leg_offset_x;
                        SegmentKind::LegRight
                    };
                    at.y -= tuning.leg_offset_y;
                    left_leg = !left_leg;
                    kind
                }
            };
            (kind, at)
        })
        .collect()
}

fn roll_size(base: Vec2, range: Vec2, rng: &mut DeterministicRng) -> Vec2 {
    let x = base.x * rng.roll_tenths(range.x, range.y);
    let y = base.y * rng.roll_tenths(range.x, range.y);
    // Нулевой ролл: размер спрайта как есть
    Vec2::new(
        if x == 0.0 { base.x } else { x },
        if y == 0.0 { base.y } else { y },
    )
}

fn roll_stats(base: f32, range: Vec2, rng: &mut DeterministicRng) -> PartStats {
    PartStats {
        health: base * rng.roll_tenths(range.x, range.y),
        speed: base * rng.roll_tenths(range.x, range.y),
        strength: base * rng.roll_tenths(range.x, range.y),
    }
}

/// Недособранный ragdoll: уже созданные тела уходят из мира, ошибка спавна
/// возвращается как есть
fn discard_bodies(
    world: &mut dyn PhysicsWorld,
    bodies: impl Iterator<Item = BodyHandle>,
    err: SimulationError,
) -> SimulationError {
    for body in bodies {
        if let Err(cleanup) = world.destroy_body(body) {
            logger::log_error(&format!("RagdollEntity::spawn: discard of {:?} failed: {}", body, cleanup));
        }
    }
    err
}

/// Персонаж (игрок или враг)
#[derive(Debug, Clone)]
pub struct RagdollEntity {
    variant: Variant,
    limbs: Vec<LimbSegment>,
    weapon: Option<WeaponSegment>,
    joints: Vec<JointLink>,
    joints_created: bool,

    health: f32,
    strength: f32,
    speed: f32,
    /// Делитель урона по агрегатному health (число конечностей при спавне)
    spawn_limb_count: usize,

    swing_left: bool,
    last_swing_direction: Option<Vec2>,
    state: CharacterState,
    attack: AttackMotor,
    damage_cooldown: Option<Timer>,

    tuning: CharacterTuning,
}

impl RagdollEntity {
    /// Первый проход: создаёт тела конечностей и оружия (joints: в `create_joints`)
    pub fn spawn(
        params: &SpawnParams,
        tuning: &CharacterTuning,
        rng: &mut DeterministicRng,
        world: &mut dyn PhysicsWorld,
        shapes: &ShapeCache,
    ) -> Result<Self> {
        if params.number_of_limbs == 0 {
            return Err(SimulationError::NoLimbs);
        }

        let layout = layout_limbs(params.number_of_limbs, params.position, tuning);

        // Все templates проверяем заранее: ошибка не должна оставить полсобранного ragdoll'а
        for (kind, _) in &layout {
            shapes.template(&kind.template_key(params.variant))?;
        }
        if layout.len() > WEAPON_ARM_INDEX {
            shapes.template(SWORD_KEY)?;
        }

        let mut limbs = Vec::with_capacity(layout.len());
        let mut weapon = None;

        for (index, (kind, position)) in layout.into_iter().enumerate() {
            let key = kind.template_key(params.variant);
            let size = roll_size(shapes.template(&key)?.size, params.limb_size_range, rng);
            let stats = roll_stats(tuning.part_base_stat, params.stat_range, rng);
            let body = match create_part_body(world, shapes, &key, kind.category(), position, size, 0.0) {
                Ok(body) => body,
                Err(err) => return Err(discard_bodies(world, limbs.iter().map(LimbSegment::body), err)),
            };
            limbs.push(LimbSegment::new(kind, params.variant, stats, body, size));

            if index == WEAPON_ARM_INDEX {
                let sword_size = shapes.template(SWORD_KEY)?.size;
                let stats = roll_stats(tuning.part_base_stat, params.stat_range, rng);
                let body = match create_part_body(
                    world,
                    shapes,
                    SWORD_KEY,
                    SegmentKind::Weapon.category(),
                    position + Vec2::from(tuning.weapon_offset),
                    sword_size,
                    tuning.weapon_angle_degrees,
                ) {
                    Ok(body) => body,
                    Err(err) => return Err(discard_bodies(world, limbs.iter().map(LimbSegment::body), err)),
                };
                weapon = Some(WeaponSegment::new(stats, body, sword_size));
            }
        }

        logger::log(&format!(
            "RagdollEntity::spawn: {:?} with {} limbs at {:?} (weapon: {})",
            params.variant,
            limbs.len(),
            params.position,
            weapon.is_some()
        ));

        Ok(Self {
            variant: params.variant,
            spawn_limb_count: limbs.len(),
            limbs,
            weapon,
            joints: Vec::new(),
            joints_created: false,
            health: tuning.base_health,
            strength: tuning.base_strength,
            speed: tuning.base_speed,
            swing_left: false,
            last_swing_direction: None,
            state: CharacterState::Alive,
            attack: AttackMotor::Idle,
            damage_cooldown: None,
            tuning: tuning.clone(),
        })
    }

    /// Второй проход: joint graph. Повторный вызов: no-op.
    pub fn create_joints(&mut self, world: &mut dyn PhysicsWorld) -> Result<()> {
        if self.joints_created {
            return Ok(());
        }

        let mut parts = RagdollParts {
            torso: self.limbs.first().map(LimbSegment::body),
            head: self.limbs.get(1).map(LimbSegment::body),
            weapon: self.weapon.as_ref().map(WeaponSegment::body),
            ..Default::default()
        };
        for (index, limb) in self.limbs.iter().enumerate().skip(2) {
            if index == WEAPON_ARM_INDEX {
                parts.weapon_arm = Some((index, limb.body()));
            } else {
                parts.other_limbs.push((index, limb.body()));
            }
        }

        self.joints = JointTopologyBuilder::new(self.tuning.head_slide).build(world, &parts)?;
        self.joints_created = true;
        Ok(())
    }

    /// Tick: attack motor и damage cooldown
    pub fn update(&mut self, delta: Duration, world: &mut dyn PhysicsWorld) -> Result<()> {
        let swing_finished = match &mut self.attack {
            AttackMotor::Swinging(timer) => {
                timer.tick(delta);
                timer.finished()
            }
            AttackMotor::Idle => false,
        };
        if swing_finished {
            self.stop_swing(world)?;
        }

        if let Some(timer) = self.damage_cooldown.as_mut() {
            timer.tick(delta);
            if timer.finished() {
                self.damage_cooldown = None;
            }
        }
        Ok(())
    }

    /// Запускает swing оружием. `false`: swing уже идёт, нет оружия или персонаж не жив.
    ///
    /// Направление запоминается, но мотор им пока не управляется.
    pub fn swing_in_direction(&mut self, from: Vec2, to: Vec2, world: &mut dyn PhysicsWorld) -> Result<bool> {
        if self.state != CharacterState::Alive || !matches!(self.attack, AttackMotor::Idle) {
            logger::log("RagdollEntity::swing_in_direction: ignored (swinging or not alive)");
            return Ok(false);
        }
        let Some(joint) = self.weapon_joint() else {
            return Ok(false);
        };

        let sign = if self.swing_left { -1.0 } else { 1.0 };
        world.set_joint_motor(
            joint,
            JointMotor {
                enabled: true,
                speed: sign * self.tuning.motor_speed,
                max_torque: self.tuning.motor_max_torque,
            },
        )?;

        self.attack = AttackMotor::Swinging(Timer::from_seconds(self.tuning.swing_secs, TimerMode::Once));
        self.swing_left = !self.swing_left;
        self.last_swing_direction = Some((from + to) * 0.5);
        Ok(true)
    }

    fn stop_swing(&mut self, world: &mut dyn PhysicsWorld) -> Result<()> {
        self.attack = AttackMotor::Idle;
        if let Some(joint) = self.weapon_joint() {
            if world.contains_joint(joint) {
                world.set_joint_motor(joint, JointMotor::DISABLED)?;
            }
        }
        Ok(())
    }

    /// Урон по конечности (с debounce).
    ///
    /// Агрегатный health −= raw / limbCount, health конечности −= raw / health
    /// (делитель не меньше epsilon). Возвращает true, если конечность отсечена.
    pub fn deal_damage(&mut self, limb_index: usize, raw_damage: f32) -> Result<bool> {
        let count = self.limbs.len();
        let limb = self
            .limbs
            .get(limb_index)
            .ok_or(SimulationError::LimbOutOfRange { index: limb_index, count })?;

        if self.state != CharacterState::Alive || limb.is_severed() {
            return Ok(false);
        }
        if self.damage_cooldown.is_some() {
            logger::log("RagdollEntity::deal_damage: debounced");
            return Ok(false);
        }

        self.damage_cooldown = Some(Timer::from_seconds(self.tuning.damage_cooldown_secs, TimerMode::Once));
        self.health -= raw_damage / self.spawn_limb_count as f32;

        let divisor = self.health.max(self.tuning.damage_divisor_epsilon);
        let limb = &mut self.limbs[limb_index];
        let severed = limb.deal_damage(raw_damage / divisor);
        if severed {
            limb.sever();
        }
        Ok(severed)
    }

    /// Урон атакующей стороны: base strength + сила живых конечностей
    pub fn damage(&self) -> f32 {
        self.strength
            + self
                .limbs
                .iter()
                .filter(|limb| !limb.is_severed())
                .map(LimbSegment::strength)
                .sum::<f32>()
    }

    /// Base speed + скорость живых конечностей
    pub fn total_speed(&self) -> f32 {
        self.speed
            + self
                .limbs
                .iter()
                .filter(|limb| !limb.is_severed())
                .map(LimbSegment::speed)
                .sum::<f32>()
    }

    /// Тянет torso к точке (пиксели). Скорость не ограничивается.
    pub fn move_character(&mut self, target: Vec2, world: &mut dyn PhysicsWorld) -> Result<bool> {
        if self.state != CharacterState::Alive {
            return Ok(false);
        }
        let direction = (target - self.position(world)?).normalize_or_zero();
        world.apply_force_to_center(self.torso().body(), direction * self.total_speed())?;
        Ok(true)
    }

    /// Позиция torso в пикселях
    pub fn position(&self, world: &dyn PhysicsWorld) -> Result<Vec2> {
        let meters = world.body_position(self.torso().body())?;
        Ok(world.scale().vec_to_pixels(meters))
    }

    /// `Alive → PendingDestruction`; повторный вызов: no-op (false)
    pub fn begin_pending_destruction(&mut self) -> bool {
        if self.state != CharacterState::Alive {
            return false;
        }
        self.state = CharacterState::PendingDestruction;
        true
    }

    /// Отпускает joints, которые держат отсечённую конечность (кроме revolute оружия)
    pub fn detach_limb(&mut self, limb_index: usize, world: &mut dyn PhysicsWorld) -> Result<Vec<JointHandle>> {
        let (released, kept): (Vec<JointLink>, Vec<JointLink>) = self.joints.iter().copied().partition(|link| {
            link.constrained == PartRef::Limb(limb_index) && link.kind != JointLinkKind::RevoluteWeapon
        });
        self.joints = kept;

        let mut handles = Vec::with_capacity(released.len());
        for link in released {
            if world.contains_joint(link.handle) {
                world.destroy_joint(link.handle)?;
            }
            handles.push(link.handle);
        }
        Ok(handles)
    }

    /// Мотор off, все joints персонажа → движок
    pub fn release_joints(&mut self, world: &mut dyn PhysicsWorld) -> Result<()> {
        self.stop_swing(world)?;

        for link in std::mem::take(&mut self.joints) {
            if world.contains_joint(link.handle) {
                world.destroy_joint(link.handle)?;
            }
        }
        Ok(())
    }

    /// Взрыв ragdoll'а: `release_joints` + случайный torque каждой живой конечности.
    ///
    /// Тела остаются в мире: разлёт виден, пока roster держит grace timer.
    pub fn explode(&mut self, world: &mut dyn PhysicsWorld, rng: &mut DeterministicRng) -> Result<()> {
        self.release_joints(world)?;

        let [lo, hi] = self.tuning.destruction_torque;
        let mut previous = None;
        for limb in self.limbs.iter().filter(|limb| !limb.is_severed()) {
            // Два одинаковых torque подряд перебрасываются
            let torque = loop {
                let roll = rng.range_i32(lo, hi);
                if lo == hi || previous != Some(roll) {
                    break roll;
                }
            };
            previous = Some(torque);
            world.apply_angular_impulse(limb.body(), torque as f32)?;
        }
        Ok(())
    }

    /// Отдаёт все тела движку (joints уже должны быть уничтожены)
    pub fn release_bodies(&mut self, world: &mut dyn PhysicsWorld) -> Result<()> {
        for body in self.bodies().into_iter().map(|(body, _)| body) {
            if world.contains_body(body) {
                world.destroy_body(body)?;
            }
        }
        self.state = CharacterState::Destroyed;
        Ok(())
    }

    /// Все тела персонажа с указанием части
    pub fn bodies(&self) -> Vec<(BodyHandle, PartRef)> {
        let mut bodies: Vec<(BodyHandle, PartRef)> = self
            .limbs
            .iter()
            .enumerate()
            .map(|(index, limb)| (limb.body(), PartRef::Limb(index)))
            .collect();
        if let Some(weapon) = &self.weapon {
            bodies.push((weapon.body(), PartRef::Weapon));
        }
        bodies
    }

    pub fn weapon_joint(&self) -> Option<JointHandle> {
        self.joints
            .iter()
            .find(|link| link.kind == JointLinkKind::RevoluteWeapon)
            .map(|link| link.handle)
    }

    fn torso(&self) -> &LimbSegment {
        // spawn гарантирует хотя бы одну конечность
        &self.limbs[0]
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn is_player(&self) -> bool {
        self.variant == Variant::Player
    }

    pub fn limbs(&self) -> &[LimbSegment] {
        &self.limbs
    }

    pub fn limb(&self, index: usize) -> Option<&LimbSegment> {
        self.limbs.get(index)
    }

    pub fn weapon(&self) -> Option<&WeaponSegment> {
        self.weapon.as_ref()
    }

    pub fn joints(&self) -> &[JointLink] {
        &self.joints
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    /// Выставляет агрегатный health (сценарии и отладка)
    pub fn set_health(&mut self, health: f32) {
        self.health = health;
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0.0
    }

    pub fn spawn_limb_count(&self) -> usize {
        self.spawn_limb_count
    }

    pub fn state(&self) -> CharacterState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.state == CharacterState::Alive
    }

    pub fn attack_motor(&self) -> &AttackMotor {
        &self.attack
    }

    pub fn is_swinging(&self) -> bool {
        matches!(self.attack, AttackMotor::Swinging(_))
    }

    pub fn damage_cooldown_active(&self) -> bool {
        self.damage_cooldown.is_some()
    }

    /// Последнее запрошенное направление swing (середина from/to)
    pub fn last_swing_direction(&self) -> Option<Vec2> {
        self.last_swing_direction
    }
}

#[cfg(test)]
#[path = "character_tests.rs"]
mod character_tests;
