//! Physics engine contract
//!
//! Gameplay никогда не держит сырые указатели в движок: только generational
//! handles. Handle валиден между create и парным destroy; после destroy любой
//! вызов с ним возвращает `StaleBody`/`StaleJoint`.
//!
//! Движок передаётся явно (`&mut dyn PhysicsWorld`): никакого глобального
//! object creator'а, в тестах можно держать несколько независимых миров.
//!
//! Единицы: движок работает в метрах, gameplay в пикселях, перевод через
//! `PixelScale` (задаётся один раз при старте).

use bevy::math::Vec2;
use bevy_rapier3d::prelude::CollisionGroups;

use crate::error::Result;

pub mod collision;
pub mod rapier_world;
pub mod shape_cache;

pub use collision::{groups_interact, PartCategory};
pub use rapier_world::RapierWorld;
pub use shape_cache::{ShapeCache, ShapeTemplate};

/// Handle rigid body (arena index + generation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle {
    pub index: u32,
    pub generation: u32,
}

/// Handle joint'а (arena index + generation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointHandle {
    pub index: u32,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    Static,
    Kinematic,
    #[default]
    Dynamic,
}

/// Описание fixture (одна collision shape на теле)
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureDef {
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub is_sensor: bool,
    pub groups: CollisionGroups,
    /// Полигон в метрах, локально относительно центра тела
    pub vertices: Vec<Vec2>,
}

impl FixtureDef {
    /// Box fixture с half extents (метры)
    pub fn boxed(half_extents: Vec2, groups: CollisionGroups) -> Self {
        let h = half_extents;
        Self {
            density: 1.0,
            friction: 0.4,
            restitution: 0.2,
            is_sensor: false,
            groups,
            vertices: vec![
                Vec2::new(-h.x, -h.y),
                Vec2::new(h.x, -h.y),
                Vec2::new(h.x, h.y),
                Vec2::new(-h.x, h.y),
            ],
        }
    }

    /// Локальный AABB полигона (min, max) относительно центра тела
    pub fn bounds(&self) -> (Vec2, Vec2) {
        let Some(first) = self.vertices.first() else {
            return (Vec2::ZERO, Vec2::ZERO);
        };
        self.vertices
            .iter()
            .fold((*first, *first), |(min, max), v| (min.min(*v), max.max(*v)))
    }

    pub fn half_extents(&self) -> Vec2 {
        let (min, max) = self.bounds();
        (max - min) * 0.5
    }

    pub fn area(&self) -> f32 {
        let size = self.half_extents() * 2.0;
        size.x * size.y
    }
}

/// Описание тела для `PhysicsWorld::create_body`
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    pub body_type: BodyType,
    /// Метры
    pub position: Vec2,
    /// Радианы
    pub angle: f32,
    pub fixture: FixtureDef,
}

/// Мотор revolute joint'а
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointMotor {
    pub enabled: bool,
    /// rad/s
    pub speed: f32,
    pub max_torque: f32,
}

impl JointMotor {
    pub const DISABLED: Self = Self {
        enabled: false,
        speed: 0.0,
        max_torque: 0.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointKind {
    /// Скольжение body_b вдоль `axis` в пределах [lower, upper]
    Prismatic { axis: Vec2, lower: f32, upper: f32 },
    /// Вращение body_b вокруг anchor
    Revolute,
    /// Жёсткая связь
    Weld,
}

/// Описание joint'а; body_a: родитель, body_b: ограничиваемое тело
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointDesc {
    pub kind: JointKind,
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// World anchor (метры)
    pub anchor: Vec2,
    pub motor: Option<JointMotor>,
}

/// Begin/end contact от движка
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEvent {
    Started(BodyHandle, BodyHandle),
    Ended(BodyHandle, BodyHandle),
}

/// Фиксированный коэффициент пиксели ↔ метры
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelScale {
    pub pixels_per_meter: f32,
}

impl Default for PixelScale {
    fn default() -> Self {
        Self {
            pixels_per_meter: 32.0,
        }
    }
}

impl PixelScale {
    pub fn new(pixels_per_meter: f32) -> Self {
        Self { pixels_per_meter }
    }

    pub fn to_meters(&self, pixels: f32) -> f32 {
        pixels / self.pixels_per_meter
    }

    pub fn to_pixels(&self, meters: f32) -> f32 {
        meters * self.pixels_per_meter
    }

    pub fn vec_to_meters(&self, pixels: Vec2) -> Vec2 {
        pixels / self.pixels_per_meter
    }

    pub fn vec_to_pixels(&self, meters: Vec2) -> Vec2 {
        meters * self.pixels_per_meter
    }
}

/// Контракт физического движка (body/joint factory + силы + contacts)
///
/// Все вызовы происходят на gameplay потоке. `destroy_body` обязан отказать,
/// если на тело ещё ссылаются joints: joints всегда уничтожаются первыми.
pub trait PhysicsWorld: Send + Sync {
    fn create_body(&mut self, desc: &BodyDesc) -> BodyHandle;
    fn destroy_body(&mut self, body: BodyHandle) -> Result<()>;
    fn attach_fixtures(&mut self, body: BodyHandle, fixtures: &[FixtureDef]) -> Result<()>;

    fn create_joint(&mut self, desc: &JointDesc) -> Result<JointHandle>;
    fn destroy_joint(&mut self, joint: JointHandle) -> Result<()>;
    fn set_joint_motor(&mut self, joint: JointHandle, motor: JointMotor) -> Result<()>;
    fn joint_motor(&self, joint: JointHandle) -> Result<Option<JointMotor>>;

    fn apply_force_to_center(&mut self, body: BodyHandle, force: Vec2) -> Result<()>;
    fn apply_angular_impulse(&mut self, body: BodyHandle, impulse: f32) -> Result<()>;

    /// Позиция центра тела (метры)
    fn body_position(&self, body: BodyHandle) -> Result<Vec2>;
    fn body_angle(&self, body: BodyHandle) -> Result<f32>;

    fn contains_body(&self, body: BodyHandle) -> bool;
    fn contains_joint(&self, joint: JointHandle) -> bool;

    fn step(&mut self, dt: f32);
    /// Забирает накопленные за step contact события (в детерминированном порядке)
    fn drain_contacts(&mut self) -> Vec<ContactEvent>;

    fn scale(&self) -> PixelScale;
    fn set_scale(&mut self, scale: PixelScale);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_scale_roundtrip() {
        let scale = PixelScale::new(32.0);
        assert_eq!(scale.to_meters(64.0), 2.0);
        assert_eq!(scale.vec_to_pixels(Vec2::new(1.0, -0.5)), Vec2::new(32.0, -16.0));
    }

    #[test]
    fn test_box_fixture_extents() {
        let fixture = FixtureDef::boxed(Vec2::new(0.5, 1.0), CollisionGroups::default());
        assert_eq!(fixture.half_extents(), Vec2::new(0.5, 1.0));
        assert_eq!(fixture.area(), 2.0);
    }
}
