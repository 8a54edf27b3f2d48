//! Limb / weapon segments
//!
//! Segment держит non-owning `BodyHandle` (телом владеет движок) и свои статы.
//! Health только убывает; при health ≤ 0 конечность помечается severed и
//! выпадает из агрегатных сумм (damage, speed).

use bevy::math::Vec2;

use crate::error::Result;
use crate::physics::shape_cache::SWORD_KEY;
use crate::physics::{BodyDesc, BodyHandle, BodyType, FixtureDef, PartCategory, PhysicsWorld, ShapeCache};

/// Игрок или враг (определяет набор fixture templates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Player,
    Enemy,
}

impl Variant {
    pub fn template_prefix(self) -> &'static str {
        match self {
            Variant::Player => "Char",
            Variant::Enemy => "Demon",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Torso,
    Head,
    ArmLeft,
    ArmRight,
    LegLeft,
    LegRight,
    Weapon,
}

impl SegmentKind {
    pub fn category(self) -> PartCategory {
        match self {
            SegmentKind::Torso => PartCategory::Torso,
            SegmentKind::Head => PartCategory::Head,
            SegmentKind::ArmLeft | SegmentKind::ArmRight => PartCategory::Arm,
            SegmentKind::LegLeft | SegmentKind::LegRight => PartCategory::Leg,
            SegmentKind::Weapon => PartCategory::Weapon,
        }
    }

    /// Ключ fixture template ("CharArmLeft", "DemonTorso", "Sword")
    pub fn template_key(self, variant: Variant) -> String {
        let suffix = match self {
            SegmentKind::Torso => "Torso",
            SegmentKind::Head => "Head",
            SegmentKind::ArmLeft => "ArmLeft",
            SegmentKind::ArmRight => "ArmRight",
            SegmentKind::LegLeft => "LegLeft",
            SegmentKind::LegRight => "LegRight",
            SegmentKind::Weapon => return SWORD_KEY.to_string(),
        };
        format!("{}{}", variant.template_prefix(), suffix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartStats {
    pub health: f32,
    pub speed: f32,
    pub strength: f32,
}

/// Конечность ragdoll'а
#[derive(Debug, Clone)]
pub struct LimbSegment {
    kind: SegmentKind,
    variant: Variant,
    stats: PartStats,
    body: BodyHandle,
    /// Пиксели
    size: Vec2,
    severed: bool,
}

impl LimbSegment {
    pub fn new(kind: SegmentKind, variant: Variant, stats: PartStats, body: BodyHandle, size: Vec2) -> Self {
        Self {
            kind,
            variant,
            stats,
            body,
            size,
            severed: false,
        }
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn stats(&self) -> PartStats {
        self.stats
    }

    pub fn health(&self) -> f32 {
        self.stats.health
    }

    pub fn speed(&self) -> f32 {
        self.stats.speed
    }

    pub fn strength(&self) -> f32 {
        self.stats.strength
    }

    pub fn category(&self) -> PartCategory {
        self.kind.category()
    }

    pub fn is_severed(&self) -> bool {
        self.severed
    }

    pub fn sever(&mut self) {
        self.severed = true;
    }

    /// Вычитает урон; отрицательный урон игнорируется (health не растёт).
    /// Возвращает true, если health ≤ 0.
    pub fn deal_damage(&mut self, amount: f32) -> bool {
        self.stats.health -= amount.max(0.0);
        self.stats.health <= 0.0
    }
}

/// Оружие (та же форма, что и limb, но категория Weapon)
#[derive(Debug, Clone)]
pub struct WeaponSegment {
    stats: PartStats,
    body: BodyHandle,
    size: Vec2,
}

impl WeaponSegment {
    pub fn new(stats: PartStats, body: BodyHandle, size: Vec2) -> Self {
        Self { stats, body, size }
    }

    pub fn kind(&self) -> SegmentKind {
        SegmentKind::Weapon
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn stats(&self) -> PartStats {
        self.stats
    }

    pub fn strength(&self) -> f32 {
        self.stats.strength
    }

    pub fn category(&self) -> PartCategory {
        PartCategory::Weapon
    }
}

/// Создаёт dynamic тело части: box fixture по размеру + fixtures из template.
///
/// `position` и `size` в пикселях, `angle_degrees` в градусах.
pub fn create_part_body(
    world: &mut dyn PhysicsWorld,
    shapes: &ShapeCache,
    key: &str,
    category: PartCategory,
    position: Vec2,
    size: Vec2,
    angle_degrees: f32,
) -> Result<BodyHandle> {
    // Проверяем template до создания тела, чтобы не оставить тело-сироту
    shapes.template(key)?;

    let scale = world.scale();
    let mut fixture = FixtureDef::boxed(scale.vec_to_meters(size * 0.5), category.groups());
    fixture.density = 2.0;
    let body = world.create_body(&BodyDesc {
        body_type: BodyType::Dynamic,
        position: scale.vec_to_meters(position),
        angle: angle_degrees.to_radians(),
        fixture,
    });
    if let Err(err) = shapes.add_fixtures(world, body, key) {
        world.destroy_body(body)?;
        return Err(err);
    }
    Ok(body)
}
