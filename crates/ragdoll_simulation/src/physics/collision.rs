//! Collision categories / masks частей ragdoll'а
//!
//! ## Категории (битовая маска, на каком слое тело):
//! - 1: Walls (карта, статические тела)
//! - 2: Arm
//! - 4: Leg
//! - 8: Head
//! - 16: Torso
//! - 32: Weapon
//!
//! ## Маски (с чем тело сталкивается):
//! - Legs сталкиваются только со стенами и оружием (ноги не цепляются за корпус)
//! - Weapon сталкивается со всем: по ней contact resolution отличает атакующего

use bevy_rapier3d::prelude::{CollisionGroups, Group};
use serde::{Deserialize, Serialize};

pub const CATEGORY_WALLS: u32 = 1;
pub const CATEGORY_ARM: u32 = 2;
pub const CATEGORY_LEG: u32 = 4;
pub const CATEGORY_HEAD: u32 = 8;
pub const CATEGORY_TORSO: u32 = 16;
pub const CATEGORY_WEAPON: u32 = 32;

pub const MASK_WALLS: u32 = 0xFFFF;
pub const MASK_ARM: u32 = CATEGORY_WALLS | CATEGORY_HEAD | CATEGORY_TORSO | CATEGORY_WEAPON;
pub const MASK_LEG: u32 = CATEGORY_WALLS | CATEGORY_WEAPON;
pub const MASK_HEAD: u32 = CATEGORY_WALLS | CATEGORY_ARM | CATEGORY_TORSO | CATEGORY_WEAPON;
pub const MASK_TORSO: u32 = CATEGORY_WALLS | CATEGORY_HEAD | CATEGORY_ARM | CATEGORY_WEAPON;
pub const MASK_WEAPON: u32 = 0xFFFF;

/// Категория тела для фильтра столкновений
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartCategory {
    Walls,
    Arm,
    Leg,
    Head,
    Torso,
    Weapon,
}

impl PartCategory {
    pub fn category_bits(self) -> u32 {
        match self {
            PartCategory::Walls => CATEGORY_WALLS,
            PartCategory::Arm => CATEGORY_ARM,
            PartCategory::Leg => CATEGORY_LEG,
            PartCategory::Head => CATEGORY_HEAD,
            PartCategory::Torso => CATEGORY_TORSO,
            PartCategory::Weapon => CATEGORY_WEAPON,
        }
    }

    pub fn mask_bits(self) -> u32 {
        match self {
            PartCategory::Walls => MASK_WALLS,
            PartCategory::Arm => MASK_ARM,
            PartCategory::Leg => MASK_LEG,
            PartCategory::Head => MASK_HEAD,
            PartCategory::Torso => MASK_TORSO,
            PartCategory::Weapon => MASK_WEAPON,
        }
    }

    /// Rapier collision groups (memberships = category, filters = mask)
    pub fn groups(self) -> CollisionGroups {
        CollisionGroups::new(
            Group::from_bits_truncate(self.category_bits()),
            Group::from_bits_truncate(self.mask_bits()),
        )
    }

    /// Обратное отображение по битам категории (для debug логов)
    pub fn from_category_bits(bits: u32) -> Option<Self> {
        match bits {
            CATEGORY_WALLS => Some(PartCategory::Walls),
            CATEGORY_ARM => Some(PartCategory::Arm),
            CATEGORY_LEG => Some(PartCategory::Leg),
            CATEGORY_HEAD => Some(PartCategory::Head),
            CATEGORY_TORSO => Some(PartCategory::Torso),
            CATEGORY_WEAPON => Some(PartCategory::Weapon),
            _ => None,
        }
    }
}

/// Box2D-style фильтр: A видит B и B видит A
pub fn groups_interact(a: CollisionGroups, b: CollisionGroups) -> bool {
    a.memberships.intersects(b.filters) && b.memberships.intersects(a.filters)
}
