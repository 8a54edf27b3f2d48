//! Ragdoll domain
//!
//! Персонаж = упорядоченный набор limb segments (0 = torso, 1 = head, дальше
//! руки/ноги в порядке создания) + опциональное оружие + joints между ними.
//!
//! Конструирование в два прохода:
//! 1. `RagdollEntity::spawn`: тела и fixtures
//! 2. `RagdollEntity::create_joints`: joint graph (`JointTopologyBuilder`)

pub mod character;
pub mod segment;
pub mod topology;

pub use character::{layout_limbs, AttackMotor, CharacterState, RagdollEntity, SpawnParams};
pub use segment::{LimbSegment, PartStats, SegmentKind, Variant, WeaponSegment};
pub use topology::{JointLink, JointLinkKind, JointTopologyBuilder, RagdollParts};

/// Ссылка на часть персонажа (индекс конечности или оружие)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartRef {
    Limb(usize),
    Weapon,
}

/// Индекс руки с оружием
pub const WEAPON_ARM_INDEX: usize = 2;
