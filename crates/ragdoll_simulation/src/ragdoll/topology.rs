//! Joint topology ragdoll'а
//!
//! - head: prismatic torso → head, ось (0, 1), ход ±head_slide
//! - weapon: revolute weapon arm → weapon, anchor в позиции руки, мотор выключен
//! - остальные конечности: weld к torso, anchor в позиции конечности
//!
//! Нет weapon arm (меньше 3 конечностей): revolute просто не создаётся.

use bevy::math::Vec2;

use super::PartRef;
use crate::error::Result;
use crate::logger;
use crate::physics::{BodyHandle, JointDesc, JointHandle, JointKind, JointMotor, PhysicsWorld};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointLinkKind {
    PrismaticHead,
    RevoluteWeapon,
    WeldLimb,
}

/// Non-owning handle joint'а + метаданные
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointLink {
    pub handle: JointHandle,
    pub kind: JointLinkKind,
    /// Часть, которую joint ограничивает (body_b)
    pub constrained: PartRef,
}

/// Тела одного ragdoll'а, собранные для первого прохода joints
#[derive(Debug, Clone, Default)]
pub struct RagdollParts {
    pub torso: Option<BodyHandle>,
    pub head: Option<BodyHandle>,
    /// (limb index, body)
    pub weapon_arm: Option<(usize, BodyHandle)>,
    pub weapon: Option<BodyHandle>,
    /// (limb index, body): всё, что не torso/head/weapon arm
    pub other_limbs: Vec<(usize, BodyHandle)>,
}

#[derive(Debug, Clone, Copy)]
pub struct JointTopologyBuilder {
    pub head_slide: f32,
}

impl Default for JointTopologyBuilder {
    fn default() -> Self {
        Self { head_slide: 0.2 }
    }
}

impl JointTopologyBuilder {
    pub fn new(head_slide: f32) -> Self {
        Self { head_slide }
    }

    /// Сколько joints даст `build` для раскладки
    pub fn expected_joint_count(limb_count: usize, has_weapon: bool) -> usize {
        let head = usize::from(limb_count >= 2);
        let weapon_arm = usize::from(limb_count >= 3 && has_weapon);
        let welds = limb_count.saturating_sub(2 + weapon_arm);
        head + weapon_arm + welds
    }

    /// Строит joint graph. При ошибке уже созданные joints откатываются.
    pub fn build(&self, world: &mut dyn PhysicsWorld, parts: &RagdollParts) -> Result<Vec<JointLink>> {
        let mut links = Vec::new();
        match self.build_into(world, parts, &mut links) {
            Ok(()) => Ok(links),
            Err(err) => {
                for link in links.iter().rev() {
                    if !world.contains_joint(link.handle) {
                        continue;
                    }
                    if let Err(rollback) = world.destroy_joint(link.handle) {
                        logger::log_error(&format!(
                            "JointTopologyBuilder::build: rollback of {:?} failed: {}",
                            link.kind, rollback
                        ));
                    }
                }
                Err(err)
            }
        }
    }

    fn build_into(
        &self,
        world: &mut dyn PhysicsWorld,
        parts: &RagdollParts,
        links: &mut Vec<JointLink>,
    ) -> Result<()> {
        let Some(torso) = parts.torso else {
            return Ok(());
        };

        if let Some(head) = parts.head {
            let anchor = world.body_position(head)?;
            let handle = world.create_joint(&JointDesc {
                kind: JointKind::Prismatic {
                    axis: Vec2::new(0.0, 1.0),
                    lower: -self.head_slide,
                    upper: self.head_slide,
                },
                body_a: torso,
                body_b: head,
                anchor,
                motor: None,
            })?;
            links.push(JointLink {
                handle,
                kind: JointLinkKind::PrismaticHead,
                constrained: PartRef::Limb(1),
            });
        }

        if let (Some((_, arm)), Some(weapon)) = (parts.weapon_arm, parts.weapon) {
            let anchor = world.body_position(arm)?;
            let handle = world.create_joint(&JointDesc {
                kind: JointKind::Revolute,
                body_a: arm,
                body_b: weapon,
                anchor,
                motor: Some(JointMotor::DISABLED),
            })?;
            links.push(JointLink {
                handle,
                kind: JointLinkKind::RevoluteWeapon,
                constrained: PartRef::Weapon,
            });
        }

        for &(index, limb) in &parts.other_limbs {
            let anchor = world.body_position(limb)?;
            let handle = world.create_joint(&JointDesc {
                kind: JointKind::Weld,
                body_a: torso,
                body_b: limb,
                anchor,
                motor: None,
            })?;
            links.push(JointLink {
                handle,
                kind: JointLinkKind::WeldLimb,
                constrained: PartRef::Limb(index),
            });
        }

        Ok(())
    }
}
