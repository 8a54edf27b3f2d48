//! Body → owner registry
//!
//! Contact событие приносит только два `BodyHandle`. Registry отвечает, чьё это
//! тело и какая часть: без downcast'ов, просто lookup. Тела, которых здесь нет
//! (стены, уже уничтоженные персонажи), contact resolution игнорирует.

use std::collections::HashMap;

use super::CharacterId;
use crate::physics::BodyHandle;
use crate::ragdoll::{PartRef, RagdollEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyOwner {
    pub character: CharacterId,
    pub part: PartRef,
}

impl BodyOwner {
    pub fn is_weapon(&self) -> bool {
        self.part == PartRef::Weapon
    }

    pub fn limb_index(&self) -> Option<usize> {
        match self.part {
            PartRef::Limb(index) => Some(index),
            PartRef::Weapon => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BodyRegistry {
    owners: HashMap<BodyHandle, BodyOwner>,
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Регистрирует все тела персонажа
    pub fn register(&mut self, character: CharacterId, entity: &RagdollEntity) {
        for (body, part) in entity.bodies() {
            self.owners.insert(body, BodyOwner { character, part });
        }
    }

    /// Убирает все тела персонажа, возвращает сколько убрано
    pub fn unregister(&mut self, character: CharacterId) -> usize {
        let before = self.owners.len();
        self.owners.retain(|_, owner| owner.character != character);
        before - self.owners.len()
    }

    pub fn owner(&self, body: BodyHandle) -> Option<BodyOwner> {
        self.owners.get(&body).copied()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn bodies_of(&self, character: CharacterId) -> usize {
        self.owners.values().filter(|owner| owner.character == character).count()
    }
}
