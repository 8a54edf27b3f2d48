//! Contact → damage resolution
//!
//! Contact пара (a, b) проверяется в обе стороны независимо:
//! - оружие a задело конечность b → удар по b
//! - оружие b задело конечность a → удар по a
//!
//! Оба удара могут сработать в одном callback'е. Оружие против оружия,
//! конечность против конечности и неизвестные тела (стены, уже удалённые
//! персонажи) ничего не дают.

use super::registry::BodyOwner;
use super::CharacterId;

/// Оружие `attacker` задело конечность `limb_index` персонажа `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub attacker: CharacterId,
    pub target: CharacterId,
    pub limb_index: usize,
}

fn weapon_on_limb(weapon: BodyOwner, limb: BodyOwner, allow_self_damage: bool) -> Option<Hit> {
    if !weapon.is_weapon() {
        return None;
    }
    let limb_index = limb.limb_index()?;
    if weapon.character == limb.character && !allow_self_damage {
        return None;
    }
    Some(Hit {
        attacker: weapon.character,
        target: limb.character,
        limb_index,
    })
}

/// Удары из одной contact пары (порядок: a как оружие, затем b как оружие)
pub fn resolve_hits(a: Option<BodyOwner>, b: Option<BodyOwner>, allow_self_damage: bool) -> Vec<Hit> {
    let (Some(a), Some(b)) = (a, b) else {
        return Vec::new();
    };
    [
        weapon_on_limb(a, b, allow_self_damage),
        weapon_on_limb(b, a, allow_self_damage),
    ]
    .into_iter()
    .flatten()
    .collect()
}
