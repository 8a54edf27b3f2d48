//! Ошибки симуляции
//!
//! Таксономия:
//! - invariant violations (stale handle, пустой ragdoll): фатальные, пробрасываются через `?`
//! - missing data (нет fixture template по ключу): тоже фатальные
//! - degenerate layouts (нет weapon arm): НЕ ошибка, joint просто не создаётся
//! - debounce no-op (cooldown активен): НЕ ошибка, возвращаем `false`

use thiserror::Error;

use crate::physics::{BodyHandle, JointHandle};
use crate::roster::CharacterId;

pub type Result<T> = std::result::Result<T, SimulationError>;

#[derive(Debug, Error)]
pub enum SimulationError {
    /// Fixture template не найден в ShapeCache
    #[error("fixture template `{key}` is not loaded")]
    MissingFixtureTemplate { key: String },

    /// Handle тела использован после destroy (или никогда не существовал)
    #[error("body handle {0:?} is not alive")]
    StaleBody(BodyHandle),

    /// Handle joint'а использован после destroy
    #[error("joint handle {0:?} is not alive")]
    StaleJoint(JointHandle),

    /// Тело нельзя уничтожить пока на него ссылаются joints (joints before bodies)
    #[error("body {body:?} still has {joints} attached joint(s)")]
    BodyHasJoints { body: BodyHandle, joints: usize },

    /// Ragdoll без единой конечности (нужен хотя бы torso)
    #[error("a ragdoll needs at least a torso")]
    NoLimbs,

    #[error("limb index {index} is out of range ({count} limbs)")]
    LimbOutOfRange { index: usize, count: usize },

    #[error("roster is full (capacity {capacity})")]
    RosterFull { capacity: usize },

    #[error("character {0:?} is not in the roster")]
    UnknownCharacter(CharacterId),

    /// Полигон без объёма, нулевая ось joint'а
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("failed to parse shape templates: {0}")]
    ShapeParse(String),

    #[error("invalid config: {0}")]
    Config(String),

    /// Шаг staged loading упал; cursor не сдвинут, шаг можно повторить
    #[error("load step {step} failed: {source}")]
    LoadStep {
        step: &'static str,
        #[source]
        source: Box<SimulationError>,
    },
}
