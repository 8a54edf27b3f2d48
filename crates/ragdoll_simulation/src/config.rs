//! Конфигурация симуляции (serde + RON)
//!
//! Дефолты повторяют константы игры. Векторы хранятся как `[f32; 2]`
//! чтобы не тянуть serde feature у glam.

use std::f32::consts::PI;

use bevy::math::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};

/// Корневой конфиг
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub roster: RosterConfig,
    pub character: CharacterTuning,
    pub gesture: GestureConfig,
    pub physics: PhysicsConfig,
}

impl SimulationConfig {
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: Self =
            ron::from_str(source).map_err(|e| SimulationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let roster = &self.roster;
        if roster.capacity == 0 {
            return Err(SimulationError::Config("roster capacity must be at least 1".into()));
        }
        if roster.spawn_anchors.is_empty() {
            return Err(SimulationError::Config("at least one spawn anchor is required".into()));
        }
        if roster.enemy.limb_count[0] > roster.enemy.limb_count[1] {
            return Err(SimulationError::Config(format!(
                "enemy limb count range {:?} is inverted",
                roster.enemy.limb_count
            )));
        }
        if self.physics.pixels_per_meter <= 0.0 {
            return Err(SimulationError::Config("pixels_per_meter must be positive".into()));
        }

        // Enemy tick повторяющийся: нулевой период недопустим
        require_duration("roster.enemy_tick_secs", roster.enemy_tick_secs, false)?;
        require_duration("roster.destruction_grace_secs", roster.destruction_grace_secs, true)?;
        require_duration("roster.debris_fade_secs", roster.debris_fade_secs, true)?;
        require_duration("character.swing_secs", self.character.swing_secs, true)?;
        require_duration(
            "character.damage_cooldown_secs",
            self.character.damage_cooldown_secs,
            true,
        )?;
        require_duration("gesture.swipe_secs", self.gesture.swipe_secs, true)?;
        Ok(())
    }
}

/// Длительность таймера: конечная, неотрицательная (и ненулевая, если `allow_zero == false`)
fn require_duration(name: &str, secs: f32, allow_zero: bool) -> Result<()> {
    let valid = secs.is_finite() && if allow_zero { secs >= 0.0 } else { secs > 0.0 };
    if valid {
        Ok(())
    } else {
        Err(SimulationError::Config(format!(
            "{} must be a finite {} duration, got {}",
            name,
            if allow_zero { "non-negative" } else { "positive" },
            secs
        )))
    }
}

/// Параметры roster'а: вместимость, спавн, таймеры
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// Размер spawn pool (slot 0: игрок)
    pub capacity: usize,
    pub player: PlayerSpawn,
    pub enemy: EnemySpawn,
    /// Якоря спавна врагов, выбираются round-robin
    pub spawn_anchors: Vec<[f32; 2]>,
    /// Grace period между летальным ударом и уничтожением
    pub destruction_grace_secs: f32,
    /// Период enemy tick
    pub enemy_tick_secs: f32,
    /// Сколько debris limb живёт в списке до fade-out
    pub debris_fade_secs: f32,
    /// Разрешить урон собственным оружием (weapon и limb одного персонажа)
    pub allow_self_damage: bool,
    /// Размер экрана в пикселях (камера следует за игроком)
    pub screen_size: [f32; 2],
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            player: PlayerSpawn::default(),
            enemy: EnemySpawn::default(),
            spawn_anchors: vec![
                [320.0, 320.0],
                [1200.0, 1200.0],
                [-960.0, -400.0],
                [960.0, -1280.0],
            ],
            destruction_grace_secs: 3.0,
            enemy_tick_secs: 2.0,
            debris_fade_secs: 5.0,
            allow_self_damage: false,
            screen_size: [1024.0, 768.0],
        }
    }
}

impl RosterConfig {
    pub fn anchor(&self, index: usize) -> Vec2 {
        Vec2::from(self.spawn_anchors[index % self.spawn_anchors.len()])
    }

    pub fn screen_center(&self) -> Vec2 {
        Vec2::from(self.screen_size) * 0.5
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSpawn {
    pub number_of_limbs: usize,
    pub limb_size_range: [f32; 2],
    pub stat_range: [f32; 2],
    pub position: [f32; 2],
}

impl Default for PlayerSpawn {
    fn default() -> Self {
        Self {
            number_of_limbs: 6,
            limb_size_range: [0.2, 1.5],
            stat_range: [0.2, 1.5],
            position: [200.0, 200.0],
        }
    }
}

/// Диапазоны для случайных врагов
///
/// Нижняя граница limb size/stat range роллится из `*_low`, верхняя из `*_high`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnemySpawn {
    /// Inclusive
    pub limb_count: [usize; 2],
    pub limb_size_low: [f32; 2],
    pub limb_size_high: [f32; 2],
    pub stat_low: [f32; 2],
    pub stat_high: [f32; 2],
    pub jitter_x: [f32; 2],
    pub jitter_y: [f32; 2],
}

impl Default for EnemySpawn {
    fn default() -> Self {
        Self {
            limb_count: [4, 10],
            limb_size_low: [0.1, 1.5],
            limb_size_high: [1.6, 3.0],
            stat_low: [0.5, 2.0],
            stat_high: [2.0, 4.0],
            jitter_x: [0.0, 96.0],
            jitter_y: [0.0, 96.0],
        }
    }
}

/// Параметры отдельного ragdoll'а (статы, таймеры, motor, раскладка частей)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterTuning {
    pub base_health: f32,
    pub base_strength: f32,
    pub base_speed: f32,
    /// Базовое значение стата части тела до умножения на ролл
    pub part_base_stat: f32,
    pub swing_secs: f32,
    pub damage_cooldown_secs: f32,
    /// rad/s, знак чередуется
    pub motor_speed: f32,
    pub motor_max_torque: f32,
    /// Симметричный лимит prismatic joint головы (метры)
    pub head_slide: f32,
    pub destruction_torque: [i32; 2],
    /// Нижняя граница делителя в формуле урона по конечности
    pub damage_divisor_epsilon: f32,
    pub head_offset: [f32; 2],
    pub arm_offset_x: f32,
    pub leg_offset_x: f32,
    pub leg_offset_y: f32,
    pub weapon_offset: [f32; 2],
    pub weapon_angle_degrees: f32,
}

impl Default for CharacterTuning {
    fn default() -> Self {
        Self {
            base_health: 100.0,
            base_strength: 1.0,
            base_speed: 1.0,
            part_base_stat: 10.0,
            swing_secs: 0.5,
            damage_cooldown_secs: 0.5,
            motor_speed: 6.0 * PI,
            motor_max_torque: 50.0,
            head_slide: 0.2,
            destruction_torque: [10, 100],
            damage_divisor_epsilon: 1e-3,
            head_offset: [0.0, -2.0],
            arm_offset_x: 16.0,
            leg_offset_x: 8.0,
            leg_offset_y: 16.0,
            weapon_offset: [0.0, 20.0],
            weapon_angle_degrees: 180.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub swipe_secs: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self { swipe_secs: 0.1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub pixels_per_meter: f32,
    /// Top-down игра: гравитации нет
    pub gravity: [f32; 2],
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            pixels_per_meter: 32.0,
            gravity: [0.0, 0.0],
            linear_damping: 0.5,
            angular_damping: 0.5,
        }
    }
}
