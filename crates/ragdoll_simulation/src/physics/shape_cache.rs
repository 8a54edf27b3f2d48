//! Shape cache: fixture templates по строковому ключу
//!
//! Шаблон = набор fixtures (полигоны в метрах) + anchor point спрайта + размер
//! спрайта в пикселях. Файл шаблонов: RON, вершины в пикселях, перевод в метры
//! через `pixels_per_meter` из самого файла.

use std::collections::{BTreeMap, HashMap};

use bevy::math::Vec2;
use bevy_rapier3d::prelude::{CollisionGroups, Group};
use serde::Deserialize;

use super::collision::PartCategory;
use super::{BodyHandle, FixtureDef, PhysicsWorld};
use crate::error::{Result, SimulationError};

pub const SWORD_KEY: &str = "Sword";
pub const MAP_COLLISION_PREFIX: &str = "MapCollision";
pub const MAP_PIECES: usize = 4;

pub fn map_collision_key(index: usize) -> String {
    format!("{}{}", MAP_COLLISION_PREFIX, index)
}

/// Готовый шаблон (fixtures уже в метрах)
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeTemplate {
    pub fixtures: Vec<FixtureDef>,
    /// Нормализованный anchor спрайта (0..1)
    pub anchor: Vec2,
    /// Размер спрайта в пикселях (база для ролла размера части)
    pub size: Vec2,
}

#[derive(Debug, Clone, Default)]
pub struct ShapeCache {
    templates: HashMap<String, ShapeTemplate>,
}

// ============================================================================
// RON records
// ============================================================================

#[derive(Debug, Deserialize)]
struct ShapeFile {
    #[serde(default = "default_ptm")]
    pixels_per_meter: f32,
    bodies: BTreeMap<String, BodyRecord>,
}

#[derive(Debug, Deserialize)]
struct BodyRecord {
    #[serde(default = "default_anchor")]
    anchor: (f32, f32),
    size: (f32, f32),
    fixtures: Vec<FixtureRecord>,
}

#[derive(Debug, Deserialize)]
struct FixtureRecord {
    #[serde(default = "default_density")]
    density: f32,
    #[serde(default = "default_friction")]
    friction: f32,
    #[serde(default = "default_restitution")]
    restitution: f32,
    #[serde(default)]
    is_sensor: bool,
    category: PartCategory,
    /// Переопределение маски; по умолчанию маска категории
    #[serde(default)]
    mask: Option<u32>,
    vertices: Vec<(f32, f32)>,
}

fn default_ptm() -> f32 {
    32.0
}

fn default_anchor() -> (f32, f32) {
    (0.5, 0.5)
}

fn default_density() -> f32 {
    1.0
}

fn default_friction() -> f32 {
    0.4
}

fn default_restitution() -> f32 {
    0.2
}

impl FixtureRecord {
    fn into_fixture(self, body: &str, pixels_per_meter: f32) -> Result<FixtureDef> {
        if self.vertices.len() < 3 {
            return Err(SimulationError::ShapeParse(format!(
                "fixture of '{}' has {} vertices, polygon needs at least 3",
                body,
                self.vertices.len()
            )));
        }
        let mask = self.mask.unwrap_or_else(|| self.category.mask_bits());
        Ok(FixtureDef {
            density: self.density,
            friction: self.friction,
            restitution: self.restitution,
            is_sensor: self.is_sensor,
            groups: CollisionGroups::new(
                Group::from_bits_truncate(self.category.category_bits()),
                Group::from_bits_truncate(mask),
            ),
            vertices: self
                .vertices
                .into_iter()
                .map(|(x, y)| Vec2::new(x, y) / pixels_per_meter)
                .collect(),
        })
    }
}

// ============================================================================
// Cache
// ============================================================================

impl ShapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Парсит RON файл шаблонов
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let file: ShapeFile =
            ron::from_str(source).map_err(|e| SimulationError::ShapeParse(e.to_string()))?;
        if file.pixels_per_meter <= 0.0 {
            return Err(SimulationError::ShapeParse(
                "pixels_per_meter must be positive".into(),
            ));
        }

        let mut cache = Self::new();
        for (key, body) in file.bodies {
            let fixtures = body
                .fixtures
                .into_iter()
                .map(|fixture| fixture.into_fixture(&key, file.pixels_per_meter))
                .collect::<Result<Vec<_>>>()?;
            cache.insert(
                key,
                ShapeTemplate {
                    fixtures,
                    anchor: Vec2::new(body.anchor.0, body.anchor.1),
                    size: Vec2::new(body.size.0, body.size.1),
                },
            );
        }
        Ok(cache)
    }

    /// Встроенные box-шаблоны для всех ключей игры (32 px/m)
    pub fn with_default_templates() -> Self {
        const PTM: f32 = 32.0;
        let mut cache = Self::new();

        let parts: [(&str, PartCategory, Vec2, Vec2); 6] = [
            ("Torso", PartCategory::Torso, Vec2::new(24.0, 32.0), Vec2::new(28.0, 36.0)),
            ("Head", PartCategory::Head, Vec2::new(16.0, 16.0), Vec2::new(18.0, 18.0)),
            ("ArmLeft", PartCategory::Arm, Vec2::new(8.0, 24.0), Vec2::new(10.0, 26.0)),
            ("ArmRight", PartCategory::Arm, Vec2::new(8.0, 24.0), Vec2::new(10.0, 26.0)),
            ("LegLeft", PartCategory::Leg, Vec2::new(8.0, 24.0), Vec2::new(10.0, 26.0)),
            ("LegRight", PartCategory::Leg, Vec2::new(8.0, 24.0), Vec2::new(10.0, 26.0)),
        ];
        for (suffix, category, char_size, demon_size) in parts {
            cache.insert(format!("Char{}", suffix), box_template(char_size, category, PTM));
            cache.insert(format!("Demon{}", suffix), box_template(demon_size, category, PTM));
        }
        cache.insert(
            SWORD_KEY,
            box_template(Vec2::new(8.0, 40.0), PartCategory::Weapon, PTM),
        );

        // Стены арены вокруг ground body (центр экрана), по часовой: верх, право, низ, лево
        let half = Vec2::new(2048.0, 2048.0);
        let thickness = 32.0;
        let walls = [
            (Vec2::new(-half.x, -half.y - thickness), Vec2::new(half.x, -half.y)),
            (Vec2::new(half.x, -half.y), Vec2::new(half.x + thickness, half.y)),
            (Vec2::new(-half.x, half.y), Vec2::new(half.x, half.y + thickness)),
            (Vec2::new(-half.x - thickness, -half.y), Vec2::new(-half.x, half.y)),
        ];
        for (index, (min, max)) in walls.into_iter().enumerate() {
            let mut fixture = FixtureDef::boxed(Vec2::ZERO, PartCategory::Walls.groups());
            fixture.vertices = vec![
                Vec2::new(min.x, min.y) / PTM,
                Vec2::new(max.x, min.y) / PTM,
                Vec2::new(max.x, max.y) / PTM,
                Vec2::new(min.x, max.y) / PTM,
            ];
            cache.insert(
                map_collision_key(index),
                ShapeTemplate {
                    fixtures: vec![fixture],
                    anchor: Vec2::new(0.5, 0.5),
                    size: max - min,
                },
            );
        }
        cache
    }

    pub fn insert(&mut self, key: impl Into<String>, template: ShapeTemplate) {
        self.templates.insert(key.into(), template);
    }

    /// Добавляет шаблоны другого cache (ключи other перекрывают существующие)
    pub fn merge(&mut self, other: ShapeCache) {
        self.templates.extend(other.templates);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.templates.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn template(&self, key: &str) -> Result<&ShapeTemplate> {
        self.templates
            .get(key)
            .ok_or_else(|| SimulationError::MissingFixtureTemplate {
                key: key.to_string(),
            })
    }

    /// Навешивает все fixtures шаблона на живое тело
    pub fn add_fixtures(
        &self,
        world: &mut dyn PhysicsWorld,
        body: BodyHandle,
        key: &str,
    ) -> Result<()> {
        let template = self.template(key)?;
        world.attach_fixtures(body, &template.fixtures)
    }

    pub fn anchor_point(&self, key: &str) -> Result<Vec2> {
        Ok(self.template(key)?.anchor)
    }
}

fn box_template(size: Vec2, category: PartCategory, pixels_per_meter: f32) -> ShapeTemplate {
    ShapeTemplate {
        fixtures: vec![FixtureDef::boxed(
            size * 0.5 / pixels_per_meter,
            category.groups(),
        )],
        anchor: Vec2::new(0.5, 0.5),
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{BodyDesc, BodyType, RapierWorld};

    const SHAPES: &str = r#"
(
    pixels_per_meter: 32.0,
    bodies: {
        "CharHead": (
            anchor: (0.5, 0.4),
            size: (16.0, 16.0),
            fixtures: [
                (
                    category: Head,
                    vertices: [(-8.0, -8.0), (8.0, -8.0), (8.0, 8.0), (-8.0, 8.0)],
                ),
            ],
        ),
        "Sword": (
            size: (8.0, 40.0),
            fixtures: [
                (
                    density: 2.0,
                    category: Weapon,
                    is_sensor: true,
                    vertices: [(-4.0, -20.0), (4.0, -20.0), (0.0, 20.0)],
                ),
            ],
        ),
    },
)
"#;

    #[test]
    fn test_parse_ron_templates() {
        let cache = ShapeCache::from_ron_str(SHAPES).unwrap();
        assert_eq!(cache.len(), 2);

        let head = cache.template("CharHead").unwrap();
        assert_eq!(head.anchor, Vec2::new(0.5, 0.4));
        assert_eq!(head.fixtures[0].half_extents(), Vec2::new(0.25, 0.25));
        assert_eq!(head.fixtures[0].groups, PartCategory::Head.groups());

        let sword = cache.template("Sword").unwrap();
        assert!(sword.fixtures[0].is_sensor);
        assert_eq!(sword.fixtures[0].density, 2.0);
        assert_eq!(sword.anchor, Vec2::new(0.5, 0.5));
    }

    #[test]
    fn test_missing_key_reports_key() {
        let cache = ShapeCache::from_ron_str(SHAPES).unwrap();
        match cache.anchor_point("DemonTorso") {
            Err(SimulationError::MissingFixtureTemplate { key }) => assert_eq!(key, "DemonTorso"),
            other => panic!("expected MissingFixtureTemplate, got {:?}", other),
        }
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        let source = r#"(bodies: { "Bad": (size: (1.0, 1.0), fixtures: [(category: Arm, vertices: [(0.0, 0.0)])]) })"#;
        assert!(matches!(
            ShapeCache::from_ron_str(source),
            Err(SimulationError::ShapeParse(_))
        ));
    }

    #[test]
    fn test_default_templates_cover_game_keys() {
        let cache = ShapeCache::with_default_templates();
        for prefix in ["Char", "Demon"] {
            for part in ["Torso", "Head", "ArmLeft", "ArmRight", "LegLeft", "LegRight"] {
                assert!(cache.contains(&format!("{}{}", prefix, part)), "{}{}", prefix, part);
            }
        }
        assert!(cache.contains(SWORD_KEY));
        for index in 0..MAP_PIECES {
            assert!(cache.contains(&map_collision_key(index)));
        }
    }

    #[test]
    fn test_add_fixtures_requires_known_key() {
        let cache = ShapeCache::with_default_templates();
        let mut world = RapierWorld::default();
        let body = world.create_body(&BodyDesc {
            body_type: BodyType::Dynamic,
            position: Vec2::ZERO,
            angle: 0.0,
            fixture: FixtureDef::boxed(Vec2::splat(0.1), PartCategory::Weapon.groups()),
        });

        cache.add_fixtures(&mut world, body, SWORD_KEY).unwrap();
        assert!(cache.add_fixtures(&mut world, body, "Shield").is_err());
    }
}
