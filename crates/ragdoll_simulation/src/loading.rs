//! Staged content loading
//!
//! Загрузка разбита на шаги, один шаг за вызов `load_step` (экран загрузки
//! рисует прогресс между вызовами):
//! 1. Initialize: pixel scale движка, валидация конфига
//! 2. LoadShapeCache: fixture templates
//! 3. LoadGround: статические тела карты (`MapCollision0..3`)
//! 4. LoadContent: roster (игрок + враги)
//! 5. Finalize
//!
//! Упавший шаг не двигает cursor: его можно повторить. Ground создаётся один
//! раз даже при повторе, упавший LoadContent не оставляет тел в мире.

use crate::config::SimulationConfig;
use crate::error::{Result, SimulationError};
use crate::logger;
use crate::physics::shape_cache::{map_collision_key, MAP_PIECES};
use crate::physics::{BodyDesc, BodyHandle, BodyType, PhysicsWorld, PixelScale, ShapeCache};
use crate::ragdoll::{SegmentKind, Variant};
use crate::roster::CharacterRoster;
use crate::DeterministicRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStep {
    Initialize,
    LoadShapeCache,
    LoadGround,
    LoadContent,
    Finalize,
}

impl LoadStep {
    pub const ALL: [LoadStep; 5] = [
        LoadStep::Initialize,
        LoadStep::LoadShapeCache,
        LoadStep::LoadGround,
        LoadStep::LoadContent,
        LoadStep::Finalize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LoadStep::Initialize => "Initialize",
            LoadStep::LoadShapeCache => "LoadShapeCache",
            LoadStep::LoadGround => "LoadGround",
            LoadStep::LoadContent => "LoadContent",
            LoadStep::Finalize => "Finalize",
        }
    }
}

/// Откуда брать fixture templates
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ShapeSource {
    /// Встроенные box-шаблоны
    #[default]
    Defaults,
    /// RON файл шаблонов (полностью заменяет встроенные)
    Ron(String),
}

/// Ключи, без которых персонажа не собрать
fn character_template_keys() -> Vec<String> {
    const KINDS: [SegmentKind; 7] = [
        SegmentKind::Torso,
        SegmentKind::Head,
        SegmentKind::ArmLeft,
        SegmentKind::ArmRight,
        SegmentKind::LegLeft,
        SegmentKind::LegRight,
        SegmentKind::Weapon,
    ];
    [Variant::Player, Variant::Enemy]
        .into_iter()
        .flat_map(|variant| KINDS.into_iter().map(move |kind| kind.template_key(variant)))
        .collect()
}

pub struct ContentLoader {
    config: SimulationConfig,
    source: ShapeSource,
    rng: DeterministicRng,
    cursor: usize,
    shapes: Option<ShapeCache>,
    ground: Vec<BodyHandle>,
    roster: Option<CharacterRoster>,
}

impl ContentLoader {
    /// `rng` форкается один раз: повтор LoadContent роллит тот же roster
    pub fn new(config: SimulationConfig, source: ShapeSource, mut rng: DeterministicRng) -> Self {
        Self {
            config,
            source,
            rng: rng.fork(),
            cursor: 0,
            shapes: None,
            ground: Vec::new(),
            roster: None,
        }
    }

    /// Меняет источник шаблонов (например, перед повтором упавшего шага)
    pub fn set_shape_source(&mut self, source: ShapeSource) {
        self.source = source;
    }

    /// Выполняет ровно один шаг, возвращает прогресс (0, 1]
    pub fn load_step(&mut self, world: &mut dyn PhysicsWorld) -> Result<f32> {
        let Some(&step) = LoadStep::ALL.get(self.cursor) else {
            return Ok(1.0);
        };

        self.run(step, world).map_err(|source| {
            logger::log_error(&format!("ContentLoader: {} failed: {}", step.name(), source));
            SimulationError::LoadStep {
                step: step.name(),
                source: Box::new(source),
            }
        })?;

        self.cursor += 1;
        logger::log_info(&format!(
            "ContentLoader: {} done ({:.0}%)",
            step.name(),
            self.progress() * 100.0
        ));
        Ok(self.progress())
    }

    /// Гоняет `load_step` до конца
    pub fn load_all(&mut self, world: &mut dyn PhysicsWorld) -> Result<()> {
        while !self.is_finished() {
            self.load_step(world)?;
        }
        Ok(())
    }

    fn run(&mut self, step: LoadStep, world: &mut dyn PhysicsWorld) -> Result<()> {
        match step {
            LoadStep::Initialize => {
                self.config.validate()?;
                world.set_scale(PixelScale::new(self.config.physics.pixels_per_meter));
            }
            LoadStep::LoadShapeCache => {
                let shapes = match &self.source {
                    ShapeSource::Defaults => ShapeCache::with_default_templates(),
                    ShapeSource::Ron(source) => ShapeCache::from_ron_str(source)?,
                };
                self.shapes = Some(shapes);
            }
            LoadStep::LoadGround => self.load_ground(world)?,
            LoadStep::LoadContent => {
                let shapes = self.loaded_shapes()?.clone();
                for key in character_template_keys() {
                    shapes.template(&key)?;
                }
                let roster = CharacterRoster::new(&self.config, self.rng.clone(), shapes, world)?;
                self.roster = Some(roster);
            }
            LoadStep::Finalize => {}
        }
        Ok(())
    }

    /// Статическое тело на каждый кусок карты, в центре экрана
    fn load_ground(&mut self, world: &mut dyn PhysicsWorld) -> Result<()> {
        if !self.ground.is_empty() {
            return Ok(());
        }
        let shapes = self.loaded_shapes()?;
        let keys: Vec<String> = (0..MAP_PIECES).map(map_collision_key).collect();
        for key in &keys {
            let template = shapes.template(key)?;
            if template.fixtures.is_empty() {
                return Err(SimulationError::ShapeParse(format!(
                    "template `{}` has no fixtures",
                    key
                )));
            }
        }

        let position = world
            .scale()
            .vec_to_meters(self.config.roster.screen_center());
        let mut ground = Vec::with_capacity(keys.len());
        for key in &keys {
            let template = shapes.template(key)?;
            let body = world.create_body(&BodyDesc {
                body_type: BodyType::Static,
                position,
                angle: 0.0,
                fixture: template.fixtures[0].clone(),
            });
            world.attach_fixtures(body, &template.fixtures[1..])?;
            ground.push(body);
        }
        self.ground = ground;
        Ok(())
    }

    fn loaded_shapes(&self) -> Result<&ShapeCache> {
        self.shapes
            .as_ref()
            .ok_or_else(|| SimulationError::Config("shape cache must be loaded before this step".into()))
    }

    pub fn progress(&self) -> f32 {
        self.cursor as f32 / LoadStep::ALL.len() as f32
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= LoadStep::ALL.len()
    }

    /// Следующий шаг (None: загрузка закончена)
    pub fn current_step(&self) -> Option<LoadStep> {
        LoadStep::ALL.get(self.cursor).copied()
    }

    pub fn shapes(&self) -> Option<&ShapeCache> {
        self.shapes.as_ref()
    }

    pub fn ground(&self) -> &[BodyHandle] {
        &self.ground
    }

    pub fn roster(&self) -> Option<&CharacterRoster> {
        self.roster.as_ref()
    }

    /// Забирает готовый roster (только после завершения загрузки)
    pub fn take_roster(&mut self) -> Option<CharacterRoster> {
        if !self.is_finished() {
            return None;
        }
        self.roster.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::RapierWorld;

    fn loader(source: ShapeSource) -> ContentLoader {
        ContentLoader::new(SimulationConfig::default(), source, DeterministicRng::new(42))
    }

    const SWORD_ONLY: &str = r#"(
        pixels_per_meter: 32.0,
        bodies: {
            "Sword": (
                size: (8.0, 40.0),
                fixtures: [(category: Weapon, vertices: [(-4.0, -20.0), (4.0, -20.0), (4.0, 20.0), (-4.0, 20.0)])],
            ),
        },
    )"#;

    #[test]
    fn test_steps_report_fractional_progress() {
        let mut world = RapierWorld::default();
        let mut loader = loader(ShapeSource::Defaults);

        let mut progress = Vec::new();
        while !loader.is_finished() {
            progress.push(loader.load_step(&mut world).unwrap());
        }
        assert_eq!(progress, vec![0.2, 0.4, 0.6, 0.8, 1.0]);
        assert_eq!(loader.current_step(), None);

        // После завершения: no-op
        let bodies = world.body_count();
        assert_eq!(loader.load_step(&mut world).unwrap(), 1.0);
        assert_eq!(world.body_count(), bodies);

        assert_eq!(loader.ground().len(), MAP_PIECES);
        let roster = loader.take_roster().unwrap();
        assert_eq!(roster.len(), 4);
    }

    #[test]
    fn test_failed_step_can_be_retried() {
        let mut world = RapierWorld::default();
        let mut loader = loader(ShapeSource::Ron("(bodies: {".into()));

        loader.load_step(&mut world).unwrap();
        let err = loader.load_step(&mut world).unwrap_err();
        assert!(matches!(err, SimulationError::LoadStep { step: "LoadShapeCache", .. }));
        assert_eq!(loader.current_step(), Some(LoadStep::LoadShapeCache));

        loader.set_shape_source(ShapeSource::Defaults);
        assert_eq!(loader.load_step(&mut world).unwrap(), 0.4);
    }

    #[test]
    fn test_missing_map_template_creates_no_ground() {
        let mut world = RapierWorld::default();
        let mut loader = loader(ShapeSource::Ron(SWORD_ONLY.into()));

        loader.load_step(&mut world).unwrap();
        loader.load_step(&mut world).unwrap();
        let err = loader.load_step(&mut world).unwrap_err();
        assert!(err.to_string().contains("MapCollision0"), "{}", err);
        assert_eq!(world.body_count(), 0);
        assert!(loader.ground().is_empty());
    }

    #[test]
    fn test_ground_created_once_across_content_retry() {
        let mut world = RapierWorld::default();
        let mut loader = loader(ShapeSource::Defaults);
        for _ in 0..3 {
            loader.load_step(&mut world).unwrap();
        }
        assert_eq!(world.body_count(), MAP_PIECES);

        // Character templates пропали: LoadContent падает до создания тел
        loader.shapes = Some(ShapeCache::from_ron_str(SWORD_ONLY).unwrap());
        assert!(loader.load_step(&mut world).is_err());
        assert_eq!(world.body_count(), MAP_PIECES);
        assert!(loader.take_roster().is_none());

        loader.shapes = Some(ShapeCache::with_default_templates());
        loader.load_all(&mut world).unwrap();
        assert_eq!(loader.ground().len(), MAP_PIECES);
        let roster = loader.take_roster().unwrap();
        let character_bodies: usize = roster
            .characters()
            .iter()
            .map(|entry| entry.entity().bodies().len())
            .sum();
        assert_eq!(world.body_count(), MAP_PIECES + character_bodies);
    }

    /// Мир, который отказывает в joints после `budget` штук
    struct JointBudgetWorld {
        inner: RapierWorld,
        budget: usize,
    }

    impl PhysicsWorld for JointBudgetWorld {
        fn create_body(&mut self, desc: &BodyDesc) -> BodyHandle {
            self.inner.create_body(desc)
        }
        fn destroy_body(&mut self, body: BodyHandle) -> Result<()> {
            self.inner.destroy_body(body)
        }
        fn attach_fixtures(&mut self, body: BodyHandle, fixtures: &[crate::physics::FixtureDef]) -> Result<()> {
            self.inner.attach_fixtures(body, fixtures)
        }
        fn create_joint(&mut self, desc: &crate::physics::JointDesc) -> Result<crate::physics::JointHandle> {
            if self.budget == 0 {
                return Err(SimulationError::DegenerateGeometry("joint refused".into()));
            }
            self.budget -= 1;
            self.inner.create_joint(desc)
        }
        fn destroy_joint(&mut self, joint: crate::physics::JointHandle) -> Result<()> {
            self.inner.destroy_joint(joint)
        }
        fn set_joint_motor(&mut self, joint: crate::physics::JointHandle, motor: crate::physics::JointMotor) -> Result<()> {
            self.inner.set_joint_motor(joint, motor)
        }
        fn joint_motor(&self, joint: crate::physics::JointHandle) -> Result<Option<crate::physics::JointMotor>> {
            self.inner.joint_motor(joint)
        }
        fn apply_force_to_center(&mut self, body: BodyHandle, force: bevy::math::Vec2) -> Result<()> {
            self.inner.apply_force_to_center(body, force)
        }
        fn apply_angular_impulse(&mut self, body: BodyHandle, impulse: f32) -> Result<()> {
            self.inner.apply_angular_impulse(body, impulse)
        }
        fn body_position(&self, body: BodyHandle) -> Result<bevy::math::Vec2> {
            self.inner.body_position(body)
        }
        fn body_angle(&self, body: BodyHandle) -> Result<f32> {
            self.inner.body_angle(body)
        }
        fn contains_body(&self, body: BodyHandle) -> bool {
            self.inner.contains_body(body)
        }
        fn contains_joint(&self, joint: crate::physics::JointHandle) -> bool {
            self.inner.contains_joint(joint)
        }
        fn step(&mut self, dt: f32) {
            self.inner.step(dt)
        }
        fn drain_contacts(&mut self) -> Vec<crate::physics::ContactEvent> {
            self.inner.drain_contacts()
        }
        fn scale(&self) -> PixelScale {
            self.inner.scale()
        }
        fn set_scale(&mut self, scale: PixelScale) {
            self.inner.set_scale(scale)
        }
    }

    #[test]
    fn test_failed_content_releases_partial_roster() {
        let mut world = JointBudgetWorld {
            inner: RapierWorld::default(),
            budget: 7,
        };
        let mut loader = loader(ShapeSource::Defaults);
        for _ in 0..3 {
            loader.load_step(&mut world).unwrap();
        }

        // Игрок собран целиком, на враге joints кончаются
        let err = loader.load_step(&mut world).unwrap_err();
        assert!(matches!(err, SimulationError::LoadStep { step: "LoadContent", .. }));
        assert_eq!(world.inner.body_count(), MAP_PIECES);
        assert_eq!(world.inner.joint_count(), 0);
        assert_eq!(loader.current_step(), Some(LoadStep::LoadContent));

        // Повтор роллит тот же roster, что и загрузка без сбоя
        world.budget = usize::MAX;
        loader.load_all(&mut world).unwrap();
        let retried = loader.take_roster().unwrap();

        let mut fresh_world = RapierWorld::default();
        let mut fresh = self::loader(ShapeSource::Defaults);
        fresh.load_all(&mut fresh_world).unwrap();
        let fresh = fresh.take_roster().unwrap();

        assert_eq!(retried.snapshot(&world.inner), fresh.snapshot(&fresh_world));
        assert_eq!(world.inner.body_count(), fresh_world.body_count());
        assert_eq!(world.inner.joint_count(), fresh_world.joint_count());
    }

    #[test]
    fn test_initialize_applies_pixel_scale() {
        let mut world = RapierWorld::default();
        let mut config = SimulationConfig::default();
        config.physics.pixels_per_meter = 64.0;
        let mut loader = ContentLoader::new(config, ShapeSource::Defaults, DeterministicRng::new(1));

        loader.load_step(&mut world).unwrap();
        assert_eq!(world.scale().pixels_per_meter, 64.0);
    }

    #[test]
    fn test_character_keys_cover_both_variants() {
        let keys = character_template_keys();
        assert!(keys.contains(&"CharTorso".to_string()));
        assert!(keys.contains(&"DemonLegRight".to_string()));
        assert!(keys.contains(&"Sword".to_string()));
    }
}
