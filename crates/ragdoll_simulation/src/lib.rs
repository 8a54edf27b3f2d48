//! Ragdoll Arena Simulation Core
//!
//! Combat/ragdoll слой: персонажи = сочленённые наборы rigid bodies (limbs + weapon),
//! roster управляет спавном, уроном по contact событиям, отложенным уничтожением
//! и респавном. Bevy App: оболочка (resources, events, FixedUpdate 60Hz).
//!
//! Физический движок: внешний коллаборатор за trait'ом `PhysicsWorld`,
//! по умолчанию `RapierWorld` (rapier из bevy_rapier3d, плоская симуляция).

use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub mod config;
pub mod error;
pub mod input;
pub mod loading;
pub mod logger;
pub mod physics;
pub mod plugin;
pub mod ragdoll;
pub mod roster;

pub use config::SimulationConfig;
pub use error::{Result, SimulationError};
pub use input::{GestureSignal, SwipeTracker, TouchEvent, TouchPhase};
pub use loading::{ContentLoader, LoadStep, ShapeSource};
pub use logger::init_logger;
pub use physics::{PhysicsWorld, RapierWorld, ShapeCache};
pub use plugin::{
    CharacterDamaged, CharacterDestroyed, CharacterDowned, CharacterSpawned, ContactEnded,
    ContactStarted, LimbSevered, LoadFailed, PhysicsBackend, PointerGesture, RagdollPlugin,
};
pub use ragdoll::{CharacterState, JointLinkKind, PartRef, RagdollEntity, Variant};
pub use roster::{CharacterId, CharacterKind, CharacterRoster, RosterEvent};

/// Главный plugin симуляции
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app
            // Fixed timestep 60Hz для simulation tick
            .insert_resource(Time::<Fixed>::from_hz(60.0))
            .add_plugins(RagdollPlugin::default());

        // Детерминистичный RNG (seed по умолчанию, если App его ещё не задал)
        if !app.world().contains_resource::<DeterministicRng>() {
            app.insert_resource(DeterministicRng::new(42));
        }
    }
}

/// Детерминистичный RNG resource (seeded)
///
/// Все броски симуляции (статы, размеры, jitter спавна, torque взрыва)
/// идут через него, поэтому одинаковый seed = одинаковый roster.
#[derive(Resource, Debug, Clone)]
pub struct DeterministicRng {
    pub rng: ChaCha8Rng,
    pub seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.seed = seed;
    }

    /// Целое в [lo, hi] включительно (порядок границ не важен)
    pub fn range_i32(&mut self, lo: i32, hi: i32) -> i32 {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        self.rng.gen_range(lo..=hi)
    }

    /// Float в [lo, hi); вырожденный диапазон возвращает lo
    pub fn range_f32(&mut self, lo: f32, hi: f32) -> f32 {
        if lo >= hi {
            return lo;
        }
        self.rng.gen_range(lo..hi)
    }

    /// Ролл с шагом 0.1: целое из [lo*10, hi*10], делённое на 10
    pub fn roll_tenths(&mut self, lo: f32, hi: f32) -> f32 {
        let lo = (lo * 10.0).round() as i32;
        let hi = (hi * 10.0).round() as i32;
        self.range_i32(lo, hi) as f32 / 10.0
    }

    /// Независимый дочерний поток (детерминированно от текущего состояния)
    pub fn fork(&mut self) -> Self {
        Self::new(self.rng.next_u64())
    }
}

/// Создаёт minimal Bevy App для headless симуляции
///
/// Время идёт ровно на один fixed tick за `app.update()` (кроме первого
/// update, у него delta = 0), wall clock не участвует.
pub fn create_headless_app(seed: u64) -> App {
    let mut app = App::new();
    init_logger();
    app.add_plugins(MinimalPlugins)
        .insert_resource(DeterministicRng::new(seed))
        .insert_resource(Time::<Fixed>::from_hz(60.0)) // 60Hz FixedUpdate
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(1.0 / 60.0)));

    app
}

/// Snapshot roster'а для сравнения детерминизма
///
/// Пустой вектор, если roster ещё не загружен.
pub fn roster_snapshot(world: &World) -> Vec<u8> {
    match (world.get_resource::<CharacterRoster>(), world.get_resource::<PhysicsBackend>()) {
        (Some(roster), Some(backend)) => roster.snapshot(backend.world()),
        _ => Vec::new(),
    }
}
