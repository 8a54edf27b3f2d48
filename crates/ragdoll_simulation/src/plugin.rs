//! Bevy integration
//!
//! ECS ответственность:
//! - resources: `PhysicsBackend`, `CharacterRoster` (появляется после загрузки)
//! - входные events: `ContactStarted`/`ContactEnded` (из движка), `PointerGesture` (из touch)
//! - выходные events: `CharacterSpawned`, `CharacterDamaged`, `LimbSevered`,
//!   `CharacterDowned`, `CharacterDestroyed`
//!
//! Загрузка идёт по шагу за кадр в `PreUpdate` (`ContentLoader`), пока roster
//! не готов, FixedUpdate системы ничего не делают.

use std::collections::HashMap;

use bevy::input::touch::{TouchInput, TouchPhase as BevyTouchPhase};
use bevy::prelude::*;

use crate::config::SimulationConfig;
use crate::input::{TouchEvent, TouchPhase};
use crate::loading::{ContentLoader, ShapeSource};
use crate::logger;
use crate::physics::{BodyHandle, ContactEvent, PhysicsWorld, RapierWorld};
use crate::roster::{CharacterId, CharacterKind, CharacterRoster, RosterEvent};
use crate::DeterministicRng;

// ============================================================================
// Resources
// ============================================================================

/// Физический движок симуляции (по умолчанию `RapierWorld`)
#[derive(Resource)]
pub struct PhysicsBackend(Box<dyn PhysicsWorld>);

impl PhysicsBackend {
    pub fn new(world: impl PhysicsWorld + 'static) -> Self {
        Self(Box::new(world))
    }

    pub fn world(&self) -> &dyn PhysicsWorld {
        &*self.0
    }

    pub fn world_mut(&mut self) -> &mut dyn PhysicsWorld {
        &mut *self.0
    }
}

/// Настройки, с которыми стартует загрузка
#[derive(Resource, Debug, Clone)]
pub struct RagdollSettings {
    pub config: SimulationConfig,
    pub shapes: ShapeSource,
}

/// Идущая загрузка контента
#[derive(Resource)]
pub struct ContentLoading(pub ContentLoader);

/// Загрузка упала: симуляция остановлена, текст ошибки для диагностики
#[derive(Resource, Debug, Clone)]
pub struct LoadFailed(pub String);

/// Предыдущая позиция каждого активного касания
#[derive(Resource, Debug, Default)]
pub struct TouchTracker {
    previous: HashMap<u64, Vec2>,
}

// ============================================================================
// Events
// ============================================================================

#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactStarted {
    pub a: BodyHandle,
    pub b: BodyHandle,
}

#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEnded {
    pub a: BodyHandle,
    pub b: BodyHandle,
}

/// Touch жест в экранных координатах
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct PointerGesture(pub TouchEvent);

#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterSpawned {
    pub id: CharacterId,
    pub kind: CharacterKind,
}

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct CharacterDamaged {
    pub target: CharacterId,
    pub attacker: CharacterId,
    pub limb_index: usize,
    pub amount: f32,
    pub health: f32,
}

#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimbSevered {
    pub owner: CharacterId,
    pub limb_index: usize,
}

/// Персонаж ждёт уничтожения (grace period)
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterDowned {
    pub id: CharacterId,
}

#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterDestroyed {
    pub id: CharacterId,
    pub kind: CharacterKind,
}

// ============================================================================
// Plugin
// ============================================================================

/// Ragdoll Plugin
///
/// Порядок выполнения в FixedUpdate:
/// 1. forward_touch_input: Bevy touch → `PointerGesture`
/// 2. step_physics: шаг движка, contact события
/// 3. resolve_contacts: contact → damage
/// 4. handle_pointer_gestures: движение / swing игрока
/// 5. tick_roster: таймеры, enemy tick, уничтожение, выходные events
#[derive(Default)]
pub struct RagdollPlugin {
    pub config: SimulationConfig,
    pub shapes: ShapeSource,
}

impl Plugin for RagdollPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<ContactStarted>()
            .add_event::<ContactEnded>()
            .add_event::<PointerGesture>()
            .add_event::<CharacterSpawned>()
            .add_event::<CharacterDamaged>()
            .add_event::<LimbSevered>()
            .add_event::<CharacterDowned>()
            .add_event::<CharacterDestroyed>()
            // MinimalPlugins не регистрирует InputPlugin
            .add_event::<TouchInput>();

        if !app.world().contains_resource::<PhysicsBackend>() {
            app.insert_resource(PhysicsBackend::new(RapierWorld::new(&self.config.physics)));
        }

        app.insert_resource(RagdollSettings {
            config: self.config.clone(),
            shapes: self.shapes.clone(),
        })
        .init_resource::<TouchTracker>()
        .add_systems(Startup, begin_loading)
        .add_systems(PreUpdate, advance_loading)
        .add_systems(
            FixedUpdate,
            (
                forward_touch_input,
                step_physics,
                resolve_contacts,
                handle_pointer_gestures,
                tick_roster,
            )
                .chain(),
        );
    }
}

// ============================================================================
// Loading
// ============================================================================

fn begin_loading(mut commands: Commands, settings: Res<RagdollSettings>, rng: Option<ResMut<DeterministicRng>>) {
    let rng = match rng {
        Some(mut rng) => rng.fork(),
        None => {
            logger::log_warning("begin_loading: no DeterministicRng resource, using seed 42");
            DeterministicRng::new(42)
        }
    };
    commands.insert_resource(ContentLoading(ContentLoader::new(
        settings.config.clone(),
        settings.shapes.clone(),
        rng,
    )));
}

/// Один шаг загрузки за кадр (exclusive: нужен и loader, и движок)
pub fn advance_loading(world: &mut World) {
    let Some(mut loading) = world.remove_resource::<ContentLoading>() else {
        return;
    };
    let Some(mut backend) = world.remove_resource::<PhysicsBackend>() else {
        logger::log_error("advance_loading: PhysicsBackend resource is missing");
        world.insert_resource(LoadFailed("PhysicsBackend resource is missing".into()));
        return;
    };

    let result = loading.0.load_step(backend.world_mut());
    world.insert_resource(backend);

    match result {
        Ok(_) if loading.0.is_finished() => match loading.0.take_roster() {
            Some(roster) => world.insert_resource(roster),
            None => world.insert_resource(LoadFailed("loader finished without a roster".into())),
        },
        Ok(_) => world.insert_resource(loading),
        Err(err) => {
            logger::log_error(&format!("advance_loading: {}", err));
            world.insert_resource(LoadFailed(err.to_string()));
        }
    }
}

// ============================================================================
// FixedUpdate systems
// ============================================================================

/// Bevy `TouchInput` → `PointerGesture` (с предыдущей позицией касания)
pub fn forward_touch_input(
    mut touches: EventReader<TouchInput>,
    mut tracker: ResMut<TouchTracker>,
    mut gestures: EventWriter<PointerGesture>,
) {
    for touch in touches.read() {
        let previous = tracker.previous.get(&touch.id).copied().unwrap_or(touch.position);
        let phase = match touch.phase {
            BevyTouchPhase::Started => TouchPhase::Began,
            BevyTouchPhase::Moved => TouchPhase::Moved,
            BevyTouchPhase::Ended => TouchPhase::Ended,
            BevyTouchPhase::Canceled => TouchPhase::Cancelled,
        };
        match phase {
            TouchPhase::Began | TouchPhase::Moved => {
                tracker.previous.insert(touch.id, touch.position);
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                tracker.previous.remove(&touch.id);
            }
        }
        gestures.write(PointerGesture(TouchEvent::new(phase, touch.position, previous)));
    }
}

/// Шаг движка фиксированным timestep'ом
pub fn step_physics(
    time: Res<Time<Fixed>>,
    mut backend: ResMut<PhysicsBackend>,
    mut started: EventWriter<ContactStarted>,
    mut ended: EventWriter<ContactEnded>,
) {
    let world = backend.world_mut();
    world.step(time.timestep().as_secs_f32());
    for contact in world.drain_contacts() {
        match contact {
            ContactEvent::Started(a, b) => {
                started.write(ContactStarted { a, b });
            }
            ContactEvent::Ended(a, b) => {
                ended.write(ContactEnded { a, b });
            }
        }
    }
}

pub fn resolve_contacts(
    mut started: EventReader<ContactStarted>,
    mut ended: EventReader<ContactEnded>,
    roster: Option<ResMut<CharacterRoster>>,
    mut backend: ResMut<PhysicsBackend>,
) {
    let Some(mut roster) = roster else {
        started.clear();
        ended.clear();
        return;
    };

    for contact in started.read() {
        if let Err(err) = roster.on_contact_start(contact.a, contact.b, backend.world_mut()) {
            logger::log_error(&format!("resolve_contacts: {}", err));
            return;
        }
    }
    for contact in ended.read() {
        roster.on_contact_end(contact.a, contact.b);
    }
}

pub fn handle_pointer_gestures(
    mut gestures: EventReader<PointerGesture>,
    roster: Option<ResMut<CharacterRoster>>,
    mut backend: ResMut<PhysicsBackend>,
) {
    let Some(mut roster) = roster else {
        gestures.clear();
        return;
    };

    for PointerGesture(event) in gestures.read() {
        if let Err(err) = roster.handle_touch_event(event, backend.world_mut()) {
            logger::log_error(&format!("handle_pointer_gestures: {}", err));
            return;
        }
    }
}

/// Tick roster'а + перевод `RosterEvent` в Bevy events
pub fn tick_roster(
    time: Res<Time<Fixed>>,
    roster: Option<ResMut<CharacterRoster>>,
    mut backend: ResMut<PhysicsBackend>,
    mut spawned: EventWriter<CharacterSpawned>,
    mut damaged: EventWriter<CharacterDamaged>,
    mut severed: EventWriter<LimbSevered>,
    mut downed: EventWriter<CharacterDowned>,
    mut destroyed: EventWriter<CharacterDestroyed>,
) {
    let Some(mut roster) = roster else {
        return;
    };

    if let Err(err) = roster.update(time.timestep(), backend.world_mut()) {
        logger::log_error(&format!("tick_roster: {}", err));
    }

    for event in roster.drain_events() {
        match event {
            RosterEvent::Spawned { id, kind } => {
                spawned.write(CharacterSpawned { id, kind });
            }
            RosterEvent::Damaged {
                target,
                attacker,
                limb_index,
                amount,
                health,
            } => {
                damaged.write(CharacterDamaged {
                    target,
                    attacker,
                    limb_index,
                    amount,
                    health,
                });
            }
            RosterEvent::LimbSevered { owner, limb_index } => {
                severed.write(LimbSevered { owner, limb_index });
            }
            RosterEvent::PendingDestruction { id } => {
                downed.write(CharacterDowned { id });
            }
            RosterEvent::Destroyed { id, kind } => {
                destroyed.write(CharacterDestroyed { id, kind });
            }
        }
    }
}
