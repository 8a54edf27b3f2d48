//! CharacterRoster: spawn pool персонажей
//!
//! ## Ответственность:
//! - спавн (slot 0: игрок, враги round-robin по spawn anchors)
//! - contact → damage (через `BodyRegistry`, без downcast'ов)
//! - отложенное уничтожение: grace timer на персонажа, затем destroy + respawn
//! - enemy tick (каждые 2 с, шаг отдаётся `EnemyMovementPolicy`)
//! - debris list отсечённых конечностей
//! - touch жесты игрока (`SwipeTracker`)
//!
//! ## Порядок уничтожения:
//! 1. летальный удар: registry записи персонажа удаляются, ragdoll взрывается
//!    (мотор оружия off, joints → движок, torque каждой живой конечности),
//!    стартует grace timer
//! 2. пока идёт timer, конечности разлетаются в движке
//! 3. timer истёк: debris персонажа удаляются, тела → движок
//! 4. запись и timer удаляются из roster'а
//! 5. сразу спавнится замена того же класса
//!
//! Contact lookup по телу без записи в registry ничего не находит и молча
//! игнорируется: взорванный персонаж больше не бьёт и не получает урон.

use std::collections::BTreeMap;
use std::time::Duration;

use bevy::math::Vec2;
use bevy::prelude::Resource;
use bevy::time::{Timer, TimerMode};

use crate::config::{CharacterTuning, RosterConfig, SimulationConfig};
use crate::error::{Result, SimulationError};
use crate::input::{GestureSignal, SwipeTracker, TouchEvent};
use crate::logger;
use crate::physics::{BodyHandle, ContactEvent, PhysicsWorld, ShapeCache};
use crate::ragdoll::{RagdollEntity, SpawnParams, Variant};
use crate::DeterministicRng;

pub mod contact;
pub mod registry;

pub use contact::{resolve_hits, Hit};
pub use registry::{BodyOwner, BodyRegistry};

/// Идентификатор персонажа (монотонно растёт, не переиспользуется)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacterId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterKind {
    Player,
    Enemy,
}

impl CharacterKind {
    pub fn variant(self) -> Variant {
        match self {
            CharacterKind::Player => Variant::Player,
            CharacterKind::Enemy => Variant::Enemy,
        }
    }
}

/// Направления шага enemy tick: вверх, вправо, вниз, влево
pub const ENEMY_DIRECTIONS: [Vec2; 4] = [
    Vec2::new(0.0, 1.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(0.0, -1.0),
    Vec2::new(-1.0, 0.0),
];

/// Что делать с шагом, выброшенным enemy tick'ом
pub trait EnemyMovementPolicy: Send + Sync {
    fn apply(
        &mut self,
        id: CharacterId,
        entity: &mut RagdollEntity,
        step: Vec2,
        world: &mut dyn PhysicsWorld,
    ) -> Result<()>;
}

/// Политика по умолчанию: шаг считается, но враги стоят на месте
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldPosition;

impl EnemyMovementPolicy for HoldPosition {
    fn apply(&mut self, _: CharacterId, _: &mut RagdollEntity, _: Vec2, _: &mut dyn PhysicsWorld) -> Result<()> {
        Ok(())
    }
}

/// Тянет врага к точке `position + step * distance` (пиксели)
#[derive(Debug, Clone, Copy)]
pub struct NudgeTowardStep {
    pub distance: f32,
}

impl EnemyMovementPolicy for NudgeTowardStep {
    fn apply(
        &mut self,
        _: CharacterId,
        entity: &mut RagdollEntity,
        step: Vec2,
        world: &mut dyn PhysicsWorld,
    ) -> Result<()> {
        let target = entity.position(world)? + step * self.distance;
        entity.move_character(target, world)?;
        Ok(())
    }
}

/// Отсечённая конечность, ещё видимая до fade-out
#[derive(Debug, Clone)]
pub struct DebrisLimb {
    pub owner: CharacterId,
    pub limb_index: usize,
    pub body: BodyHandle,
    pub fade: Timer,
}

/// Уведомления roster'а (plugin превращает их в Bevy events)
#[derive(Debug, Clone, PartialEq)]
pub enum RosterEvent {
    Spawned {
        id: CharacterId,
        kind: CharacterKind,
    },
    Damaged {
        target: CharacterId,
        attacker: CharacterId,
        limb_index: usize,
        amount: f32,
        health: f32,
    },
    LimbSevered {
        owner: CharacterId,
        limb_index: usize,
    },
    PendingDestruction {
        id: CharacterId,
    },
    Destroyed {
        id: CharacterId,
        kind: CharacterKind,
    },
}

/// Slot roster'а
#[derive(Debug)]
pub struct RosterEntry {
    id: CharacterId,
    kind: CharacterKind,
    entity: RagdollEntity,
    /// Индекс spawn anchor'а (только враги)
    spawn_anchor: Option<usize>,
}

impl RosterEntry {
    pub fn id(&self) -> CharacterId {
        self.id
    }

    pub fn kind(&self) -> CharacterKind {
        self.kind
    }

    pub fn entity(&self) -> &RagdollEntity {
        &self.entity
    }

    pub fn spawn_anchor(&self) -> Option<usize> {
        self.spawn_anchor
    }
}

#[derive(Resource)]
pub struct CharacterRoster {
    config: RosterConfig,
    tuning: CharacterTuning,
    rng: DeterministicRng,
    shapes: ShapeCache,

    entries: Vec<RosterEntry>,
    destruction_timers: BTreeMap<CharacterId, Timer>,
    spawn_cursor: usize,
    next_id: u64,

    registry: BodyRegistry,
    debris: Vec<DebrisLimb>,
    enemy_tick: Timer,
    movement_policy: Box<dyn EnemyMovementPolicy>,
    swipe: SwipeTracker,

    events: Vec<RosterEvent>,
}

impl CharacterRoster {
    /// Заполняет весь spawn pool: slot 0 игрок, остальное враги.
    ///
    /// Тела всех персонажей создаются первым проходом, joints вторым.
    pub fn new(
        config: &SimulationConfig,
        rng: DeterministicRng,
        shapes: ShapeCache,
        world: &mut dyn PhysicsWorld,
    ) -> Result<Self> {
        config.validate()?;

        let mut roster = Self {
            config: config.roster.clone(),
            tuning: config.character.clone(),
            rng,
            shapes,
            entries: Vec::with_capacity(config.roster.capacity),
            destruction_timers: BTreeMap::new(),
            spawn_cursor: 0,
            next_id: 0,
            registry: BodyRegistry::new(),
            debris: Vec::new(),
            enemy_tick: Timer::from_seconds(config.roster.enemy_tick_secs, TimerMode::Repeating),
            movement_policy: Box::new(HoldPosition),
            swipe: SwipeTracker::new(&config.gesture),
            events: Vec::new(),
        };

        if let Err(err) = roster.populate(world) {
            roster.discard_all(world);
            return Err(err);
        }

        logger::log_info(&format!(
            "CharacterRoster::new: {} characters, {} bodies registered",
            roster.entries.len(),
            roster.registry.len()
        ));
        Ok(roster)
    }

    /// Игрок, враги до capacity, затем joints всех (второй проход)
    fn populate(&mut self, world: &mut dyn PhysicsWorld) -> Result<()> {
        self.spawn_entity(CharacterKind::Player, world)?;
        while self.entries.len() < self.config.capacity {
            self.spawn_entity(CharacterKind::Enemy, world)?;
        }
        for entry in &mut self.entries {
            entry.entity.create_joints(world)?;
        }
        Ok(())
    }

    /// Разбирает частично собранный roster: мир остаётся таким, каким был до `new`
    fn discard_all(&mut self, world: &mut dyn PhysicsWorld) {
        for entry in self.entries.drain(..) {
            let mut entity = entry.entity;
            let released = entity
                .release_joints(world)
                .and_then(|()| entity.release_bodies(world));
            if let Err(err) = released {
                logger::log_error(&format!("CharacterRoster::new: discard of {:?} failed: {}", entry.id, err));
            }
        }
        self.registry = BodyRegistry::new();
    }

    /// Спавн персонажа с joints. Игрок всегда занимает slot 0 (старый игрок
    /// разбирается), враг добавляется в конец.
    pub fn create_character(&mut self, kind: CharacterKind, world: &mut dyn PhysicsWorld) -> Result<CharacterId> {
        if kind == CharacterKind::Player {
            if let Some(previous) = self.player_id() {
                self.teardown(previous, world)?;
            }
        }
        let id = self.spawn_entity(kind, world)?;
        let index = self.index_of(id).ok_or(SimulationError::UnknownCharacter(id))?;
        self.entries[index].entity.create_joints(world)?;
        Ok(id)
    }

    /// Первый проход: тела + registry, без joints
    fn spawn_entity(&mut self, kind: CharacterKind, world: &mut dyn PhysicsWorld) -> Result<CharacterId> {
        if kind == CharacterKind::Enemy && self.entries.len() >= self.config.capacity {
            return Err(SimulationError::RosterFull {
                capacity: self.config.capacity,
            });
        }

        let (params, spawn_anchor) = match kind {
            CharacterKind::Player => (self.player_params(), None),
            CharacterKind::Enemy => {
                let (params, anchor) = self.roll_enemy_params();
                (params, Some(anchor))
            }
        };

        let entity = RagdollEntity::spawn(&params, &self.tuning, &mut self.rng, world, &self.shapes)?;
        let id = CharacterId(self.next_id);
        self.next_id += 1;
        self.registry.register(id, &entity);

        let entry = RosterEntry {
            id,
            kind,
            entity,
            spawn_anchor,
        };
        match kind {
            CharacterKind::Player => self.entries.insert(0, entry),
            CharacterKind::Enemy => self.entries.push(entry),
        }

        logger::log_info(&format!(
            "CharacterRoster: spawned {:?} {:?} ({} limbs) at {:?}",
            kind, id, params.number_of_limbs, params.position
        ));
        self.events.push(RosterEvent::Spawned { id, kind });
        Ok(id)
    }

    fn player_params(&self) -> SpawnParams {
        let player = &self.config.player;
        SpawnParams {
            variant: Variant::Player,
            number_of_limbs: player.number_of_limbs,
            limb_size_range: Vec2::from(player.limb_size_range),
            stat_range: Vec2::from(player.stat_range),
            position: Vec2::from(player.position),
        }
    }

    /// Ролл параметров врага; anchor выбирается round-robin
    fn roll_enemy_params(&mut self) -> (SpawnParams, usize) {
        let enemy = &self.config.enemy;
        let rng = &mut self.rng;

        let number_of_limbs = rng.range_i32(enemy.limb_count[0] as i32, enemy.limb_count[1] as i32) as usize;
        let limb_size_range = Vec2::new(
            rng.range_f32(enemy.limb_size_low[0], enemy.limb_size_low[1]),
            rng.range_f32(enemy.limb_size_high[0], enemy.limb_size_high[1]),
        );
        let stat_range = Vec2::new(
            rng.range_f32(enemy.stat_low[0], enemy.stat_low[1]),
            rng.range_f32(enemy.stat_high[0], enemy.stat_high[1]),
        );

        let anchor = self.spawn_cursor;
        self.spawn_cursor = (self.spawn_cursor + 1) % self.config.spawn_anchors.len();
        let jitter = Vec2::new(
            rng.range_f32(enemy.jitter_x[0], enemy.jitter_x[1]),
            rng.range_f32(enemy.jitter_y[0], enemy.jitter_y[1]),
        );

        let params = SpawnParams {
            variant: Variant::Enemy,
            number_of_limbs,
            limb_size_range,
            stat_range,
            position: self.config.anchor(anchor) + jitter,
        };
        (params, anchor)
    }

    // ========================================================================
    // Contacts
    // ========================================================================

    /// Начало контакта двух тел
    pub fn on_contact_start(&mut self, a: BodyHandle, b: BodyHandle, world: &mut dyn PhysicsWorld) -> Result<()> {
        let hits = resolve_hits(
            self.registry.owner(a),
            self.registry.owner(b),
            self.config.allow_self_damage,
        );
        for hit in hits {
            self.apply_hit(hit, world)?;
        }
        Ok(())
    }

    /// Конец контакта: урон считается только на старте
    pub fn on_contact_end(&mut self, _a: BodyHandle, _b: BodyHandle) {}

    pub fn handle_contact(&mut self, event: ContactEvent, world: &mut dyn PhysicsWorld) -> Result<()> {
        match event {
            ContactEvent::Started(a, b) => self.on_contact_start(a, b, world),
            ContactEvent::Ended(a, b) => {
                self.on_contact_end(a, b);
                Ok(())
            }
        }
    }

    fn apply_hit(&mut self, hit: Hit, world: &mut dyn PhysicsWorld) -> Result<()> {
        let Some(attacker) = self.index_of(hit.attacker) else {
            return Ok(());
        };
        let amount = self.entries[attacker].entity.damage();

        let Some(target) = self.index_of(hit.target) else {
            return Ok(());
        };
        let entity = &mut self.entries[target].entity;
        if !entity.is_alive() {
            return Ok(());
        }

        let was_cooling_down = entity.damage_cooldown_active();
        let severed = entity.deal_damage(hit.limb_index, amount)?;
        if was_cooling_down || !entity.damage_cooldown_active() {
            // debounce или уже отсечённая конечность
            return Ok(());
        }

        let health = entity.health();
        self.events.push(RosterEvent::Damaged {
            target: hit.target,
            attacker: hit.attacker,
            limb_index: hit.limb_index,
            amount,
            health,
        });

        if severed {
            entity.detach_limb(hit.limb_index, world)?;
            let body = entity.limbs()[hit.limb_index].body();
            self.debris.push(DebrisLimb {
                owner: hit.target,
                limb_index: hit.limb_index,
                body,
                fade: Timer::from_seconds(self.config.debris_fade_secs, TimerMode::Once),
            });
            self.events.push(RosterEvent::LimbSevered {
                owner: hit.target,
                limb_index: hit.limb_index,
            });
            logger::log_info(&format!(
                "CharacterRoster: {:?} lost limb {} to {:?}",
                hit.target, hit.limb_index, hit.attacker
            ));
        }

        if entity.is_dead() {
            self.begin_destruction(hit.target, world)?;
        }
        Ok(())
    }

    /// `Alive → PendingDestruction`: тела выходят из registry, ragdoll
    /// взрывается, стартует grace timer. Повторный вызов: no-op.
    pub fn begin_destruction(&mut self, id: CharacterId, world: &mut dyn PhysicsWorld) -> Result<bool> {
        let index = self.index_of(id).ok_or(SimulationError::UnknownCharacter(id))?;
        if self.destruction_timers.contains_key(&id) || !self.entries[index].entity.begin_pending_destruction() {
            return Ok(false);
        }

        self.registry.unregister(id);
        self.entries[index].entity.explode(world, &mut self.rng)?;
        self.destruction_timers.insert(
            id,
            Timer::from_seconds(self.config.destruction_grace_secs, TimerMode::Once),
        );
        self.events.push(RosterEvent::PendingDestruction { id });
        logger::log_info(&format!(
            "💀 CharacterRoster: {:?} is down, destruction in {}s",
            id, self.config.destruction_grace_secs
        ));
        Ok(true)
    }

    // ========================================================================
    // Tick
    // ========================================================================

    pub fn update(&mut self, delta: Duration, world: &mut dyn PhysicsWorld) -> Result<()> {
        for entry in &mut self.entries {
            if entry.entity.is_alive() {
                entry.entity.update(delta, world)?;
            }
        }

        self.swipe.tick(delta);
        self.tick_enemies(delta, world)?;

        for debris in &mut self.debris {
            debris.fade.tick(delta);
        }
        self.debris.retain(|debris| !debris.fade.finished());

        let mut elapsed = Vec::new();
        for (id, timer) in &mut self.destruction_timers {
            timer.tick(delta);
            if timer.finished() {
                elapsed.push(*id);
            }
        }
        for id in elapsed {
            self.destroy_character(id, world)?;
        }
        Ok(())
    }

    fn tick_enemies(&mut self, delta: Duration, world: &mut dyn PhysicsWorld) -> Result<()> {
        self.enemy_tick.tick(delta);
        for _ in 0..self.enemy_tick.times_finished_this_tick() {
            for entry in self.entries.iter_mut().skip(1) {
                if entry.kind != CharacterKind::Enemy || !entry.entity.is_alive() {
                    continue;
                }
                let direction = self.rng.range_i32(0, ENEMY_DIRECTIONS.len() as i32 - 1) as usize;
                self.movement_policy
                    .apply(entry.id, &mut entry.entity, ENEMY_DIRECTIONS[direction], world)?;
            }
        }
        Ok(())
    }

    /// Уничтожает персонажа и сразу спавнит замену того же класса.
    /// Возвращает id замены.
    pub fn destroy_character(&mut self, id: CharacterId, world: &mut dyn PhysicsWorld) -> Result<CharacterId> {
        let kind = self.teardown(id, world)?;
        self.create_character(kind, world)
    }

    /// Шаги 3-4 уничтожения (без замены). Персонаж без grace timer'а (замена
    /// игрока) просто отпускает joints, без взрыва.
    fn teardown(&mut self, id: CharacterId, world: &mut dyn PhysicsWorld) -> Result<CharacterKind> {
        let index = self.index_of(id).ok_or(SimulationError::UnknownCharacter(id))?;

        self.registry.unregister(id);
        self.debris.retain(|debris| debris.owner != id);
        let entity = &mut self.entries[index].entity;
        entity.release_joints(world)?;
        entity.release_bodies(world)?;

        let entry = self.entries.remove(index);
        self.destruction_timers.remove(&id);

        self.events.push(RosterEvent::Destroyed { id, kind: entry.kind });
        logger::log_info(&format!("CharacterRoster: destroyed {:?} {:?}", entry.kind, id));
        Ok(entry.kind)
    }

    // ========================================================================
    // Input
    // ========================================================================

    /// Touch жест → движение или swing игрока
    pub fn handle_touch_event(&mut self, event: &TouchEvent, world: &mut dyn PhysicsWorld) -> Result<GestureSignal> {
        let player_can_move = self.player().is_some_and(RagdollEntity::is_alive);
        let signal = self.swipe.handle(event, player_can_move);

        match signal {
            GestureSignal::Move(screen) => {
                let target = self.screen_to_world(screen, world)?;
                if let Some(player) = self.player_mut() {
                    player.move_character(target, world)?;
                }
            }
            GestureSignal::Swing { from, to } => {
                if let Some(player) = self.player_mut() {
                    player.swing_in_direction(from, to, world)?;
                }
            }
            GestureSignal::Idle => {}
        }
        Ok(signal)
    }

    /// Камера следует за игроком: центр экрана = позиция игрока
    pub fn screen_to_world(&self, screen: Vec2, world: &dyn PhysicsWorld) -> Result<Vec2> {
        let offset = screen - self.config.screen_center();
        match self.player() {
            Some(player) => Ok(player.position(world)? + offset),
            None => Ok(offset),
        }
    }

    pub fn set_movement_policy(&mut self, policy: Box<dyn EnemyMovementPolicy>) {
        self.movement_policy = policy;
    }

    pub fn drain_events(&mut self) -> Vec<RosterEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn characters(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn character(&self, id: CharacterId) -> Option<&RagdollEntity> {
        self.entries.iter().find(|entry| entry.id == id).map(|entry| &entry.entity)
    }

    pub fn character_mut(&mut self, id: CharacterId) -> Option<&mut RagdollEntity> {
        self.entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .map(|entry| &mut entry.entity)
    }

    pub fn index_of(&self, id: CharacterId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    pub fn player_id(&self) -> Option<CharacterId> {
        self.entries
            .first()
            .filter(|entry| entry.kind == CharacterKind::Player)
            .map(|entry| entry.id)
    }

    pub fn player(&self) -> Option<&RagdollEntity> {
        self.entries
            .first()
            .filter(|entry| entry.kind == CharacterKind::Player)
            .map(|entry| &entry.entity)
    }

    pub fn player_mut(&mut self) -> Option<&mut RagdollEntity> {
        self.entries
            .first_mut()
            .filter(|entry| entry.kind == CharacterKind::Player)
            .map(|entry| &mut entry.entity)
    }

    pub fn is_pending_destruction(&self, id: CharacterId) -> bool {
        self.destruction_timers.contains_key(&id)
    }

    pub fn pending_destruction_count(&self) -> usize {
        self.destruction_timers.len()
    }

    pub fn debris(&self) -> &[DebrisLimb] {
        &self.debris
    }

    pub fn registry(&self) -> &BodyRegistry {
        &self.registry
    }

    pub fn swipe(&self) -> &SwipeTracker {
        &self.swipe
    }

    /// Следующий spawn anchor врага
    pub fn spawn_cursor(&self) -> usize {
        self.spawn_cursor
    }

    /// Детерминированный snapshot (порядок slot'ов, статы, позиции тел)
    pub fn snapshot(&self, world: &dyn PhysicsWorld) -> Vec<u8> {
        let mut snapshot = Vec::new();
        for entry in &self.entries {
            let entity = &entry.entity;
            snapshot.extend_from_slice(&entry.id.0.to_le_bytes());
            snapshot.extend_from_slice(
                format!("{:?} {:?} {:?} {}", entry.kind, entity.state(), entry.spawn_anchor, entity.health())
                    .as_bytes(),
            );
            for limb in entity.limbs() {
                snapshot.extend_from_slice(
                    format!("{:?} {:?} {}", limb.kind(), limb.stats(), limb.is_severed()).as_bytes(),
                );
                if let Ok(position) = world.body_position(limb.body()) {
                    snapshot.extend_from_slice(&position.x.to_le_bytes());
                    snapshot.extend_from_slice(&position.y.to_le_bytes());
                }
            }
        }
        for (id, timer) in &self.destruction_timers {
            snapshot.extend_from_slice(&id.0.to_le_bytes());
            snapshot.extend_from_slice(&timer.elapsed().as_nanos().to_le_bytes());
        }
        snapshot
    }
}

#[cfg(test)]
#[path = "roster_tests.rs"]
mod roster_tests;
