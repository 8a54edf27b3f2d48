use super::*;
use crate::input::TouchPhase;
use crate::physics::RapierWorld;
use crate::ragdoll::CharacterState;
use std::sync::{Arc, Mutex};

fn roster_with(config: &SimulationConfig, seed: u64) -> (CharacterRoster, RapierWorld) {
    let mut world = RapierWorld::new(&config.physics);
    let roster = CharacterRoster::new(
        config,
        DeterministicRng::new(seed),
        ShapeCache::with_default_templates(),
        &mut world,
    )
    .unwrap();
    (roster, world)
}

fn default_roster() -> (CharacterRoster, RapierWorld) {
    roster_with(&SimulationConfig::default(), 42)
}

fn first_enemy(roster: &CharacterRoster) -> CharacterId {
    roster.characters()[1].id()
}

fn player_weapon(roster: &CharacterRoster) -> BodyHandle {
    roster.player().unwrap().weapon().unwrap().body()
}

fn limb_body(roster: &CharacterRoster, id: CharacterId, index: usize) -> BodyHandle {
    roster.character(id).unwrap().limbs()[index].body()
}

fn tick(roster: &mut CharacterRoster, world: &mut RapierWorld, millis: u64, times: usize) {
    for _ in 0..times {
        roster.update(Duration::from_millis(millis), world).unwrap();
    }
}

#[test]
fn test_new_fills_spawn_pool() {
    let (roster, world) = default_roster();

    assert_eq!(roster.len(), 4);
    assert_eq!(roster.characters()[0].kind(), CharacterKind::Player);
    assert!(roster.characters()[1..].iter().all(|e| e.kind() == CharacterKind::Enemy));
    assert_eq!(roster.player().unwrap().limbs().len(), 6);

    // Все joints созданы вторым проходом и совпадают с миром
    let joints: usize = roster.characters().iter().map(|e| e.entity().joint_count()).sum();
    assert_eq!(world.joint_count(), joints);

    let bodies: usize = roster.characters().iter().map(|e| e.entity().bodies().len()).sum();
    assert_eq!(roster.registry().len(), bodies);
    assert_eq!(world.body_count(), bodies);
}

#[test]
fn test_enemy_rolls_within_configured_ranges() {
    let (roster, world) = default_roster();
    let config = RosterConfig::default();

    for entry in &roster.characters()[1..] {
        let limbs = entry.entity().limbs().len();
        assert!((4..=10).contains(&limbs), "{} limbs", limbs);

        let anchor = config.anchor(entry.spawn_anchor().unwrap());
        let jitter = entry.entity().position(&world).unwrap() - anchor;
        assert!(jitter.x >= -1e-3 && jitter.x <= 96.0 + 1e-3, "{:?}", jitter);
        assert!(jitter.y >= -1e-3 && jitter.y <= 96.0 + 1e-3, "{:?}", jitter);
    }
}

#[test]
fn test_round_robin_spawn_anchors_wrap() {
    let (mut roster, mut world) = default_roster();
    let mut anchors: Vec<usize> = roster.characters()[1..]
        .iter()
        .filter_map(RosterEntry::spawn_anchor)
        .collect();

    for _ in 0..2 {
        let replacement = roster.destroy_character(first_enemy(&roster), &mut world).unwrap();
        let index = roster.index_of(replacement).unwrap();
        anchors.push(roster.characters()[index].spawn_anchor().unwrap());
    }

    assert_eq!(anchors, vec![0, 1, 2, 3, 0]);
}

#[test]
fn test_enemy_spawn_rejected_when_full() {
    let (mut roster, mut world) = default_roster();
    let result = roster.create_character(CharacterKind::Enemy, &mut world);
    assert!(matches!(result, Err(SimulationError::RosterFull { capacity: 4 })));
    assert_eq!(roster.len(), 4);
}

#[test]
fn test_player_creation_replaces_slot_zero() {
    let (mut roster, mut world) = default_roster();
    let old = roster.player_id().unwrap();
    roster.drain_events();

    let new = roster.create_character(CharacterKind::Player, &mut world).unwrap();

    assert_ne!(old, new);
    assert_eq!(roster.player_id(), Some(new));
    assert_eq!(roster.len(), 4);
    assert_eq!(roster.registry().bodies_of(old), 0);
    assert_eq!(
        roster.drain_events(),
        vec![
            RosterEvent::Destroyed {
                id: old,
                kind: CharacterKind::Player
            },
            RosterEvent::Spawned {
                id: new,
                kind: CharacterKind::Player
            },
        ]
    );
}

#[test]
fn test_weapon_contact_damages_limb_once_per_cooldown() {
    let (mut roster, mut world) = default_roster();
    let player = roster.player_id().unwrap();
    let enemy = first_enemy(&roster);
    let amount = roster.player().unwrap().damage();
    let limbs = roster.character(enemy).unwrap().spawn_limb_count() as f32;
    let weapon = player_weapon(&roster);
    let arm = limb_body(&roster, enemy, 2);
    roster.drain_events();

    roster.on_contact_start(arm, weapon, &mut world).unwrap();
    let health = roster.character(enemy).unwrap().health();
    assert!((health - (100.0 - amount / limbs)).abs() < 1e-3);
    assert_eq!(
        roster.drain_events(),
        vec![RosterEvent::Damaged {
            target: enemy,
            attacker: player,
            limb_index: 2,
            amount,
            health,
        }]
    );

    // Второй contact в окне cooldown: no-op
    roster.on_contact_start(weapon, arm, &mut world).unwrap();
    assert_eq!(roster.character(enemy).unwrap().health(), health);
    assert!(roster.drain_events().is_empty());

    tick(&mut roster, &mut world, 100, 5);
    roster.on_contact_start(weapon, arm, &mut world).unwrap();
    assert!(roster.character(enemy).unwrap().health() < health);
}

#[test]
fn test_self_contact_guarded_by_default() {
    let (mut roster, mut world) = default_roster();
    let player = roster.player_id().unwrap();
    let weapon = player_weapon(&roster);
    let leg = limb_body(&roster, player, 3);
    roster.drain_events();

    roster.on_contact_start(weapon, leg, &mut world).unwrap();
    assert_eq!(roster.player().unwrap().health(), 100.0);
    assert!(roster.drain_events().is_empty());

    let mut config = SimulationConfig::default();
    config.roster.allow_self_damage = true;
    let (mut roster, mut world) = roster_with(&config, 42);
    let player = roster.player_id().unwrap();
    let weapon = player_weapon(&roster);
    let leg = limb_body(&roster, player, 3);

    roster.on_contact_start(weapon, leg, &mut world).unwrap();
    assert!(roster.player().unwrap().health() < 100.0);
}

#[test]
fn test_unknown_bodies_are_ignored() {
    let (mut roster, mut world) = default_roster();
    let wall = world.create_body(&crate::physics::BodyDesc {
        body_type: crate::physics::BodyType::Static,
        position: Vec2::ZERO,
        angle: 0.0,
        fixture: crate::physics::FixtureDef::boxed(Vec2::ONE, crate::physics::PartCategory::Walls.groups()),
    });
    let weapon = player_weapon(&roster);
    roster.drain_events();

    roster.on_contact_start(wall, weapon, &mut world).unwrap();
    roster.on_contact_end(wall, weapon);
    assert!(roster.drain_events().is_empty());
}

#[test]
fn test_severed_limb_becomes_debris_then_fades() {
    let (mut roster, mut world) = default_roster();
    let enemy = first_enemy(&roster);
    let amount = roster.player().unwrap().damage();
    let limbs = roster.character(enemy).unwrap().spawn_limb_count() as f32;
    roster.character_mut(enemy).unwrap().set_health(amount / limbs + 0.01);

    let weapon = player_weapon(&roster);
    let leg = limb_body(&roster, enemy, 3);
    roster.on_contact_start(weapon, leg, &mut world).unwrap();

    let entity = roster.character(enemy).unwrap();
    assert!(entity.is_alive());
    assert!(entity.limb(3).unwrap().is_severed());
    assert!(world.joints_of(leg).is_empty());
    assert_eq!(roster.debris().len(), 1);
    assert_eq!(roster.debris()[0].owner, enemy);
    assert_eq!(roster.debris()[0].limb_index, 3);
    assert!(roster
        .drain_events()
        .contains(&RosterEvent::LimbSevered { owner: enemy, limb_index: 3 }));

    tick(&mut roster, &mut world, 100, 49);
    assert_eq!(roster.debris().len(), 1);
    tick(&mut roster, &mut world, 100, 1);
    assert!(roster.debris().is_empty());
    // Тело debris остаётся у живого владельца
    assert!(world.contains_body(leg));
}

#[test]
fn test_lethal_hit_destroys_and_replaces_after_grace() {
    let (mut roster, mut world) = default_roster();
    let enemy = first_enemy(&roster);
    roster.character_mut(enemy).unwrap().set_health(0.5);
    let weapon = player_weapon(&roster);
    let torso = limb_body(&roster, enemy, 0);
    let enemy_bodies: Vec<BodyHandle> = roster
        .character(enemy)
        .unwrap()
        .bodies()
        .into_iter()
        .map(|(body, _)| body)
        .collect();

    roster.on_contact_start(weapon, torso, &mut world).unwrap();
    assert!(roster.is_pending_destruction(enemy));
    assert_eq!(roster.pending_destruction_count(), 1);
    assert_eq!(
        roster.character(enemy).unwrap().state(),
        CharacterState::PendingDestruction
    );

    // Повторный летальный contact не заводит второй timer
    roster.on_contact_start(torso, weapon, &mut world).unwrap();
    assert!(!roster.begin_destruction(enemy, &mut world).unwrap());
    assert_eq!(roster.pending_destruction_count(), 1);
    roster.drain_events();

    // Взрыв сразу: joints сняты, тела ждут grace timer
    assert_eq!(roster.character(enemy).unwrap().joint_count(), 0);
    assert_eq!(roster.registry().bodies_of(enemy), 0);
    assert!(enemy_bodies.iter().all(|body| world.contains_body(*body)));
    assert!(enemy_bodies.iter().all(|body| world.joints_of(*body).is_empty()));

    tick(&mut roster, &mut world, 100, 29);
    assert!(roster.index_of(enemy).is_some());

    tick(&mut roster, &mut world, 100, 1);
    assert!(roster.index_of(enemy).is_none());
    assert!(!roster.is_pending_destruction(enemy));
    assert_eq!(roster.len(), 4);
    assert_eq!(roster.registry().bodies_of(enemy), 0);
    assert!(roster.debris().iter().all(|d| d.owner != enemy));
    assert!(enemy_bodies.iter().all(|body| !world.contains_body(*body)));

    let joints: usize = roster.characters().iter().map(|e| e.entity().joint_count()).sum();
    assert_eq!(world.joint_count(), joints);

    let events = roster.drain_events();
    assert_eq!(
        events[0],
        RosterEvent::Destroyed {
            id: enemy,
            kind: CharacterKind::Enemy
        }
    );
    assert!(matches!(
        events[1],
        RosterEvent::Spawned {
            kind: CharacterKind::Enemy,
            ..
        }
    ));

    // Старые тела больше не резолвятся
    roster.on_contact_start(weapon, torso, &mut world).unwrap();
    assert!(roster.drain_events().is_empty());
}

#[test]
fn test_exploded_limbs_spin_during_grace() {
    let (mut roster, mut world) = default_roster();
    let enemy = first_enemy(&roster);
    let limbs: Vec<BodyHandle> = roster
        .character(enemy)
        .unwrap()
        .limbs()
        .iter()
        .map(|limb| limb.body())
        .collect();
    let before: Vec<f32> = limbs.iter().map(|b| world.body_angle(*b).unwrap()).collect();

    roster.character_mut(enemy).unwrap().set_health(0.0);
    assert!(roster.begin_destruction(enemy, &mut world).unwrap());

    for _ in 0..10 {
        world.step(1.0 / 60.0);
        tick(&mut roster, &mut world, 16, 1);
    }

    assert!(roster.index_of(enemy).is_some());
    assert!(limbs.iter().all(|body| world.contains_body(*body)));
    let rotated = limbs
        .iter()
        .zip(&before)
        .any(|(body, angle)| (world.body_angle(*body).unwrap() - angle).abs() > 1e-3);
    assert!(rotated, "no limb rotated after the explosion");

    tick(&mut roster, &mut world, 100, 30);
    assert!(roster.index_of(enemy).is_none());
    assert!(limbs.iter().all(|body| !world.contains_body(*body)));
}

#[derive(Clone, Default)]
struct RecordingPolicy(Arc<Mutex<Vec<(CharacterId, Vec2)>>>);

impl EnemyMovementPolicy for RecordingPolicy {
    fn apply(&mut self, id: CharacterId, _: &mut RagdollEntity, step: Vec2, _: &mut dyn PhysicsWorld) -> Result<()> {
        self.0.lock().unwrap().push((id, step));
        Ok(())
    }
}

#[test]
fn test_enemy_tick_hands_steps_to_policy() {
    let (mut roster, mut world) = default_roster();
    let policy = RecordingPolicy::default();
    roster.set_movement_policy(Box::new(policy.clone()));

    tick(&mut roster, &mut world, 1900, 1);
    assert!(policy.0.lock().unwrap().is_empty());

    tick(&mut roster, &mut world, 100, 1);
    let steps = policy.0.lock().unwrap().clone();
    let enemies: Vec<CharacterId> = roster.characters()[1..].iter().map(RosterEntry::id).collect();
    assert_eq!(steps.iter().map(|(id, _)| *id).collect::<Vec<_>>(), enemies);
    assert!(steps.iter().all(|(_, step)| ENEMY_DIRECTIONS.contains(step)));
}

#[test]
fn test_hold_position_leaves_enemies_alone() {
    let (mut roster, mut world) = default_roster();
    tick(&mut roster, &mut world, 1000, 2);
    for entry in &roster.characters()[1..] {
        let torso = entry.entity().limbs()[0].body();
        assert_eq!(world.pending_force(torso).unwrap(), Vec2::ZERO);
    }

    roster.set_movement_policy(Box::new(NudgeTowardStep { distance: 32.0 }));
    tick(&mut roster, &mut world, 1000, 2);
    for entry in &roster.characters()[1..] {
        let torso = entry.entity().limbs()[0].body();
        assert_ne!(world.pending_force(torso).unwrap(), Vec2::ZERO);
    }
}

#[test]
fn test_touch_down_moves_player_relative_to_screen_center() {
    let (mut roster, mut world) = default_roster();
    let center = RosterConfig::default().screen_center();
    let at = center + Vec2::new(100.0, 0.0);

    let signal = roster
        .handle_touch_event(&TouchEvent::new(TouchPhase::Began, at, at), &mut world)
        .unwrap();
    assert_eq!(signal, GestureSignal::Move(at));

    let player = roster.player().unwrap();
    let force = world.pending_force(player.limbs()[0].body()).unwrap();
    assert!((force - Vec2::new(player.total_speed(), 0.0)).length() < 1e-3, "{:?}", force);
    assert_eq!(
        roster.screen_to_world(at, &world).unwrap(),
        Vec2::new(300.0, 200.0)
    );
}

#[test]
fn test_swipe_swings_player_weapon() {
    let (mut roster, mut world) = default_roster();
    let down = Vec2::new(500.0, 380.0);
    roster
        .handle_touch_event(&TouchEvent::new(TouchPhase::Began, down, down), &mut world)
        .unwrap();
    roster
        .handle_touch_event(
            &TouchEvent::new(TouchPhase::Moved, down + Vec2::X, down),
            &mut world,
        )
        .unwrap();

    tick(&mut roster, &mut world, 150, 1);
    let signal = roster
        .handle_touch_event(
            &TouchEvent::new(TouchPhase::Moved, down + Vec2::new(40.0, 0.0), down + Vec2::X),
            &mut world,
        )
        .unwrap();

    assert_eq!(
        signal,
        GestureSignal::Swing {
            from: down,
            to: down + Vec2::new(40.0, 0.0)
        }
    );
    assert!(roster.player().unwrap().is_swinging());
}

#[test]
fn test_touch_ignored_while_player_pending_destruction() {
    let (mut roster, mut world) = default_roster();
    let player = roster.player_id().unwrap();
    roster.character_mut(player).unwrap().set_health(0.0);
    assert!(roster.begin_destruction(player, &mut world).unwrap());

    let at = Vec2::new(10.0, 10.0);
    let signal = roster
        .handle_touch_event(&TouchEvent::new(TouchPhase::Began, at, at), &mut world)
        .unwrap();
    assert_eq!(signal, GestureSignal::Idle);
    assert_eq!(roster.swipe().touch_count(), 0);
}

#[test]
fn test_snapshot_deterministic_per_seed() {
    let config = SimulationConfig::default();
    let (a, world_a) = roster_with(&config, 42);
    let (b, world_b) = roster_with(&config, 42);
    let (c, world_c) = roster_with(&config, 43);

    assert_eq!(a.snapshot(&world_a), b.snapshot(&world_b));
    assert_ne!(a.snapshot(&world_a), c.snapshot(&world_c));
}
