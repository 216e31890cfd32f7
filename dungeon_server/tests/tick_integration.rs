/// Integration tests for SceneActor driven by a configured world: mailbox
/// commands, monster movers, and per-tick outbound batches.
use std::time::{Duration, Instant};

use dungeon_server::config::ServerConfig;
use dungeon_server::world;
use engine_core::command::OutboundRx;
use engine_core::{AiMode, EntityRecord, PositionSyncLink, Recipient, SceneActor, SceneCommand, ServerEvent};
use handle::{EntityKind, HandleAllocator};
use movement::{EndMove, StartMove};
use space::{SpawnArea, TilePos};
use tokio::sync::mpsc;

fn small_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.scene.width = 80;
    config.scene.height = 80;
    config.scene.obstacle_ratio = 0.0;
    config.monsters.count = 3;
    config.monsters.spawn_area = Some(SpawnArea {
        x1: 40,
        y1: 40,
        x2: 45,
        y2: 45,
    });
    config
}

fn make_actor(
    config: &ServerConfig,
) -> (
    SceneActor<EntityRecord>,
    mpsc::UnboundedSender<SceneCommand<EntityRecord>>,
    OutboundRx,
    HandleAllocator,
) {
    let mut scene = world::build_scene(config, PositionSyncLink::disconnected()).unwrap();
    let mut alloc = HandleAllocator::new();
    let (tx, rx) = mpsc::unbounded_channel();
    for mover in world::spawn_monsters(&mut scene, &mut alloc, config) {
        tx.send(SceneCommand::AttachMover(mover)).unwrap();
    }
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let actor = SceneActor::new(config.to_tick_config(), scene, rx).with_outbound(out_tx);
    (actor, tx, out_rx, alloc)
}

#[test]
fn monsters_attach_on_first_tick() {
    let config = small_config();
    let (mut actor, _tx, _out, _alloc) = make_actor(&config);
    assert_eq!(actor.mover_count(), 0);

    let metrics = actor.step();
    assert_eq!(metrics.command_count, 3);
    assert_eq!(metrics.entity_count, 3);
    assert_eq!(actor.mover_count(), 3);
}

#[test]
fn joining_role_sees_nearby_monsters() {
    let config = small_config();
    let (mut actor, tx, mut out, mut alloc) = make_actor(&config);
    actor.step();
    while out.try_recv().is_ok() {}

    let role = alloc.allocate(EntityKind::Role);
    tx.send(SceneCommand::Join(EntityRecord::new(role, "hero", TilePos::new(42, 42), 10)))
        .unwrap();
    let metrics = actor.step();
    assert_eq!(metrics.appear_count, 3);

    let batch = out.try_recv().unwrap();
    let appears: Vec<_> = batch
        .iter()
        .filter(|o| matches!(o.event, ServerEvent::EntityAppear(_)))
        .collect();
    assert_eq!(appears.len(), 3);
    assert!(appears.iter().all(|o| o.recipient == Recipient::Entity(role)));
}

#[test]
fn monsters_chase_a_role_in_range() {
    let config = small_config();
    let (mut actor, tx, _out, mut alloc) = make_actor(&config);
    let t0 = Instant::now();
    actor.step_at(t0);

    let role = alloc.allocate(EntityKind::Role);
    let role_pos = TilePos::new(42, 44);
    let monsters: Vec<_> = actor.scene().handles().collect();
    let total_distance = |actor: &SceneActor<EntityRecord>| -> f64 {
        monsters
            .iter()
            .filter_map(|&h| actor.scene().entity(h))
            .map(|e| e.pos.distance(role_pos))
            .sum()
    };
    let before = total_distance(&actor);

    tx.send(SceneCommand::Join(EntityRecord::new(role, "hero", role_pos, 10)))
        .unwrap();
    // One second of scene time per step so every mover is due.
    actor.step_at(t0 + Duration::from_secs(1));
    actor.step_at(t0 + Duration::from_secs(2));

    assert!(total_distance(&actor) < before);
}

#[test]
fn client_session_round_trip_through_mailbox() {
    let config = small_config();
    let (mut actor, tx, mut out, mut alloc) = make_actor(&config);
    actor.step();

    let role = alloc.allocate(EntityKind::Role);
    tx.send(SceneCommand::Join(EntityRecord::new(role, "hero", TilePos::new(5, 5), 10)))
        .unwrap();
    tx.send(SceneCommand::StartMove {
        handle: role,
        req: StartMove {
            seq: 1,
            from: TilePos::new(5, 5),
            to: TilePos::new(7, 5),
            speed: 10,
        },
    })
    .unwrap();
    tx.send(SceneCommand::EndMove {
        handle: role,
        req: EndMove {
            seq: 1,
            pos: TilePos::new(8, 5),
        },
    })
    .unwrap();
    while out.try_recv().is_ok() {}

    let metrics = actor.step();
    assert_eq!(metrics.moves_rejected, 0);
    assert_eq!(actor.scene().entity(role).map(|e| e.pos), Some(TilePos::new(8, 5)));

    let batch = out.try_recv().unwrap();
    assert!(batch.iter().any(|o| matches!(
        o.event,
        ServerEvent::EntityStopMove { handle, x: 8, y: 5, .. } if handle == role
    )));
}

#[test]
fn leave_drops_entity_and_mover() {
    let config = small_config();
    let (mut actor, tx, _out, _alloc) = make_actor(&config);
    actor.step();
    let monster = actor.scene().handles().next().unwrap();

    tx.send(SceneCommand::Leave(monster)).unwrap();
    actor.step();
    assert!(!actor.scene().contains(monster));
    assert_eq!(actor.mover_count(), 2);
}

#[test]
fn monster_mode_starts_as_patrol() {
    let config = small_config();
    let mut scene = world::build_scene(&config, PositionSyncLink::disconnected()).unwrap();
    let mut alloc = HandleAllocator::new();
    let movers = world::spawn_monsters(&mut scene, &mut alloc, &config);
    assert!(movers.iter().all(|m| m.mode() == AiMode::Patrol));
}

#[test]
fn run_stops_at_max_ticks() {
    let mut config = small_config();
    config.tick.tps = 1000;
    config.tick.max_ticks = 4;
    let (mut actor, _tx, _out, _alloc) = make_actor(&config);
    assert_eq!(actor.run(|| false), 4);
    assert_eq!(actor.mover_count(), 3);
}
