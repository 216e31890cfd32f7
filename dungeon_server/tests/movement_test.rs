/// Integration tests for client movement reports flowing through a scene:
/// acceptance, replay and speed rejection, resync replies, and position sync.
use std::time::{Duration, Instant};

use engine_core::{EntityRecord, PositionSyncLink, Recipient, Scene, SceneConfig, ServerEvent};
use handle::{EntityHandle, EntityKind, HandleAllocator};
use movement::{EndMove, MoveReject, StartMove, UpdateMove};
use space::{TilePos, WalkableGrid};

fn make_scene(w: u32, h: u32) -> Scene<EntityRecord> {
    Scene::new(SceneConfig::default(), WalkableGrid::open(w, h).unwrap())
}

fn spawn_role(scene: &mut Scene<EntityRecord>, alloc: &mut HandleAllocator, pos: TilePos, speed: u32) -> EntityHandle {
    let h = alloc.allocate(EntityKind::Role);
    scene.add_entity(EntityRecord::new(h, "role", pos, speed)).unwrap();
    h
}

fn pos_of(scene: &Scene<EntityRecord>, h: EntityHandle) -> TilePos {
    scene.entity(h).map(|e| e.pos).unwrap()
}

fn start(seq: u32, from: TilePos, to: TilePos, speed: u32) -> StartMove {
    StartMove { seq, from, to, speed }
}

#[test]
fn replayed_update_is_rejected_and_position_kept() {
    let mut scene = make_scene(200, 200);
    let mut alloc = HandleAllocator::new();
    let h = spawn_role(&mut scene, &mut alloc, TilePos::new(0, 0), 50);
    let t0 = Instant::now();

    let accepted = scene
        .handle_start_move(h, start(5, TilePos::new(0, 0), TilePos::new(100, 0), 50), t0)
        .unwrap();
    assert_eq!(accepted.pos, TilePos::new(100, 0));
    assert_eq!(pos_of(&scene, h), TilePos::new(100, 0));

    let replay = UpdateMove {
        seq: 4,
        pos: TilePos::new(101, 0),
        speed: 50,
    };
    let err = scene
        .handle_update_move(h, replay, t0 + Duration::from_millis(100))
        .unwrap_err();
    assert!(matches!(err, MoveReject::SeqInvalid { seq: 4, last: 5 }));
    assert_eq!(pos_of(&scene, h), TilePos::new(100, 0));
    assert_eq!(scene.take_rejected_moves(), 1);
}

#[test]
fn update_budget_uses_the_interval_floor() {
    let mut scene = make_scene(200, 200);
    let mut alloc = HandleAllocator::new();
    let origin = TilePos::new(0, 0);
    let first = TilePos::new(10, 0);
    let a = spawn_role(&mut scene, &mut alloc, origin, 20);
    let b = spawn_role(&mut scene, &mut alloc, origin, 20);
    let t0 = Instant::now();
    let t1 = t0 + Duration::from_millis(10);

    for h in [a, b] {
        scene.handle_start_move(h, start(1, origin, first, 20), t0).unwrap();
    }

    // 20 tiles/s over the 50 ms floor plus 50 tiles of slack.
    let at_bound = UpdateMove {
        seq: 2,
        pos: TilePos::new(61, 0),
        speed: 20,
    };
    assert!(scene.handle_update_move(a, at_bound, t1).is_ok());
    assert_eq!(pos_of(&scene, a), TilePos::new(61, 0));

    let past_bound = UpdateMove {
        seq: 2,
        pos: TilePos::new(62, 0),
        speed: 20,
    };
    let err = scene.handle_update_move(b, past_bound, t1).unwrap_err();
    assert!(matches!(err, MoveReject::TooFast { .. }));
    assert_eq!(pos_of(&scene, b), first);
}

#[test]
fn rejection_resyncs_only_the_sender() {
    let mut scene = make_scene(100, 100);
    let mut alloc = HandleAllocator::new();
    let h = spawn_role(&mut scene, &mut alloc, TilePos::new(5, 5), 10);
    scene.flush_visibility();
    scene.drain_outbox();

    // Claimed speed above the entity's cap.
    let err = scene
        .handle_start_move(h, start(1, TilePos::new(5, 5), TilePos::new(6, 5), 11), Instant::now())
        .unwrap_err();
    assert!(matches!(err, MoveReject::SpeedInvalid { speed: 11, cap: 10 }));

    let out = scene.drain_outbox();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].recipient, Recipient::Entity(h));
    assert!(matches!(
        out[0].event,
        ServerEvent::EntityStopMove { x: 5, y: 5, seq: 1, .. }
    ));
}

#[test]
fn start_into_a_wall_is_rejected() {
    let grid = WalkableGrid::from_rows(&["....", ".#..", "...."]).unwrap();
    let mut scene = Scene::new(SceneConfig::default(), grid);
    let mut alloc = HandleAllocator::new();
    let h = spawn_role(&mut scene, &mut alloc, TilePos::new(0, 1), 10);

    let err = scene
        .handle_start_move(h, start(1, TilePos::new(0, 1), TilePos::new(1, 1), 10), Instant::now())
        .unwrap_err();
    assert_eq!(err, MoveReject::TargetNotWalkable { x: 1, y: 1 });
    assert_eq!(pos_of(&scene, h), TilePos::new(0, 1));
}

#[test]
fn full_session_broadcasts_and_syncs_on_end() {
    let (link, mut sync_rx) = PositionSyncLink::channel();
    let mut scene = make_scene(100, 100).with_position_sync(link);
    let mut alloc = HandleAllocator::new();
    let h = spawn_role(&mut scene, &mut alloc, TilePos::new(10, 10), 20);
    scene.flush_visibility();
    scene.drain_outbox();
    let t0 = Instant::now();

    scene
        .handle_start_move(h, start(1, TilePos::new(10, 10), TilePos::new(12, 10), 20), t0)
        .unwrap();
    scene
        .handle_update_move(
            h,
            UpdateMove {
                seq: 2,
                pos: TilePos::new(14, 10),
                speed: 20,
            },
            t0 + Duration::from_millis(200),
        )
        .unwrap();
    scene
        .handle_end_move(
            h,
            EndMove {
                seq: 2,
                pos: TilePos::new(15, 10),
            },
            t0 + Duration::from_millis(300),
        )
        .unwrap();

    assert!(!scene.validator().is_moving(h));
    let out = scene.drain_outbox();
    assert_eq!(out.len(), 3);
    assert!(out.iter().all(|o| o.recipient == Recipient::Scene));
    assert!(matches!(out[2].event, ServerEvent::EntityStopMove { x: 15, y: 10, .. }));

    let sync = sync_rx.try_recv().unwrap();
    assert_eq!(sync.handle, h);
    assert_eq!(sync.pos, TilePos::new(15, 10));
    assert!(sync_rx.try_recv().is_err());
}

#[test]
fn update_without_start_is_refused() {
    let mut scene = make_scene(100, 100);
    let mut alloc = HandleAllocator::new();
    let h = spawn_role(&mut scene, &mut alloc, TilePos::new(10, 10), 20);
    let err = scene
        .handle_update_move(
            h,
            UpdateMove {
                seq: 1,
                pos: TilePos::new(11, 10),
                speed: 20,
            },
            Instant::now(),
        )
        .unwrap_err();
    assert_eq!(err, MoveReject::NotMoving);
}

#[test]
fn end_far_from_last_report_is_a_teleport() {
    let mut scene = make_scene(300, 300);
    let mut alloc = HandleAllocator::new();
    let h = spawn_role(&mut scene, &mut alloc, TilePos::new(0, 0), 20);
    let t0 = Instant::now();
    scene
        .handle_start_move(h, start(1, TilePos::new(0, 0), TilePos::new(1, 0), 20), t0)
        .unwrap();

    let err = scene
        .handle_end_move(
            h,
            EndMove {
                seq: 2,
                pos: TilePos::new(150, 0),
            },
            t0 + Duration::from_secs(10),
        )
        .unwrap_err();
    assert!(matches!(err, MoveReject::TeleportDetected { .. }));
    assert_eq!(pos_of(&scene, h), TilePos::new(1, 0));
}

#[test]
fn leaving_the_scene_forgets_the_session() {
    let mut scene = make_scene(100, 100);
    let mut alloc = HandleAllocator::new();
    let h = spawn_role(&mut scene, &mut alloc, TilePos::new(10, 10), 20);
    scene
        .handle_start_move(h, start(7, TilePos::new(10, 10), TilePos::new(11, 10), 20), Instant::now())
        .unwrap();

    let record = scene.remove_entity(h).unwrap();
    scene.add_entity(record).unwrap();

    // Fresh session: a lower seq is valid again.
    let restarted = scene.handle_start_move(h, start(1, TilePos::new(11, 10), TilePos::new(12, 10), 20), Instant::now());
    assert!(restarted.is_ok());
}

#[test]
fn restarting_mid_session_cannot_skip_the_speed_cap() {
    let mut scene = make_scene(2000, 10);
    let mut alloc = HandleAllocator::new();
    let h = spawn_role(&mut scene, &mut alloc, TilePos::new(0, 0), 10);
    let t0 = Instant::now();

    for i in 0..20u32 {
        let here = pos_of(&scene, h);
        let _ = scene.handle_start_move(
            h,
            start(i + 1, here, TilePos::new(here.x + 60, 0), 10),
            t0 + Duration::from_millis(50 * i as u64),
        );
    }

    // Only the opening start fits its one second grace.
    assert_eq!(pos_of(&scene, h), TilePos::new(60, 0));
    assert_eq!(scene.take_rejected_moves(), 19);
}

#[test]
fn restart_after_a_pause_is_measured_from_the_last_report() {
    let mut scene = make_scene(300, 300);
    let mut alloc = HandleAllocator::new();
    let h = spawn_role(&mut scene, &mut alloc, TilePos::new(0, 0), 20);
    let t0 = Instant::now();
    scene
        .handle_start_move(h, start(1, TilePos::new(0, 0), TilePos::new(10, 0), 20), t0)
        .unwrap();

    // 500 ms at 20 tiles/s + 50 = 60 tiles from (10, 0).
    let t1 = t0 + Duration::from_millis(500);
    let err = scene
        .handle_start_move(h, start(2, TilePos::new(10, 0), TilePos::new(71, 0), 20), t1)
        .unwrap_err();
    assert!(matches!(err, MoveReject::TooFast { .. }));
    assert!(scene
        .handle_start_move(h, start(3, TilePos::new(10, 0), TilePos::new(70, 0), 20), t1)
        .is_ok());
    assert_eq!(pos_of(&scene, h), TilePos::new(70, 0));
}

#[test]
fn resent_end_after_close_cannot_teleport() {
    let mut scene = make_scene(2000, 10);
    let mut alloc = HandleAllocator::new();
    let h = spawn_role(&mut scene, &mut alloc, TilePos::new(0, 0), 20);
    let t0 = Instant::now();
    scene
        .handle_start_move(h, start(1, TilePos::new(0, 0), TilePos::new(1, 0), 20), t0)
        .unwrap();
    let close = EndMove {
        seq: 1,
        pos: TilePos::new(1, 0),
    };
    scene.handle_end_move(h, close, t0).unwrap();
    scene.take_rejected_moves();

    for i in 1..=10u32 {
        let resent = EndMove {
            seq: 1,
            pos: TilePos::new(1 + 100 * i, 0),
        };
        let err = scene.handle_end_move(h, resent, t0).unwrap_err();
        assert!(matches!(err, MoveReject::SeqInvalid { seq: 1, last: 1 }));
    }
    assert_eq!(pos_of(&scene, h), TilePos::new(1, 0));
    assert_eq!(scene.take_rejected_moves(), 10);

    // A stale end is refused the same way.
    let stale = EndMove {
        seq: 0,
        pos: TilePos::new(2, 0),
    };
    let err = scene.handle_end_move(h, stale, t0).unwrap_err();
    assert!(matches!(err, MoveReject::SeqInvalid { .. }));
    assert_eq!(pos_of(&scene, h), TilePos::new(1, 0));
}
