/// Integration tests for the interest index and the appear/disappear traffic a
/// scene derives from it.
use engine_core::{EntityRecord, Recipient, Scene, SceneConfig, ServerEvent};
use handle::{EntityHandle, EntityKind, HandleAllocator};
use space::{AoiConfig, AoiManager, TilePos, WalkableGrid};

fn handles(n: usize) -> Vec<EntityHandle> {
    let mut alloc = HandleAllocator::new();
    (0..n).map(|_| alloc.allocate(EntityKind::Role)).collect()
}

// --- AoiManager ---

#[test]
fn two_entities_in_one_cell_see_each_other() {
    let mut aoi = AoiManager::new(AoiConfig::default());
    let hs = handles(2);
    let (a, b) = (hs[0], hs[1]);
    aoi.add_entity(a, TilePos::new(10, 10));
    aoi.add_entity(b, TilePos::new(20, 30));

    let drained = aoi.drain_visibility_changes();
    assert_eq!(drained.len(), 2);
    assert_eq!(aoi.visible(a).unwrap().iter().copied().collect::<Vec<_>>(), vec![b]);
    assert_eq!(aoi.visible(b).unwrap().iter().copied().collect::<Vec<_>>(), vec![a]);
}

#[test]
fn drain_reports_each_change_once() {
    let mut aoi = AoiManager::new(AoiConfig::default());
    let hs = handles(2);
    aoi.add_entity(hs[0], TilePos::new(0, 0));
    aoi.add_entity(hs[1], TilePos::new(1, 1));

    let first = aoi.drain_visibility_changes();
    assert!(!first.is_empty());
    assert!(aoi.drain_visibility_changes().is_empty());
    assert!(aoi.consume_visibility_changes(hs[0]).is_empty());
}

#[test]
fn walking_out_of_range_queues_a_leave_on_both_sides() {
    let mut aoi = AoiManager::new(AoiConfig { cell_size: 10 });
    let hs = handles(2);
    let (a, b) = (hs[0], hs[1]);
    aoi.add_entity(a, TilePos::new(5, 5));
    aoi.add_entity(b, TilePos::new(15, 5));
    aoi.drain_visibility_changes();

    // Cell 3 is three cells from cell 0.
    assert!(aoi.update_entity(b, TilePos::new(35, 5)));
    let a_changes = aoi.consume_visibility_changes(a);
    let b_changes = aoi.consume_visibility_changes(b);
    assert_eq!(a_changes.left, vec![b]);
    assert_eq!(b_changes.left, vec![a]);
    assert!(aoi.visible(a).unwrap().is_empty());
}

#[test]
fn leave_and_return_within_one_tick_nets_out() {
    let mut aoi = AoiManager::new(AoiConfig { cell_size: 10 });
    let hs = handles(2);
    let (a, b) = (hs[0], hs[1]);
    aoi.add_entity(a, TilePos::new(5, 5));
    aoi.add_entity(b, TilePos::new(15, 5));
    aoi.drain_visibility_changes();

    aoi.update_entity(b, TilePos::new(45, 5));
    aoi.update_entity(b, TilePos::new(15, 5));
    assert!(aoi.drain_visibility_changes().is_empty());
    assert!(aoi.visible(a).unwrap().contains(&b));
}

#[test]
fn removal_returns_peers_for_refresh() {
    let mut aoi = AoiManager::new(AoiConfig::default());
    let hs = handles(3);
    for (i, &h) in hs.iter().enumerate() {
        aoi.add_entity(h, TilePos::new(i as u32, 0));
    }
    aoi.drain_visibility_changes();

    let peers = aoi.remove_entity(hs[0]);
    assert_eq!(peers, vec![hs[1], hs[2]]);
    for peer in peers {
        aoi.refresh(peer);
    }
    assert_eq!(aoi.consume_visibility_changes(hs[1]).left, vec![hs[0]]);
    assert_eq!(aoi.consume_visibility_changes(hs[2]).left, vec![hs[0]]);
    assert!(!aoi.visible(hs[1]).unwrap().contains(&hs[0]));
}

#[test]
fn far_entities_never_meet() {
    let mut aoi = AoiManager::new(AoiConfig::default());
    let hs = handles(2);
    aoi.add_entity(hs[0], TilePos::new(0, 0));
    aoi.add_entity(hs[1], TilePos::new(900, 900));
    assert!(aoi.drain_visibility_changes().is_empty());
    assert!(aoi.entities_near(TilePos::new(0, 0)).contains(&hs[0]));
    assert!(!aoi.entities_near(TilePos::new(0, 0)).contains(&hs[1]));
}

// --- Scene delivery ---

#[test]
fn scene_sends_appear_to_roles_only() {
    let mut scene: Scene<EntityRecord> =
        Scene::new(SceneConfig::default(), WalkableGrid::open(300, 300).unwrap());
    let mut alloc = HandleAllocator::new();
    let role = alloc.allocate(EntityKind::Role);
    let monster = alloc.allocate(EntityKind::Monster);
    scene
        .add_entity(EntityRecord::new(role, "hero", TilePos::new(10, 10), 10))
        .unwrap();
    scene
        .add_entity(EntityRecord::new(monster, "slime", TilePos::new(12, 10), 4))
        .unwrap();

    let flush = scene.flush_visibility();
    assert_eq!(flush.appear, 1);
    let out = scene.drain_outbox();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].recipient, Recipient::Entity(role));
    match &out[0].event {
        ServerEvent::EntityAppear(snap) => {
            assert_eq!(snap.handle, monster);
            assert_eq!(snap.name, "slime");
        }
        other => panic!("unexpected event {other:?}"),
    }

    scene.remove_entity(monster).unwrap();
    let flush = scene.flush_visibility();
    assert_eq!(flush.disappear, 1);
    let out = scene.drain_outbox();
    assert!(matches!(out[0].event, ServerEvent::EntityDisappear { handle } if handle == monster));
}
