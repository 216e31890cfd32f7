use std::path::Path;

use engine_core::{AiMover, EntityRecord, PositionSyncLink, Scene, SceneError};
use handle::{EntityHandle, EntityKind, HandleAllocator};
use rand::rngs::StdRng;
use rand::SeedableRng;
use space::{MapError, WalkableGrid};

use crate::config::ServerConfig;

/// Terrain for the configured scene: the map file when set, otherwise a
/// generated grid with random obstacles.
pub fn build_grid(config: &ServerConfig) -> Result<WalkableGrid, MapError> {
    match &config.scene.map_file {
        Some(path) => {
            let grid = WalkableGrid::load_json(Path::new(path))?;
            tracing::info!(path = %path, width = grid.width(), height = grid.height(), "map loaded");
            Ok(grid)
        }
        None => {
            let mut rng = StdRng::seed_from_u64(config.scene.seed);
            WalkableGrid::generate(
                config.scene.width,
                config.scene.height,
                config.scene.obstacle_ratio,
                &mut rng,
            )
        }
    }
}

pub fn build_scene(config: &ServerConfig, sync: PositionSyncLink) -> Result<Scene<EntityRecord>, MapError> {
    let grid = build_grid(config)?;
    Ok(Scene::new(config.to_scene_config(), grid).with_position_sync(sync))
}

/// Place the configured monsters inside their born area and return a mover
/// for each, homed at its spawn tile.
pub fn spawn_monsters(
    scene: &mut Scene<EntityRecord>,
    alloc: &mut HandleAllocator,
    config: &ServerConfig,
) -> Vec<AiMover> {
    let mover_config = config.to_mover_config();
    let mut movers = Vec::with_capacity(config.monsters.count as usize);

    for i in 0..config.monsters.count {
        let handle = alloc.allocate(EntityKind::Monster);
        let pos = scene.sample_spawn(config.monsters.spawn_area);
        let record = EntityRecord::new(handle, format!("monster-{}", i + 1), pos, config.monsters.move_speed);
        if let Err(e) = scene.add_entity(record) {
            tracing::warn!(entity = %handle, error = %e, "monster spawn failed");
            continue;
        }
        movers.push(AiMover::new(handle, pos, mover_config));
    }

    tracing::info!(scene = scene.id(), count = movers.len(), "monsters spawned");
    movers
}

/// Place a player-controlled entity at a random walkable tile of the scene
/// spawn area.
pub fn spawn_role(
    scene: &mut Scene<EntityRecord>,
    alloc: &mut HandleAllocator,
    config: &ServerConfig,
    name: &str,
    move_speed: u32,
) -> Result<EntityHandle, SceneError> {
    let handle = alloc.allocate(EntityKind::Role);
    let pos = scene.sample_spawn(config.scene.spawn_area);
    scene.add_entity(EntityRecord::new(handle, name, pos, move_speed))?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use space::{SpawnArea, Walkable};
    use tempfile::NamedTempFile;

    use super::*;

    fn small_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.scene.width = 64;
        config.scene.height = 64;
        config.scene.seed = 3;
        config.monsters.count = 5;
        config
    }

    #[test]
    fn generated_grid_uses_configured_size() {
        let grid = build_grid(&small_config()).unwrap();
        assert_eq!(grid.width(), 64);
        assert_eq!(grid.height(), 64);
        assert!(grid.walkable_count() < 64 * 64);
    }

    #[test]
    fn map_file_overrides_generation() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, r#"{{"width": 3, "height": 2, "rows": ["..#", "..."]}}"#).unwrap();
        let mut config = small_config();
        config.scene.map_file = Some(f.path().to_string_lossy().into_owned());

        let grid = build_grid(&config).unwrap();
        assert_eq!(grid.width(), 3);
        assert!(!grid.is_walkable(2, 0));
    }

    #[test]
    fn missing_map_file_is_error() {
        let mut config = small_config();
        config.scene.map_file = Some("/tmp/no_such_dungeon_map_98765.json".to_string());
        assert!(matches!(build_grid(&config), Err(MapError::Io(_))));
    }

    #[test]
    fn monsters_spawn_inside_born_area() {
        let mut config = small_config();
        config.monsters.spawn_area = Some(SpawnArea {
            x1: 10,
            y1: 10,
            x2: 20,
            y2: 20,
        });
        let mut scene = build_scene(&config, PositionSyncLink::disconnected()).unwrap();
        let mut alloc = HandleAllocator::new();

        let movers = spawn_monsters(&mut scene, &mut alloc, &config);
        assert_eq!(scene.entity_count(), movers.len());
        for mover in &movers {
            let pos = scene.entity(mover.handle()).map(|e| e.pos).unwrap();
            assert!(scene.grid().is_walkable_pos(pos));
            assert_eq!(mover.home(), pos);
            let in_area = (10..20).contains(&pos.x) && (10..20).contains(&pos.y);
            assert!(in_area || pos == scene.grid().center());
        }
    }

    #[test]
    fn roles_get_role_handles() {
        let config = small_config();
        let mut scene = build_scene(&config, PositionSyncLink::disconnected()).unwrap();
        let mut alloc = HandleAllocator::new();
        let h = spawn_role(&mut scene, &mut alloc, &config, "hero", 8).unwrap();
        assert!(h.is_role());
        assert_eq!(scene.entity(h).map(|e| e.name.as_str()), Some("hero"));
    }
}
