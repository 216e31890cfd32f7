use handle::{EntityHandle, EntityKind};
use serde::{Deserialize, Serialize};
use space::TilePos;

use crate::events::EntitySnapshot;

/// What a scene needs from the entities it hosts.
pub trait SceneEntity {
    fn handle(&self) -> EntityHandle;

    fn position(&self) -> TilePos;

    /// Raw setter. Outside of initialisation, positions change only through
    /// `Scene::entity_move`.
    fn set_position(&mut self, pos: TilePos);

    /// Movement speed attribute in tiles/second. 0 falls back to the
    /// configured default cap.
    fn move_speed(&self) -> u32;

    fn snapshot(&self) -> EntitySnapshot;

    fn on_enter_scene(&mut self, _scene_id: u32) {}

    fn on_leave_scene(&mut self, _scene_id: u32) {}
}

/// Plain entity record used by the dungeon server and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub handle: EntityHandle,
    pub name: String,
    pub pos: TilePos,
    pub move_speed: u32,
    pub scene_id: Option<u32>,
}

impl EntityRecord {
    pub fn new(handle: EntityHandle, name: impl Into<String>, pos: TilePos, move_speed: u32) -> Self {
        Self {
            handle,
            name: name.into(),
            pos,
            move_speed,
            scene_id: None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.handle.kind()
    }
}

impl SceneEntity for EntityRecord {
    fn handle(&self) -> EntityHandle {
        self.handle
    }

    fn position(&self) -> TilePos {
        self.pos
    }

    fn set_position(&mut self, pos: TilePos) {
        self.pos = pos;
    }

    fn move_speed(&self) -> u32 {
        self.move_speed
    }

    fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            handle: self.handle,
            kind: self.kind(),
            name: self.name.clone(),
            x: self.pos.x,
            y: self.pos.y,
            move_speed: self.move_speed,
        }
    }

    fn on_enter_scene(&mut self, scene_id: u32) {
        self.scene_id = Some(scene_id);
    }

    fn on_leave_scene(&mut self, _scene_id: u32) {
        self.scene_id = None;
    }
}
