use handle::{EntityHandle, EntityKind};
use serde::{Deserialize, Serialize};

/// Appearance data sent when an entity comes into view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub handle: EntityHandle,
    pub kind: EntityKind,
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub move_speed: u32,
}

/// Client-facing notifications produced by a scene. Coordinates are tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    EntityMove {
        handle: EntityHandle,
        x: u32,
        y: u32,
        speed: u32,
        seq: u32,
    },
    EntityStopMove {
        handle: EntityHandle,
        x: u32,
        y: u32,
        seq: u32,
    },
    EntityAppear(EntitySnapshot),
    EntityDisappear {
        handle: EntityHandle,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every entity currently in the scene.
    Scene,
    Entity(EntityHandle),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    pub scene_id: u32,
    pub recipient: Recipient,
    pub event: ServerEvent,
}

/// Per-scene outgoing queue, drained once per tick in push order.
#[derive(Debug, Default)]
pub struct Outbox {
    scene_id: u32,
    queue: Vec<Outbound>,
}

impl Outbox {
    pub fn new(scene_id: u32) -> Self {
        Self {
            scene_id,
            queue: Vec::new(),
        }
    }

    pub fn broadcast(&mut self, event: ServerEvent) {
        self.push(Recipient::Scene, event);
    }

    pub fn send_to(&mut self, handle: EntityHandle, event: ServerEvent) {
        self.push(Recipient::Entity(handle), event);
    }

    pub fn push(&mut self, recipient: Recipient, event: ServerEvent) {
        self.queue.push(Outbound {
            scene_id: self.scene_id,
            recipient,
            event,
        });
    }

    pub fn drain(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.queue)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
