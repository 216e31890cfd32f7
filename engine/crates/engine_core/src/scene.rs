use std::collections::BTreeMap;
use std::time::Instant;

use handle::EntityHandle;
use movement::{EndMove, MoveAccepted, MoveConfig, MoveHost, MoveReject, MovementValidator, StartMove, UpdateMove};
use rand::rngs::StdRng;
use rand::SeedableRng;
use space::{
    find_path, AoiConfig, AoiManager, PathAlgorithm, PathLimits, PathResult, SpawnArea, TilePos, Walkable,
    WalkableGrid,
};

use crate::entity::SceneEntity;
use crate::events::{Outbound, Outbox, ServerEvent};
use crate::sync::{PositionSync, PositionSyncLink};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("entity not found: {0}")]
    EntityNotFound(EntityHandle),

    #[error("entity already in scene: {0}")]
    AlreadyInScene(EntityHandle),

    #[error("tile ({x}, {y}) is not walkable")]
    NotWalkable { x: u32, y: u32 },
}

#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub id: u32,
    pub aoi: AoiConfig,
    pub movement: MoveConfig,
    pub path_limits: PathLimits,
    /// Rejection-sampling budget for spawn positions.
    pub spawn_attempts: u32,
    pub seed: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            id: 1,
            aoi: AoiConfig::default(),
            movement: MoveConfig::default(),
            path_limits: PathLimits::default(),
            spawn_attempts: 100,
            seed: 0,
        }
    }
}

/// Per-flush delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityFlush {
    pub appear: usize,
    pub disappear: usize,
}

/// Registry, terrain and interest index of one scene. Split from [`Scene`]
/// so the movement validator can borrow it as its [`MoveHost`].
#[derive(Debug)]
pub struct SceneWorld<E> {
    id: u32,
    grid: WalkableGrid,
    aoi: AoiManager,
    entities: BTreeMap<EntityHandle, E>,
}

impl<E: SceneEntity> SceneWorld<E> {
    /// The only authoritative position mutation.
    pub fn entity_move(&mut self, handle: EntityHandle, pos: TilePos) -> Result<TilePos, SceneError> {
        if !self.grid.is_walkable_pos(pos) {
            return Err(SceneError::NotWalkable { x: pos.x, y: pos.y });
        }
        let entity = self
            .entities
            .get_mut(&handle)
            .ok_or(SceneError::EntityNotFound(handle))?;
        let old = entity.position();
        entity.set_position(pos);
        self.aoi.update_entity(handle, pos);
        Ok(old)
    }
}

impl<E: SceneEntity> MoveHost for SceneWorld<E> {
    fn position(&self, handle: EntityHandle) -> Option<TilePos> {
        self.entities.get(&handle).map(|e| e.position())
    }

    fn speed_attribute(&self, handle: EntityHandle) -> Option<u32> {
        self.entities.get(&handle).map(|e| e.move_speed())
    }

    fn is_walkable(&self, pos: TilePos) -> bool {
        self.grid.is_walkable_pos(pos)
    }

    fn apply_move(&mut self, handle: EntityHandle, pos: TilePos) -> Result<(), MoveReject> {
        match self.entity_move(handle, pos) {
            Ok(_) => Ok(()),
            Err(SceneError::NotWalkable { x, y }) => Err(MoveReject::TargetNotWalkable { x, y }),
            Err(_) => Err(MoveReject::EntityNotFound(handle)),
        }
    }
}

/// Composition root for one scene. Every mutation runs on the owning
/// actor's tick thread.
pub struct Scene<E> {
    world: SceneWorld<E>,
    validator: MovementValidator,
    outbox: Outbox,
    rng: StdRng,
    path_limits: PathLimits,
    spawn_attempts: u32,
    position_sync: PositionSyncLink,
    rejected_moves: u64,
}

impl<E: SceneEntity> Scene<E> {
    pub fn new(config: SceneConfig, grid: WalkableGrid) -> Self {
        Self {
            world: SceneWorld {
                id: config.id,
                grid,
                aoi: AoiManager::new(config.aoi),
                entities: BTreeMap::new(),
            },
            validator: MovementValidator::new(config.movement),
            outbox: Outbox::new(config.id),
            rng: StdRng::seed_from_u64(config.seed),
            path_limits: config.path_limits,
            spawn_attempts: config.spawn_attempts,
            position_sync: PositionSyncLink::disconnected(),
            rejected_moves: 0,
        }
    }

    pub fn with_position_sync(mut self, link: PositionSyncLink) -> Self {
        self.position_sync = link;
        self
    }

    pub fn id(&self) -> u32 {
        self.world.id
    }

    pub fn grid(&self) -> &WalkableGrid {
        &self.world.grid
    }

    pub fn aoi(&self) -> &AoiManager {
        &self.world.aoi
    }

    pub fn validator(&self) -> &MovementValidator {
        &self.validator
    }

    pub fn path_limits(&self) -> &PathLimits {
        &self.path_limits
    }

    pub fn entity(&self, handle: EntityHandle) -> Option<&E> {
        self.world.entities.get(&handle)
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.world.entities.contains_key(&handle)
    }

    pub fn entity_count(&self) -> usize {
        self.world.entities.len()
    }

    pub fn handles(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.world.entities.keys().copied()
    }

    /// Register an entity at its current position.
    pub fn add_entity(&mut self, mut entity: E) -> Result<(), SceneError> {
        let handle = entity.handle();
        if self.world.entities.contains_key(&handle) {
            return Err(SceneError::AlreadyInScene(handle));
        }
        let pos = entity.position();
        entity.on_enter_scene(self.world.id);
        self.validator.bind(handle, pos);
        self.world.entities.insert(handle, entity);
        self.world.aoi.add_entity(handle, pos);

        tracing::info!(scene = self.world.id, entity = %handle, x = pos.x, y = pos.y, "entity entered scene");
        Ok(())
    }

    /// Unregister an entity. Former peers are refreshed so they queue the
    /// matching disappear.
    pub fn remove_entity(&mut self, handle: EntityHandle) -> Result<E, SceneError> {
        let mut entity = self
            .world
            .entities
            .remove(&handle)
            .ok_or(SceneError::EntityNotFound(handle))?;
        self.validator.unbind(handle);
        for peer in self.world.aoi.remove_entity(handle) {
            self.world.aoi.refresh(peer);
        }
        entity.on_leave_scene(self.world.id);

        tracing::info!(scene = self.world.id, entity = %handle, "entity left scene");
        Ok(entity)
    }

    pub fn entity_move(&mut self, handle: EntityHandle, pos: TilePos) -> Result<(), SceneError> {
        self.world.entity_move(handle, pos).map(|_| ())
    }

    pub fn handle_start_move(
        &mut self,
        handle: EntityHandle,
        req: StartMove,
        now: Instant,
    ) -> Result<MoveAccepted, MoveReject> {
        let result = self.validator.handle_start_move(&mut self.world, handle, req, now);
        self.finish_client_move(handle, req.seq, result, false)
    }

    pub fn handle_update_move(
        &mut self,
        handle: EntityHandle,
        req: UpdateMove,
        now: Instant,
    ) -> Result<MoveAccepted, MoveReject> {
        let result = self.validator.handle_update_move(&mut self.world, handle, req, now);
        self.finish_client_move(handle, req.seq, result, false)
    }

    pub fn handle_end_move(
        &mut self,
        handle: EntityHandle,
        req: EndMove,
        now: Instant,
    ) -> Result<MoveAccepted, MoveReject> {
        let result = self.validator.handle_end_move(&mut self.world, handle, req, now);
        self.finish_client_move(handle, req.seq, result, true)
    }

    fn finish_client_move(
        &mut self,
        handle: EntityHandle,
        seq: u32,
        result: Result<MoveAccepted, MoveReject>,
        is_end: bool,
    ) -> Result<MoveAccepted, MoveReject> {
        match &result {
            Ok(accepted) if is_end => {
                self.outbox.broadcast(ServerEvent::EntityStopMove {
                    handle,
                    x: accepted.pos.x,
                    y: accepted.pos.y,
                    seq: accepted.seq,
                });
                if handle.is_role() {
                    self.position_sync.send(PositionSync {
                        handle,
                        scene_id: self.world.id,
                        pos: accepted.pos,
                    });
                }
            }
            Ok(accepted) => {
                self.outbox.broadcast(ServerEvent::EntityMove {
                    handle,
                    x: accepted.pos.x,
                    y: accepted.pos.y,
                    speed: accepted.speed,
                    seq: accepted.seq,
                });
            }
            Err(reject) => {
                self.rejected_moves += 1;
                tracing::warn!(
                    scene = self.world.id,
                    entity = %handle,
                    seq,
                    reason = reject.kind(),
                    error = %reject,
                    "move rejected, resyncing client"
                );
                if let Some(pos) = self.world.position(handle) {
                    self.outbox.send_to(
                        handle,
                        ServerEvent::EntityStopMove {
                            handle,
                            x: pos.x,
                            y: pos.y,
                            seq,
                        },
                    );
                }
            }
        }
        result
    }

    /// Server-driven step: moves through `entity_move` and broadcasts it.
    pub fn ai_step(&mut self, handle: EntityHandle, pos: TilePos, speed: u32) -> Result<(), SceneError> {
        self.world.entity_move(handle, pos)?;
        self.outbox.broadcast(ServerEvent::EntityMove {
            handle,
            x: pos.x,
            y: pos.y,
            speed,
            seq: 0,
        });
        Ok(())
    }

    pub fn find_path(&self, from: TilePos, to: TilePos, algorithm: PathAlgorithm) -> PathResult {
        find_path(&self.world.grid, from, to, algorithm, &self.path_limits)
    }

    pub fn random_walkable_pos(&mut self) -> TilePos {
        self.sample_spawn(None)
    }

    /// Walkable tile inside `area` (whole map when `None` or degenerate),
    /// or the map centre once the attempt budget is spent.
    pub fn sample_spawn(&mut self, area: Option<SpawnArea>) -> TilePos {
        self.world
            .grid
            .random_walkable(&mut self.rng, area, self.spawn_attempts)
    }

    /// Drain the interest index once and turn it into appear/disappear
    /// deliveries. Only roles receive them.
    pub fn flush_visibility(&mut self) -> VisibilityFlush {
        let mut flush = VisibilityFlush::default();
        for (receiver, changes) in self.world.aoi.drain_visibility_changes() {
            if !receiver.is_role() {
                continue;
            }
            for handle in changes.entered {
                if let Some(entity) = self.world.entities.get(&handle) {
                    self.outbox.send_to(receiver, ServerEvent::EntityAppear(entity.snapshot()));
                    flush.appear += 1;
                }
            }
            for handle in changes.left {
                self.outbox.send_to(receiver, ServerEvent::EntityDisappear { handle });
                flush.disappear += 1;
            }
        }
        flush
    }

    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        self.outbox.drain()
    }

    /// Rejected client reports since the last call.
    pub fn take_rejected_moves(&mut self) -> u64 {
        std::mem::take(&mut self.rejected_moves)
    }
}
