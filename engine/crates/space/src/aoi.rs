use std::collections::{BTreeMap, BTreeSet};

use handle::EntityHandle;
use serde::{Deserialize, Serialize};

use crate::model::{nine_cells, CellCoord, TilePos, DEFAULT_CELL_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AoiConfig {
    /// Bucket edge in tiles.
    pub cell_size: u32,
}

impl Default for AoiConfig {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
        }
    }
}

/// Net visibility change for one receiver since its last drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityChanges {
    pub entered: Vec<EntityHandle>,
    pub left: Vec<EntityHandle>,
}

impl VisibilityChanges {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty()
    }
}

#[derive(Debug, Clone)]
struct AoiState {
    pos: TilePos,
    visible: BTreeSet<EntityHandle>,
    pending_enter: BTreeSet<EntityHandle>,
    pending_leave: BTreeSet<EntityHandle>,
}

impl AoiState {
    fn new(pos: TilePos) -> Self {
        Self {
            pos,
            visible: BTreeSet::new(),
            pending_enter: BTreeSet::new(),
            pending_leave: BTreeSet::new(),
        }
    }

    /// An enter cancels an undrained leave of the same peer, and vice versa,
    /// so a drain always reports the net change.
    fn gain(&mut self, peer: EntityHandle) {
        if self.visible.insert(peer) && !self.pending_leave.remove(&peer) {
            self.pending_enter.insert(peer);
        }
    }

    fn lose(&mut self, peer: EntityHandle) {
        if self.visible.remove(&peer) && !self.pending_enter.remove(&peer) {
            self.pending_leave.insert(peer);
        }
    }

    fn take_changes(&mut self) -> VisibilityChanges {
        VisibilityChanges {
            entered: std::mem::take(&mut self.pending_enter).into_iter().collect(),
            left: std::mem::take(&mut self.pending_leave).into_iter().collect(),
        }
    }
}

/// Bucketed-grid interest manager.
///
/// Each entity is registered in the 9 buckets around its own cell, so the
/// union of those 9 buckets is exactly the set of entities whose cell lies
/// within two cells of it. That relation is symmetric and every visible-set
/// change is applied to both sides.
#[derive(Debug, Clone)]
pub struct AoiManager {
    cell_size: u32,
    buckets: BTreeMap<CellCoord, BTreeSet<EntityHandle>>,
    entities: BTreeMap<EntityHandle, AoiState>,
}

impl AoiManager {
    pub fn new(config: AoiConfig) -> Self {
        Self {
            cell_size: config.cell_size.max(1),
            buckets: BTreeMap::new(),
            entities: BTreeMap::new(),
        }
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.entities.contains_key(&handle)
    }

    pub fn position(&self, handle: EntityHandle) -> Option<TilePos> {
        self.entities.get(&handle).map(|s| s.pos)
    }

    /// Register `handle` at `pos` and compute its visibility.
    /// An already registered handle is moved instead.
    pub fn add_entity(&mut self, handle: EntityHandle, pos: TilePos) {
        if self.entities.contains_key(&handle) {
            self.update_entity(handle, pos);
            return;
        }
        for cell in nine_cells(pos, self.cell_size) {
            self.buckets.entry(cell).or_default().insert(handle);
        }
        self.entities.insert(handle, AoiState::new(pos));
        self.refresh(handle);
    }

    /// Unregister `handle` and drop its own visibility state.
    ///
    /// Returns the peers that could see it. Their visible sets still list
    /// `handle` until the caller runs [`refresh`](Self::refresh) on each of
    /// them, which queues the matching leave events.
    pub fn remove_entity(&mut self, handle: EntityHandle) -> Vec<EntityHandle> {
        let Some(state) = self.entities.remove(&handle) else {
            return Vec::new();
        };
        for cell in nine_cells(state.pos, self.cell_size) {
            self.remove_from_bucket(cell, handle);
        }
        state.visible.into_iter().collect()
    }

    /// Move `handle` from its recorded position to `new_pos`. Only the
    /// buckets in the symmetric difference of the two neighbourhoods change.
    /// Returns false when `handle` is not registered.
    pub fn update_entity(&mut self, handle: EntityHandle, new_pos: TilePos) -> bool {
        let Some(state) = self.entities.get_mut(&handle) else {
            return false;
        };
        let old_pos = std::mem::replace(&mut state.pos, new_pos);

        let old_cells: BTreeSet<CellCoord> = nine_cells(old_pos, self.cell_size).into_iter().collect();
        let new_cells: BTreeSet<CellCoord> = nine_cells(new_pos, self.cell_size).into_iter().collect();
        if old_cells == new_cells {
            return true;
        }

        for &cell in old_cells.difference(&new_cells) {
            self.remove_from_bucket(cell, handle);
        }
        for &cell in new_cells.difference(&old_cells) {
            self.buckets.entry(cell).or_default().insert(handle);
        }
        self.refresh(handle);
        true
    }

    /// Recompute `handle`'s visible set from its 9 buckets and apply the diff
    /// to both sides of every changed pair.
    pub fn refresh(&mut self, handle: EntityHandle) {
        let Some(state) = self.entities.get(&handle) else {
            return;
        };
        let should_see = self.collect_near(state.pos, handle);
        let entered: Vec<EntityHandle> = should_see.difference(&state.visible).copied().collect();
        let left: Vec<EntityHandle> = state.visible.difference(&should_see).copied().collect();

        for peer in entered {
            if let Some(s) = self.entities.get_mut(&handle) {
                s.gain(peer);
            }
            if let Some(p) = self.entities.get_mut(&peer) {
                p.gain(handle);
            }
        }
        for peer in left {
            if let Some(s) = self.entities.get_mut(&handle) {
                s.lose(peer);
            }
            if let Some(p) = self.entities.get_mut(&peer) {
                p.lose(handle);
            }
        }
    }

    pub fn visible(&self, handle: EntityHandle) -> Option<&BTreeSet<EntityHandle>> {
        self.entities.get(&handle).map(|s| &s.visible)
    }

    /// Entities an observer standing at `pos` would see.
    pub fn entities_near(&self, pos: TilePos) -> BTreeSet<EntityHandle> {
        let mut out = BTreeSet::new();
        for cell in nine_cells(pos, self.cell_size) {
            if let Some(bucket) = self.buckets.get(&cell) {
                out.extend(bucket.iter().copied());
            }
        }
        out
    }

    /// Take and clear `handle`'s pending enter/leave queues.
    pub fn consume_visibility_changes(&mut self, handle: EntityHandle) -> VisibilityChanges {
        self.entities
            .get_mut(&handle)
            .map(AoiState::take_changes)
            .unwrap_or_default()
    }

    /// Take every receiver's pending changes, in handle order. Receivers
    /// with nothing pending are skipped.
    pub fn drain_visibility_changes(&mut self) -> Vec<(EntityHandle, VisibilityChanges)> {
        self.entities
            .iter_mut()
            .filter_map(|(&handle, state)| {
                let changes = state.take_changes();
                (!changes.is_empty()).then_some((handle, changes))
            })
            .collect()
    }

    fn collect_near(&self, pos: TilePos, exclude: EntityHandle) -> BTreeSet<EntityHandle> {
        let mut near = self.entities_near(pos);
        near.remove(&exclude);
        near
    }

    fn remove_from_bucket(&mut self, cell: CellCoord, handle: EntityHandle) {
        if let Some(bucket) = self.buckets.get_mut(&cell) {
            bucket.remove(&handle);
            if bucket.is_empty() {
                self.buckets.remove(&cell);
            }
        }
    }
}

impl Default for AoiManager {
    fn default() -> Self {
        Self::new(AoiConfig::default())
    }
}
