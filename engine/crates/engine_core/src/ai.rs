use std::collections::VecDeque;
use std::time::{Duration, Instant};

use handle::EntityHandle;
use serde::{Deserialize, Serialize};
use space::{find_path, PathAlgorithm, PathLimits, SpawnArea, TilePos, Walkable};

use crate::entity::SceneEntity;
use crate::scene::Scene;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiMode {
    Patrol,
    Chase(EntityHandle),
    Return,
}

/// Behaviour knobs shared by server-driven movers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoverConfig {
    /// Patrol targets are sampled within this many tiles of home.
    pub patrol_radius: u32,
    /// Roles closer than this are chased.
    pub detect_range: u32,
    /// Beyond this distance from home the mover gives up and returns.
    pub reset_distance: u32,
    /// Replan when the target drifts further than this from the planned goal.
    pub replan_threshold: u32,
    pub patrol_algorithm: PathAlgorithm,
    pub chase_algorithm: PathAlgorithm,
    pub return_algorithm: PathAlgorithm,
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            patrol_radius: 5,
            detect_range: 8,
            reset_distance: 20,
            replan_threshold: 2,
            patrol_algorithm: PathAlgorithm::Straight,
            chase_algorithm: PathAlgorithm::AStar,
            return_algorithm: PathAlgorithm::AStar,
        }
    }
}

impl MoverConfig {
    pub fn algorithm_for(&self, mode: AiMode) -> PathAlgorithm {
        match mode {
            AiMode::Patrol => self.patrol_algorithm,
            AiMode::Chase(_) => self.chase_algorithm,
            AiMode::Return => self.return_algorithm,
        }
    }
}

/// Consumes a planned path one waypoint per call.
#[derive(Debug, Clone, Default)]
pub struct PathFollower {
    goal: Option<TilePos>,
    /// Goal of the last plan that found nothing.
    failed_goal: Option<TilePos>,
    waypoints: VecDeque<TilePos>,
    replan_threshold: u32,
    plans: u64,
}

impl PathFollower {
    pub fn new(replan_threshold: u32) -> Self {
        Self {
            replan_threshold,
            ..Self::default()
        }
    }

    pub fn clear(&mut self) {
        self.goal = None;
        self.failed_goal = None;
        self.waypoints.clear();
    }

    pub fn remaining(&self) -> usize {
        self.waypoints.len()
    }

    /// Planner invocations so far.
    pub fn plan_count(&self) -> u64 {
        self.plans
    }

    /// Next tile to step onto, or `None` when already at `target` or boxed in.
    ///
    /// Replans when the path is exhausted, when `target` has moved past the
    /// threshold, or when the next waypoint is no longer adjacent. If no path
    /// exists it falls back to one direct step toward the target, and keeps
    /// doing so without replanning until the target moves past the threshold.
    pub fn next_step<W: Walkable + ?Sized>(
        &mut self,
        grid: &W,
        limits: &PathLimits,
        algorithm: PathAlgorithm,
        current: TilePos,
        target: TilePos,
    ) -> Option<TilePos> {
        if current == target {
            self.clear();
            return None;
        }

        if let Some(failed) = self.failed_goal {
            if failed.distance(target) <= self.replan_threshold as f64 {
                return direct_step(grid, current, target);
            }
            self.failed_goal = None;
        }

        let drifted = self
            .goal
            .map_or(true, |goal| goal.distance(target) > self.replan_threshold as f64);
        let detached = self.waypoints.front().map_or(true, |wp| !adjacent(current, *wp));
        if drifted || detached {
            self.plans += 1;
            let result = find_path(grid, current, target, algorithm, limits);
            self.goal = Some(target);
            self.waypoints = result.path.into();
            if !result.found {
                tracing::trace!(from = %current, to = %target, "no path, stepping directly");
                self.failed_goal = Some(target);
                return direct_step(grid, current, target);
            }
        }

        self.waypoints.pop_front()
    }
}

fn adjacent(a: TilePos, b: TilePos) -> bool {
    let dx = (a.x as i64 - b.x as i64).abs();
    let dy = (a.y as i64 - b.y as i64).abs();
    dx.max(dy) == 1
}

fn direct_step<W: Walkable + ?Sized>(grid: &W, current: TilePos, target: TilePos) -> Option<TilePos> {
    let dx = (target.x as i64 - current.x as i64).signum();
    let dy = (target.y as i64 - current.y as i64).signum();
    [(dx, dy), (dx, 0), (0, dy)]
        .into_iter()
        .filter(|&(x, y)| x != 0 || y != 0)
        .filter_map(|(x, y)| current.offset(x, y))
        .find(|p| grid.is_walkable_pos(*p))
}

/// Patrol / chase / return driver for one server-controlled entity.
#[derive(Debug, Clone)]
pub struct AiMover {
    handle: EntityHandle,
    home: TilePos,
    mode: AiMode,
    config: MoverConfig,
    follower: PathFollower,
    patrol_target: Option<TilePos>,
    last_step: Option<Instant>,
}

impl AiMover {
    pub fn new(handle: EntityHandle, home: TilePos, config: MoverConfig) -> Self {
        Self {
            handle,
            home,
            mode: AiMode::Patrol,
            config,
            follower: PathFollower::new(config.replan_threshold),
            patrol_target: None,
            last_step: None,
        }
    }

    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    pub fn mode(&self) -> AiMode {
        self.mode
    }

    pub fn home(&self) -> TilePos {
        self.home
    }

    /// Advance one decision cycle. Returns the tile stepped onto, if any.
    /// Steps are spaced by the entity's speed attribute.
    pub fn tick<E: SceneEntity>(&mut self, scene: &mut Scene<E>, now: Instant) -> Option<TilePos> {
        let (pos, attr) = {
            let entity = scene.entity(self.handle)?;
            (entity.position(), entity.move_speed())
        };
        let speed = if attr == 0 {
            scene.validator().config().default_speed_cap
        } else {
            attr
        };
        let interval = Duration::from_millis(1000 / speed.max(1) as u64);
        if self
            .last_step
            .is_some_and(|last| now.saturating_duration_since(last) < interval)
        {
            return None;
        }

        self.update_mode(scene, pos);
        let target = self.target(scene, pos)?;
        let algorithm = self.config.algorithm_for(self.mode);
        let Some(step) = self
            .follower
            .next_step(scene.grid(), scene.path_limits(), algorithm, pos, target)
        else {
            // Walkable but cut off from here: pick another patrol point.
            if self.mode == AiMode::Patrol {
                self.patrol_target = None;
                self.follower.clear();
            }
            return None;
        };

        match scene.ai_step(self.handle, step, speed) {
            Ok(()) => {
                self.last_step = Some(now);
                Some(step)
            }
            Err(e) => {
                tracing::debug!(entity = %self.handle, error = %e, "ai step refused");
                self.follower.clear();
                None
            }
        }
    }

    fn set_mode(&mut self, mode: AiMode) {
        if self.mode != mode {
            tracing::debug!(entity = %self.handle, from = ?self.mode, to = ?mode, "ai mode change");
            self.mode = mode;
            self.follower.clear();
            self.patrol_target = None;
        }
    }

    fn update_mode<E: SceneEntity>(&mut self, scene: &Scene<E>, pos: TilePos) {
        if pos.distance(self.home) > self.config.reset_distance as f64 {
            self.set_mode(AiMode::Return);
            return;
        }
        match self.mode {
            AiMode::Return => {
                if pos == self.home {
                    self.set_mode(AiMode::Patrol);
                }
            }
            AiMode::Patrol | AiMode::Chase(_) => match self.nearest_role(scene, pos) {
                Some(role) => self.set_mode(AiMode::Chase(role)),
                None if matches!(self.mode, AiMode::Chase(_)) => self.set_mode(AiMode::Return),
                None => {}
            },
        }
    }

    fn nearest_role<E: SceneEntity>(&self, scene: &Scene<E>, pos: TilePos) -> Option<EntityHandle> {
        let range = self.config.detect_range as f64;
        scene
            .aoi()
            .visible(self.handle)?
            .iter()
            .filter(|h| h.is_role())
            .filter_map(|&h| scene.entity(h).map(|e| (h, pos.distance(e.position()))))
            .filter(|&(_, d)| d <= range)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(h, _)| h)
    }

    fn target<E: SceneEntity>(&mut self, scene: &mut Scene<E>, pos: TilePos) -> Option<TilePos> {
        match self.mode {
            AiMode::Chase(role) => scene.entity(role).map(|e| e.position()),
            AiMode::Return => Some(self.home),
            AiMode::Patrol => {
                if self.patrol_target.map_or(true, |t| t == pos) {
                    let r = self.config.patrol_radius;
                    let area = SpawnArea {
                        x1: self.home.x.saturating_sub(r),
                        y1: self.home.y.saturating_sub(r),
                        x2: self.home.x.saturating_add(r + 1),
                        y2: self.home.y.saturating_add(r + 1),
                    };
                    self.patrol_target = Some(scene.sample_spawn(Some(area)));
                }
                self.patrol_target
            }
        }
    }
}
