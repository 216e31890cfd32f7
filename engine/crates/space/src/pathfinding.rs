use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{TilePos, Walkable};

/// Orthogonal neighbours first, then diagonals. Ties in the straight planner
/// resolve in this order.
const DIRS: [(i64, i64); 8] = [
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PathAlgorithm {
    /// Greedy straight line with local obstacle avoidance.
    #[default]
    #[serde(rename = "straight")]
    Straight,
    #[serde(rename = "astar")]
    AStar,
}

impl std::fmt::Display for PathAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Straight => write!(f, "straight"),
            Self::AStar => write!(f, "astar"),
        }
    }
}

/// A* distance estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heuristic {
    /// `dx + dy`. Overestimates on diagonals, so paths may be suboptimal.
    /// Kept for reproducing legacy path shapes.
    Manhattan,
    /// `max + (√2 - 1) * min`. Admissible for 8-connected octile costs.
    #[default]
    Octile,
}

impl Heuristic {
    fn estimate(self, a: TilePos, b: TilePos) -> f64 {
        let dx = (a.x as f64 - b.x as f64).abs();
        let dy = (a.y as f64 - b.y as f64).abs();
        match self {
            Self::Manhattan => dx + dy,
            Self::Octile => dx.max(dy) + (std::f64::consts::SQRT_2 - 1.0) * dx.min(dy),
        }
    }
}

/// Search budgets. Both planners are bounded so a call never stalls a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathLimits {
    pub astar_max_expansions: usize,
    /// Upper bound on the straight planner's `2 * distance` step budget.
    pub straight_max_steps: usize,
    pub heuristic: Heuristic,
}

impl Default for PathLimits {
    fn default() -> Self {
        Self {
            astar_max_expansions: 2000,
            straight_max_steps: 500,
            heuristic: Heuristic::default(),
        }
    }
}

/// Planning outcome. `found == false` is a normal result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    /// Waypoints excluding the start, ending at the goal when found.
    pub path: Vec<TilePos>,
    pub found: bool,
    pub algorithm: PathAlgorithm,
    /// Straight steps taken or A* nodes expanded.
    pub expanded: usize,
}

impl PathResult {
    fn not_found(algorithm: PathAlgorithm, expanded: usize) -> Self {
        Self {
            path: Vec::new(),
            found: false,
            algorithm,
            expanded,
        }
    }

    fn arrived(algorithm: PathAlgorithm, goal: TilePos) -> Self {
        Self {
            path: vec![goal],
            found: true,
            algorithm,
            expanded: 0,
        }
    }
}

/// Plan a route from `from` to `to`. Start and goal must both be walkable.
pub fn find_path<W: Walkable + ?Sized>(
    grid: &W,
    from: TilePos,
    to: TilePos,
    algorithm: PathAlgorithm,
    limits: &PathLimits,
) -> PathResult {
    if !grid.is_walkable_pos(from) || !grid.is_walkable_pos(to) {
        return PathResult::not_found(algorithm, 0);
    }
    if from == to {
        return PathResult::arrived(algorithm, to);
    }

    let result = match algorithm {
        PathAlgorithm::Straight => straight(grid, from, to, limits),
        PathAlgorithm::AStar => astar(grid, from, to, limits),
    };
    tracing::trace!(
        algorithm = %algorithm,
        from = %from,
        to = %to,
        found = result.found,
        len = result.path.len(),
        expanded = result.expanded,
        "path planned"
    );
    result
}

fn straight<W: Walkable + ?Sized>(
    grid: &W,
    from: TilePos,
    to: TilePos,
    limits: &PathLimits,
) -> PathResult {
    let max_steps = ((from.distance(to) * 2.0) as usize).min(limits.straight_max_steps);

    let mut visited = HashSet::from([from]);
    let mut path = Vec::new();
    let mut current = from;
    let mut steps = 0;

    while steps < max_steps && current != to {
        steps += 1;

        let ideal = ideal_step(current, to).filter(|p| grid.is_walkable_pos(*p) && !visited.contains(p));
        let Some(next) = ideal.or_else(|| best_neighbour(grid, current, to, &visited)) else {
            break;
        };
        visited.insert(next);
        path.push(next);
        current = next;
    }

    if current != to {
        return PathResult::not_found(PathAlgorithm::Straight, steps);
    }
    PathResult {
        path,
        found: true,
        algorithm: PathAlgorithm::Straight,
        expanded: steps,
    }
}

/// One tile along the dominant axis. The minor axis truncates toward zero,
/// so it only moves on an exact diagonal.
fn ideal_step(current: TilePos, goal: TilePos) -> Option<TilePos> {
    let dx = goal.x as i64 - current.x as i64;
    let dy = goal.y as i64 - current.y as i64;
    let (sx, sy) = if dx.abs() > dy.abs() {
        (dx.signum(), dy / dx.abs())
    } else {
        (dx / dy.abs(), dy.signum())
    };
    current.offset(sx, sy)
}

/// Lowest `1 - cos` between step direction and direction to goal.
fn best_neighbour<W: Walkable + ?Sized>(
    grid: &W,
    current: TilePos,
    goal: TilePos,
    visited: &HashSet<TilePos>,
) -> Option<TilePos> {
    let rx = goal.x as f64 - current.x as f64;
    let ry = goal.y as f64 - current.y as f64;
    let rlen = rx.hypot(ry);

    let mut best: Option<(f64, TilePos)> = None;
    for (dx, dy) in DIRS {
        let Some(pos) = current.offset(dx, dy) else {
            continue;
        };
        if !grid.is_walkable_pos(pos) || visited.contains(&pos) {
            continue;
        }
        let dlen = (dx as f64).hypot(dy as f64);
        let score = 1.0 - (dx as f64 * rx + dy as f64 * ry) / (dlen * rlen);
        if best.map_or(true, |(s, _)| score < s) {
            best = Some((score, pos));
        }
    }
    best.map(|(_, pos)| pos)
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    f: f64,
    h: f64,
    seq: u64,
    pos: TilePos,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    // Reversed so BinaryHeap pops the lowest f, then lowest h, then oldest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

fn astar<W: Walkable + ?Sized>(
    grid: &W,
    from: TilePos,
    to: TilePos,
    limits: &PathLimits,
) -> PathResult {
    let heuristic = limits.heuristic;
    let mut open = BinaryHeap::new();
    let mut g_score: HashMap<TilePos, f64> = HashMap::from([(from, 0.0)]);
    let mut came_from: HashMap<TilePos, TilePos> = HashMap::new();
    let mut closed: HashSet<TilePos> = HashSet::new();
    let mut seq = 0u64;
    let mut expanded = 0usize;

    let h = heuristic.estimate(from, to);
    open.push(OpenNode { f: h, h, seq, pos: from });

    while let Some(node) = open.pop() {
        // Stale entry left behind by a cost decrease.
        if !closed.insert(node.pos) {
            continue;
        }
        if expanded >= limits.astar_max_expansions {
            return PathResult::not_found(PathAlgorithm::AStar, expanded);
        }
        expanded += 1;

        if node.pos == to {
            return PathResult {
                path: reconstruct(&came_from, from, to),
                found: true,
                algorithm: PathAlgorithm::AStar,
                expanded,
            };
        }

        let g = g_score.get(&node.pos).copied().unwrap_or(f64::INFINITY);
        for (dx, dy) in DIRS {
            let Some(next) = node.pos.offset(dx, dy) else {
                continue;
            };
            if closed.contains(&next) || !grid.is_walkable_pos(next) {
                continue;
            }
            let cost = if dx != 0 && dy != 0 {
                std::f64::consts::SQRT_2
            } else {
                1.0
            };
            let tentative = g + cost;
            if tentative < g_score.get(&next).copied().unwrap_or(f64::INFINITY) {
                g_score.insert(next, tentative);
                came_from.insert(next, node.pos);
                let h = heuristic.estimate(next, to);
                seq += 1;
                open.push(OpenNode {
                    f: tentative + h,
                    h,
                    seq,
                    pos: next,
                });
            }
        }
    }

    PathResult::not_found(PathAlgorithm::AStar, expanded)
}

fn reconstruct(came_from: &HashMap<TilePos, TilePos>, from: TilePos, to: TilePos) -> Vec<TilePos> {
    let mut path = vec![to];
    let mut cursor = to;
    while let Some(&prev) = came_from.get(&cursor) {
        if prev == from {
            break;
        }
        path.push(prev);
        cursor = prev;
    }
    path.reverse();
    path
}
