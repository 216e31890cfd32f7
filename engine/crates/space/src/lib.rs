pub mod aoi;
pub mod model;
pub mod pathfinding;
pub mod walkable;

pub use aoi::{AoiConfig, AoiManager, VisibilityChanges};
pub use model::{cell_of, nine_cells, CellCoord, MapError, TilePos, TileTransform, Walkable};
pub use pathfinding::{find_path, Heuristic, PathAlgorithm, PathLimits, PathResult};
pub use walkable::{MapData, SpawnArea, WalkableGrid};
