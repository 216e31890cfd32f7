use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::{MapError, TilePos, Walkable};

/// Share of tiles blocked by [`WalkableGrid::generate`] when no ratio is configured.
pub const DEFAULT_OBSTACLE_RATIO: f64 = 0.05;

const WALKABLE_GLYPH: char = '.';
const BLOCKED_GLYPH: char = '#';

/// Map data as stored on disk: one string per row, `.` walkable, `#` blocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapData {
    pub width: u32,
    pub height: u32,
    pub rows: Vec<String>,
}

/// Rectangle used for spawn sampling. `x2`/`y2` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnArea {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl SpawnArea {
    pub fn is_valid(&self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Storage {
    Dense(Vec<bool>),
    /// Row-major, one bit per tile, set = walkable.
    Bitmap(Vec<u64>),
}

/// Tile passability for one scene. Lookups are O(1) for both storages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkableGrid {
    width: u32,
    height: u32,
    storage: Storage,
}

fn check_dimensions(width: u32, height: u32) -> Result<(), MapError> {
    if width == 0 || height == 0 {
        return Err(MapError::InvalidDimensions { width, height });
    }
    Ok(())
}

impl WalkableGrid {
    /// Fully walkable grid.
    pub fn open(width: u32, height: u32) -> Result<Self, MapError> {
        check_dimensions(width, height)?;
        Ok(Self {
            width,
            height,
            storage: Storage::Dense(vec![true; width as usize * height as usize]),
        })
    }

    /// Build from text rows (`.` walkable, `#` blocked). All rows must share a length.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self, MapError> {
        let height = rows.len();
        let width = rows.first().map(|r| r.as_ref().chars().count()).unwrap_or(0);
        check_dimensions(width as u32, height as u32)?;

        let mut cells = Vec::with_capacity(width * height);
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            let len = row.chars().count();
            if len != width {
                return Err(MapError::RowLength {
                    row: y,
                    got: len,
                    expected: width,
                });
            }
            for (x, glyph) in row.chars().enumerate() {
                match glyph {
                    WALKABLE_GLYPH => cells.push(true),
                    BLOCKED_GLYPH => cells.push(false),
                    other => return Err(MapError::BadGlyph { glyph: other, x, y }),
                }
            }
        }

        Ok(Self {
            width: width as u32,
            height: height as u32,
            storage: Storage::Dense(cells),
        })
    }

    /// Wrap an externally supplied bitmap (row-major, bit set = walkable).
    pub fn from_bitmap(width: u32, height: u32, words: Vec<u64>) -> Result<Self, MapError> {
        check_dimensions(width, height)?;
        let expected = (width as usize * height as usize).div_ceil(64);
        if words.len() != expected {
            return Err(MapError::BitmapSize {
                got: words.len(),
                expected,
            });
        }
        Ok(Self {
            width,
            height,
            storage: Storage::Bitmap(words),
        })
    }

    pub fn from_map_data(data: &MapData) -> Result<Self, MapError> {
        if data.rows.len() != data.height as usize {
            return Err(MapError::InvalidDimensions {
                width: data.width,
                height: data.height,
            });
        }
        let grid = Self::from_rows(&data.rows)?;
        if grid.width != data.width {
            return Err(MapError::RowLength {
                row: 0,
                got: grid.width as usize,
                expected: data.width as usize,
            });
        }
        Ok(grid)
    }

    /// Load [`MapData`] from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self, MapError> {
        let content = std::fs::read_to_string(path)?;
        let data: MapData = serde_json::from_str(&content)?;
        Self::from_map_data(&data)
    }

    /// Open grid with `obstacle_ratio * width * height` random tiles blocked.
    /// Picks may repeat, so the blocked count is an upper bound.
    pub fn generate<R: Rng>(
        width: u32,
        height: u32,
        obstacle_ratio: f64,
        rng: &mut R,
    ) -> Result<Self, MapError> {
        let mut grid = Self::open(width, height)?;
        let ratio = obstacle_ratio.clamp(0.0, 1.0);
        let obstacles = (width as f64 * height as f64 * ratio) as u64;
        for _ in 0..obstacles {
            let x = rng.gen_range(0..width);
            let y = rng.gen_range(0..height);
            grid.set_walkable(TilePos::new(x, y), false);
        }
        tracing::info!(width, height, obstacles, "walkable grid generated");
        Ok(grid)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn center(&self) -> TilePos {
        TilePos::new(self.width / 2, self.height / 2)
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if !self.in_bounds(x, y) {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Returns false when `pos` is outside the grid.
    pub fn set_walkable(&mut self, pos: TilePos, walkable: bool) -> bool {
        let Some(idx) = self.index(pos.x as i64, pos.y as i64) else {
            return false;
        };
        match &mut self.storage {
            Storage::Dense(cells) => cells[idx] = walkable,
            Storage::Bitmap(words) => {
                let mask = 1u64 << (idx % 64);
                if walkable {
                    words[idx / 64] |= mask;
                } else {
                    words[idx / 64] &= !mask;
                }
            }
        }
        true
    }

    pub fn walkable_count(&self) -> usize {
        match &self.storage {
            Storage::Dense(cells) => cells.iter().filter(|&&c| c).count(),
            Storage::Bitmap(_) => (0..self.height as i64)
                .flat_map(|y| (0..self.width as i64).map(move |x| (x, y)))
                .filter(|&(x, y)| self.is_walkable(x, y))
                .count(),
        }
    }

    /// Rejection-sample a walkable tile, inside `area` when it is valid.
    /// Falls back to the map centre after `attempts` misses.
    pub fn random_walkable<R: Rng>(
        &self,
        rng: &mut R,
        area: Option<SpawnArea>,
        attempts: u32,
    ) -> TilePos {
        let (x1, y1, x2, y2) = match area {
            Some(a) if a.is_valid() => (
                a.x1.min(self.width - 1),
                a.y1.min(self.height - 1),
                a.x2.min(self.width).max(a.x1.min(self.width - 1) + 1),
                a.y2.min(self.height).max(a.y1.min(self.height - 1) + 1),
            ),
            _ => (0, 0, self.width, self.height),
        };

        for _ in 0..attempts {
            let pos = TilePos::new(rng.gen_range(x1..x2), rng.gen_range(y1..y2));
            if self.is_walkable_pos(pos) {
                return pos;
            }
        }
        tracing::debug!(attempts, "no walkable tile sampled, using map centre");
        self.center()
    }
}

impl Walkable for WalkableGrid {
    fn is_walkable(&self, x: i64, y: i64) -> bool {
        let Some(idx) = self.index(x, y) else {
            return false;
        };
        match &self.storage {
            Storage::Dense(cells) => cells[idx],
            Storage::Bitmap(words) => words[idx / 64] & (1u64 << (idx % 64)) != 0,
        }
    }
}
