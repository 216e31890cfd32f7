use serde::{Deserialize, Serialize};

/// Default AOI bucket edge, in tiles.
pub const DEFAULT_CELL_SIZE: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("map dimensions {width}x{height} are invalid")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("map row {row} has length {got}, expected {expected}")]
    RowLength { row: usize, got: usize, expected: usize },

    #[error("unexpected map glyph {glyph:?} at ({x}, {y})")]
    BadGlyph { glyph: char, x: usize, y: usize },

    #[error("bitmap has {got} words, expected {expected}")]
    BitmapSize { got: usize, expected: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("map data error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tile coordinate. Pixels only exist at protocol boundaries (see [`TileTransform`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TilePos {
    pub x: u32,
    pub y: u32,
}

impl TilePos {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in tiles.
    pub fn distance(self, other: TilePos) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        dx.hypot(dy)
    }

    /// Offset by a signed delta. `None` when either axis would go negative.
    pub fn offset(self, dx: i64, dy: i64) -> Option<TilePos> {
        let x = u32::try_from(self.x as i64 + dx).ok()?;
        let y = u32::try_from(self.y as i64 + dy).ok()?;
        Some(TilePos::new(x, y))
    }
}

impl std::fmt::Display for TilePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// AOI bucket coordinate: `(tile.x / cell_size, tile.y / cell_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: u32,
    pub y: u32,
}

pub fn cell_of(pos: TilePos, cell_size: u32) -> CellCoord {
    let size = cell_size.max(1);
    CellCoord {
        x: pos.x / size,
        y: pos.y / size,
    }
}

/// The 3x3 block of cells centred on `pos`'s cell, sorted. Cells that would
/// have a negative coordinate are omitted, so edge positions yield 4 or 6.
pub fn nine_cells(pos: TilePos, cell_size: u32) -> Vec<CellCoord> {
    let center = cell_of(pos, cell_size);
    let mut cells = Vec::with_capacity(9);
    for dx in -1..=1_i64 {
        for dy in -1..=1_i64 {
            let x = center.x as i64 + dx;
            let y = center.y as i64 + dy;
            if let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) {
                cells.push(CellCoord { x, y });
            }
        }
    }
    cells
}

/// Terrain passability oracle. Must answer in O(1); out-of-bounds is not walkable.
pub trait Walkable {
    fn is_walkable(&self, x: i64, y: i64) -> bool;

    fn is_walkable_pos(&self, pos: TilePos) -> bool {
        self.is_walkable(pos.x as i64, pos.y as i64)
    }
}

/// Fixed affine tile<->pixel mapping applied at protocol boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileTransform {
    pub tile_size: u32,
}

impl Default for TileTransform {
    fn default() -> Self {
        Self { tile_size: 32 }
    }
}

impl TileTransform {
    /// Pixel coordinate of the tile centre.
    pub fn tile_to_pixel(&self, pos: TilePos) -> (u32, u32) {
        let size = self.tile_size.max(1);
        let half = size / 2;
        (
            pos.x.saturating_mul(size).saturating_add(half),
            pos.y.saturating_mul(size).saturating_add(half),
        )
    }

    pub fn pixel_to_tile(&self, px: u32, py: u32) -> TilePos {
        let size = self.tile_size.max(1);
        TilePos::new(px / size, py / size)
    }
}
