//! Map loading and tile-grid access.
//!
//! Maps are plain text: a width line, a height line, then `height` rows of
//! single-digit tile ids. The grid is loaded once at startup; afterwards
//! tiles are only ever replaced whole (never mutated in place) when they
//! transition, e.g. a harvested soil tile becoming grass.

use std::fs;
use std::path::Path;

use log::info;

use crate::error::ServerError;
use crate::tiles::{Tile, TileKind};
use shared::TILE_SIZE;

/// Bundled fallback so the server runs without an asset directory.
pub const DEFAULT_MAP: &str = "\
16
12
2222222222222222
2000000000000002
2000330000100002
2000000001110002
2000000001610002
2000550001110002
2000550000000002
2000440000000002
2000000000000002
2000000000030002
2000000000000002
2222222222222222
";

pub struct Map {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
}

impl Map {
    /// Parses map text. Errors carry a human-readable detail string.
    pub fn parse(text: &str) -> Result<Map, ServerError> {
        Self::parse_named(text, "<inline>")
    }

    /// Reads and parses a map file from disk.
    pub fn load(path: &Path) -> Result<Map, ServerError> {
        let text = fs::read_to_string(path)?;
        let map = Self::parse_named(&text, &path.display().to_string())?;
        info!(
            "loaded map {} ({}x{} tiles)",
            path.display(),
            map.width,
            map.height
        );
        Ok(map)
    }

    fn parse_named(text: &str, name: &str) -> Result<Map, ServerError> {
        let fail = |detail: String| ServerError::MapFormat {
            path: name.to_string(),
            detail,
        };

        let mut lines = text.lines().filter(|line| !line.trim().is_empty());

        let width: i32 = lines
            .next()
            .ok_or_else(|| fail("missing width line".to_string()))?
            .trim()
            .parse()
            .map_err(|_| fail("width is not an integer".to_string()))?;
        let height: i32 = lines
            .next()
            .ok_or_else(|| fail("missing height line".to_string()))?
            .trim()
            .parse()
            .map_err(|_| fail("height is not an integer".to_string()))?;

        if width <= 0 || height <= 0 {
            return Err(fail(format!("invalid dimensions {}x{}", width, height)));
        }

        let mut tiles = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            let row = lines
                .next()
                .ok_or_else(|| fail(format!("missing row {}", y)))?
                .trim();
            if row.len() != width as usize {
                return Err(fail(format!(
                    "row {} has {} tiles, expected {}",
                    y,
                    row.len(),
                    width
                )));
            }
            for (x, ch) in row.chars().enumerate() {
                let digit = ch
                    .to_digit(10)
                    .ok_or_else(|| fail(format!("row {} column {}: {:?} is not a digit", y, x, ch)))?;
                let kind = TileKind::from_digit(digit as u8)
                    .ok_or_else(|| fail(format!("row {} column {}: unknown tile id {}", y, x, digit)))?;
                tiles.push(Tile::new(x as i32, y, kind));
            }
        }

        Ok(Map {
            width,
            height,
            tiles,
        })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn pixel_width(&self) -> i32 {
        self.width * TILE_SIZE
    }

    pub fn in_bounds(&self, tile_x: i32, tile_y: i32) -> bool {
        tile_x >= 0 && tile_y >= 0 && tile_x < self.width && tile_y < self.height
    }

    pub fn tile(&self, tile_x: i32, tile_y: i32) -> Option<&Tile> {
        if !self.in_bounds(tile_x, tile_y) {
            return None;
        }
        self.tiles.get((tile_y * self.width + tile_x) as usize)
    }

    pub fn tile_mut(&mut self, tile_x: i32, tile_y: i32) -> Option<&mut Tile> {
        if !self.in_bounds(tile_x, tile_y) {
            return None;
        }
        self.tiles.get_mut((tile_y * self.width + tile_x) as usize)
    }

    pub fn kind_at(&self, tile_x: i32, tile_y: i32) -> Option<TileKind> {
        self.tile(tile_x, tile_y).map(|tile| tile.kind())
    }

    pub fn passable(&self, tile_x: i32, tile_y: i32) -> bool {
        self.tile(tile_x, tile_y)
            .map(|tile| tile.passable())
            .unwrap_or(false)
    }

    /// Swaps in a freshly built tile of the given kind. Returns false when
    /// the coordinates are out of bounds; nothing is mutated in that case.
    pub fn replace(&mut self, tile_x: i32, tile_y: i32, kind: TileKind) -> bool {
        if !self.in_bounds(tile_x, tile_y) {
            return false;
        }
        let index = (tile_y * self.width + tile_x) as usize;
        self.tiles[index] = Tile::new(tile_x, tile_y, kind);
        true
    }

    /// The n-th passable tile in row-major order, wrapping around. Used for
    /// deterministic spawn placement.
    pub fn nth_passable(&self, n: usize) -> Option<(i32, i32)> {
        let passable: Vec<(i32, i32)> = self
            .tiles
            .iter()
            .filter(|tile| tile.passable())
            .map(|tile| (tile.x(), tile.y()))
            .collect();
        if passable.is_empty() {
            return None;
        }
        Some(passable[n % passable.len()])
    }

    /// Pixel center of a tile.
    pub fn tile_center(tile_x: i32, tile_y: i32) -> (i32, i32) {
        (
            tile_x * TILE_SIZE + TILE_SIZE / 2,
            tile_y * TILE_SIZE + TILE_SIZE / 2,
        )
    }
}
