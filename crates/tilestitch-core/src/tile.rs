use std::collections::{BTreeSet, HashSet};

use crate::error::{Result, StitchError};

/// Grid coordinate of one stage position, as encoded in tile file names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoord {
    pub row: usize,
    pub col: usize,
}

impl std::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{:03}c{:03}", self.row, self.col)
    }
}

/// Top-left corner of a tile in mosaic pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TilePosition {
    pub y: f64,
    pub x: f64,
}

/// Ordered bijection between channel names and channel indices.
///
/// Fixed for the lifetime of a stitching run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelMap {
    names: Vec<String>,
}

impl ChannelMap {
    /// Build a map with the given index order. Duplicate names are rejected.
    pub fn new(names: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(StitchError::Config(format!(
                    "Duplicate channel name '{name}'"
                )));
            }
        }
        Ok(Self { names })
    }

    /// Build a map from discovered channel tokens: unique, sorted by name.
    pub fn from_discovered<I>(names: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let unique: BTreeSet<String> = names.into_iter().collect();
        Self {
            names: unique.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Look up a channel index by name.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| StitchError::UnknownChannel {
                name: name.to_string(),
                available: self.names.join(", "),
            })
    }

    /// Resolve an optional channel reorder request into channel indices.
    ///
    /// `None` keeps discovery order. A list may select a subset in any order
    /// but must not repeat a channel.
    pub fn resolve_order(&self, order: Option<&[String]>) -> Result<Vec<usize>> {
        let Some(order) = order else {
            return Ok((0..self.names.len()).collect());
        };

        let mut indices = Vec::with_capacity(order.len());
        for name in order {
            let idx = self.index_of(name)?;
            if indices.contains(&idx) {
                return Err(StitchError::Config(format!(
                    "Channel '{name}' listed twice in channel order"
                )));
            }
            indices.push(idx);
        }
        if indices.is_empty() {
            return Err(StitchError::Config("Channel order is empty".into()));
        }
        Ok(indices)
    }
}

/// Stage layout of a tile set: grid coordinates and nominal pixel positions.
#[derive(Clone, Debug)]
pub struct TileLayout {
    pub coords: Vec<GridCoord>,
    pub positions: Vec<TilePosition>,
    /// Tile shape as (height, width).
    pub tile_shape: (usize, usize),
}

impl TileLayout {
    /// Lay tiles out on a regular grid with the given fractional overlap.
    pub fn from_grid(coords: Vec<GridCoord>, tile_shape: (usize, usize), overlap: f64) -> Self {
        let (h, w) = tile_shape;
        let min_row = coords.iter().map(|c| c.row).min().unwrap_or(0);
        let min_col = coords.iter().map(|c| c.col).min().unwrap_or(0);
        let step_y = h as f64 * (1.0 - overlap);
        let step_x = w as f64 * (1.0 - overlap);

        let positions = coords
            .iter()
            .map(|c| TilePosition {
                y: (c.row - min_row) as f64 * step_y,
                x: (c.col - min_col) as f64 * step_x,
            })
            .collect();

        Self {
            coords,
            positions,
            tile_shape,
        }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Number of (rows, cols) spanned by the grid.
    pub fn grid_shape(&self) -> (usize, usize) {
        let span = |vals: Vec<usize>| match (vals.iter().min(), vals.iter().max()) {
            (Some(lo), Some(hi)) => hi - lo + 1,
            _ => 0,
        };
        (
            span(self.coords.iter().map(|c| c.row).collect()),
            span(self.coords.iter().map(|c| c.col).collect()),
        )
    }

    pub fn find(&self, coord: GridCoord) -> Option<usize> {
        self.coords.iter().position(|&c| c == coord)
    }

    /// Pairs of tile indices that are direct grid neighbours (right or below).
    pub fn neighbors(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, c) in self.coords.iter().enumerate() {
            let right = GridCoord {
                row: c.row,
                col: c.col + 1,
            };
            let below = GridCoord {
                row: c.row + 1,
                col: c.col,
            };
            for n in [right, below] {
                if let Some(j) = self.find(n) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

/// Shift positions so the smallest y and x are zero.
pub fn normalize_positions(positions: &mut [TilePosition]) {
    let min_y = positions.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let min_x = positions.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    if !min_y.is_finite() || !min_x.is_finite() {
        return;
    }
    for p in positions.iter_mut() {
        p.y -= min_y;
        p.x -= min_x;
    }
}

/// Mosaic (height, width) covering every tile placed at `positions`.
pub fn mosaic_extent(positions: &[TilePosition], tile_shape: (usize, usize)) -> (usize, usize) {
    let max_y = positions.iter().map(|p| p.y).fold(0.0, f64::max);
    let max_x = positions.iter().map(|p| p.x).fold(0.0, f64::max);
    (
        max_y.round() as usize + tile_shape.0,
        max_x.round() as usize + tile_shape.1,
    )
}
