#![allow(dead_code)]

use std::path::Path;

use ndarray::{s, Array2};
use tempfile::TempDir;
use tilestitch_core::io::image_io::save_gray16_tiff;

/// Tile naming used by every fixture.
pub const PATTERN: &str = "S1_{channel}_r{row:03}_c{col:03}.tif";

/// Deterministic per-pixel noise, spread over most of the 16-bit range.
pub fn noise(y: usize, x: usize, seed: u64) -> u16 {
    let mut h = (y as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((x as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F))
        .wrapping_add(seed.wrapping_mul(0x1656_67B1_9E37_79F9));
    h ^= h >> 31;
    h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h ^= h >> 29;
    1000 + (h % 60_000) as u16
}

pub fn scene(h: usize, w: usize, seed: u64) -> Array2<u16> {
    Array2::from_shape_fn((h, w), |(y, x)| noise(y, x, seed))
}

/// A synthetic tile set cut from one noise scene per channel.
pub struct TileSet {
    pub dir: TempDir,
    pub channels: Vec<String>,
    /// One scene per channel, in the order `channels` was given.
    pub scenes: Vec<Array2<u16>>,
    /// True top-left corner of each tile in scene pixels, indexed `[row][col]`.
    pub origins: Vec<Vec<(usize, usize)>>,
    pub tile: (usize, usize),
    pub step: (usize, usize),
}

impl TileSet {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn tile_file(&self, row: usize, col: usize, channel: &str) -> std::path::PathBuf {
        self.path()
            .join(format!("S1_{channel}_r{row:03}_c{col:03}.tif"))
    }

    /// Scene region covered by the tile at (row, col).
    pub fn tile_data(&self, row: usize, col: usize, channel: usize) -> Array2<u16> {
        let (y, x) = self.origins[row][col];
        let (h, w) = self.tile;
        self.scenes[channel]
            .slice(s![y..y + h, x..x + w])
            .to_owned()
    }
}

/// Write a `rows` x `cols` grid of `tile`-sized tiles overlapping by
/// `overlap`, each displaced from its stage position by `jitter(row, col)`.
///
/// `tile * (1 - overlap)` must be a whole number of pixels.
pub fn write_tile_set<F>(
    rows: usize,
    cols: usize,
    tile: (usize, usize),
    overlap: f64,
    channels: &[&str],
    jitter: F,
) -> TileSet
where
    F: Fn(usize, usize) -> (usize, usize),
{
    const MARGIN: usize = 16;
    let step = (
        (tile.0 as f64 * (1.0 - overlap)).round() as usize,
        (tile.1 as f64 * (1.0 - overlap)).round() as usize,
    );
    let scene_h = (rows - 1) * step.0 + tile.0 + MARGIN;
    let scene_w = (cols - 1) * step.1 + tile.1 + MARGIN;

    let dir = tempfile::tempdir().unwrap();
    let scenes: Vec<Array2<u16>> = (0..channels.len())
        .map(|c| scene(scene_h, scene_w, c as u64 + 1))
        .collect();
    let origins: Vec<Vec<(usize, usize)>> = (0..rows)
        .map(|r| {
            (0..cols)
                .map(|c| {
                    let (jy, jx) = jitter(r, c);
                    assert!(jy < MARGIN && jx < MARGIN);
                    (r * step.0 + jy, c * step.1 + jx)
                })
                .collect()
        })
        .collect();

    let set = TileSet {
        dir,
        channels: channels.iter().map(|c| c.to_string()).collect(),
        scenes,
        origins,
        tile,
        step,
    };
    for r in 0..rows {
        for c in 0..cols {
            for (ci, name) in channels.iter().enumerate() {
                let data = set.tile_data(r, c, ci);
                save_gray16_tiff(&data.view(), &set.tile_file(r, c, name)).unwrap();
            }
        }
    }
    set
}

/// Grid without displacement.
pub fn write_regular_tile_set(rows: usize, cols: usize, tile: (usize, usize), channels: &[&str]) -> TileSet {
    write_tile_set(rows, cols, tile, 0.5, channels, |_, _| (0, 0))
}
