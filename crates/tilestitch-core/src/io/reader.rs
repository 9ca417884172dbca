use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{debug, info};

use crate::error::{Result, StitchError};
use crate::io::image_io::load_gray16;
use crate::io::pattern::{FilePattern, TileName};
use crate::rescale::{rescale_intensity, RescalePlan};
use crate::tile::{normalize_positions, ChannelMap, GridCoord, TileLayout};

/// Read access to a tile set.
///
/// Registration, assembly and export only ever see pixel data through this
/// trait, so alternative readers (other naming schemes, containers, or
/// in-memory fixtures) can be swapped in.
pub trait TileSource {
    fn channel_map(&self) -> &ChannelMap;

    fn layout(&self) -> &TileLayout;

    fn layout_mut(&mut self) -> &mut TileLayout;

    /// Read one tile plane. `tile` indexes into [`TileLayout::coords`].
    fn read_tile(&self, tile: usize, channel: usize) -> Result<Array2<u16>>;
}

/// Directory of single-plane tiles named by a [`FilePattern`].
pub struct FilePatternReader {
    dir: PathBuf,
    pattern: FilePattern,
    channels: ChannelMap,
    layout: TileLayout,
    zstack: Option<usize>,
    /// Indexed as `files[tile][channel]`.
    files: Vec<Vec<PathBuf>>,
}

impl FilePatternReader {
    /// Scan `dir` for tiles matching `pattern` and lay them out on a grid
    /// with the given fractional `overlap`.
    pub fn open(dir: &Path, pattern: &str, overlap: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&overlap) {
            return Err(StitchError::Config(format!(
                "Overlap must be in [0, 1), got {overlap}"
            )));
        }
        let pattern = FilePattern::parse(pattern)?;

        let mut matched: Vec<(TileName, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(tile) = pattern.match_name(name) {
                matched.push((tile, entry.path()));
            }
        }
        if matched.is_empty() {
            return Err(StitchError::EmptyTileSet {
                pattern: pattern.as_str().to_string(),
                dir: dir.display().to_string(),
            });
        }

        let zstacks: BTreeSet<Option<usize>> = matched.iter().map(|(t, _)| t.zstack).collect();
        if zstacks.len() > 1 {
            return Err(StitchError::Config(format!(
                "Pattern '{}' matches {} z-stack planes; fix the z-stack in the pattern",
                pattern.as_str(),
                zstacks.len()
            )));
        }
        let zstack = zstacks.into_iter().next().flatten();

        let channels =
            ChannelMap::from_discovered(matched.iter().map(|(t, _)| t.channel.clone()));
        let coords: Vec<GridCoord> = matched
            .iter()
            .map(|(t, _)| GridCoord {
                row: t.row,
                col: t.col,
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut slots: Vec<Vec<Option<PathBuf>>> = vec![vec![None; channels.len()]; coords.len()];
        for (tile, path) in matched {
            let coord = GridCoord {
                row: tile.row,
                col: tile.col,
            };
            // Both lookups succeed: coords and channels were built from `matched`.
            let t = coords.binary_search(&coord).unwrap_or_default();
            let c = channels.index_of(&tile.channel)?;
            slots[t][c] = Some(path);
        }

        let mut files = Vec::with_capacity(coords.len());
        for (t, row) in slots.into_iter().enumerate() {
            let mut complete = Vec::with_capacity(row.len());
            for (c, path) in row.into_iter().enumerate() {
                let path = path.ok_or_else(|| StitchError::MissingTile {
                    row: coords[t].row,
                    col: coords[t].col,
                    channel: channels.name(c).unwrap_or_default().to_string(),
                })?;
                complete.push(path);
            }
            files.push(complete);
        }

        let tile_shape = check_tile_shapes(&files)?;
        let layout = TileLayout::from_grid(coords, tile_shape, overlap);

        let (rows, cols) = layout.grid_shape();
        info!(
            tiles = layout.len(),
            rows,
            cols,
            channels = channels.len(),
            tile_h = tile_shape.0,
            tile_w = tile_shape.1,
            "Opened tile set"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            pattern,
            channels,
            layout,
            zstack,
            files,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pattern(&self) -> &FilePattern {
        &self.pattern
    }

    pub fn zstack(&self) -> Option<usize> {
        self.zstack
    }

    pub fn tile_path(&self, tile: usize, channel: usize) -> Option<&Path> {
        self.files
            .get(tile)
            .and_then(|row| row.get(channel))
            .map(PathBuf::as_path)
    }
}

/// Every tile must share one (height, width).
fn check_tile_shapes(files: &[Vec<PathBuf>]) -> Result<(usize, usize)> {
    let mut expected: Option<(usize, usize)> = None;
    for path in files.iter().flatten() {
        let (w, h) = image::image_dimensions(path)?;
        let shape = (h as usize, w as usize);
        match expected {
            None => expected = Some(shape),
            Some((eh, ew)) if (eh, ew) != shape => {
                return Err(StitchError::TileShapeMismatch {
                    expected_w: ew,
                    expected_h: eh,
                    w: shape.1,
                    h: shape.0,
                })
            }
            Some(_) => {}
        }
    }
    expected.ok_or(StitchError::Config("Tile set has no files".into()))
}

impl TileSource for FilePatternReader {
    fn channel_map(&self) -> &ChannelMap {
        &self.channels
    }

    fn layout(&self) -> &TileLayout {
        &self.layout
    }

    fn layout_mut(&mut self) -> &mut TileLayout {
        &mut self.layout
    }

    fn read_tile(&self, tile: usize, channel: usize) -> Result<Array2<u16>> {
        let path = self.tile_path(tile, channel).ok_or_else(|| {
            let coord = self.layout.coords.get(tile).copied().unwrap_or(GridCoord { row: 0, col: 0 });
            StitchError::MissingTile {
                row: coord.row,
                col: coord.col,
                channel: self.channels.name(channel).unwrap_or("?").to_string(),
            }
        })?;
        let data = load_gray16(path)?;
        let (eh, ew) = self.layout.tile_shape;
        let (h, w) = data.dim();
        if (h, w) != (eh, ew) {
            return Err(StitchError::TileShapeMismatch {
                expected_w: ew,
                expected_h: eh,
                w,
                h,
            });
        }
        Ok(data)
    }
}

/// Mirror nominal tile positions along the selected axes, keeping the origin at zero.
///
/// Used to match the scanner's stage coordinate convention to image coordinates.
pub fn flip_axes(layout: &mut TileLayout, flip_x: bool, flip_y: bool) {
    for p in layout.positions.iter_mut() {
        if flip_y {
            p.y = -p.y;
        }
        if flip_x {
            p.x = -p.x;
        }
    }
    normalize_positions(&mut layout.positions);
}

/// Tile source that percentile-rescales each tile before handing it out.
pub struct RescaleReader<S> {
    inner: S,
    plan: RescalePlan,
}

impl<S: TileSource> RescaleReader<S> {
    pub fn new(inner: S, plan: RescalePlan) -> Self {
        Self { inner, plan }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn plan(&self) -> &RescalePlan {
        &self.plan
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: TileSource> TileSource for RescaleReader<S> {
    fn channel_map(&self) -> &ChannelMap {
        self.inner.channel_map()
    }

    fn layout(&self) -> &TileLayout {
        self.inner.layout()
    }

    fn layout_mut(&mut self) -> &mut TileLayout {
        self.inner.layout_mut()
    }

    fn read_tile(&self, tile: usize, channel: usize) -> Result<Array2<u16>> {
        let data = self.inner.read_tile(tile, channel)?;
        match self.plan.tile_range(channel) {
            Some(pair) => {
                debug!(tile, channel, range = %pair, "Rescaling tile");
                Ok(rescale_intensity(&data.view(), pair))
            }
            None => Ok(data),
        }
    }
}
