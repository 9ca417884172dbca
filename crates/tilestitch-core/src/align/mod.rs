//! Tile registration.
//!
//! [`Aligner`] is the boundary to the registration algorithm: it consumes a
//! tile source and a reference channel and returns one mosaic position per
//! tile. Everything downstream (assembly, export) depends only on the
//! returned [`Alignment`].

mod edge;
pub mod gaussian;
pub mod phase_correlation;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::io::reader::TileSource;
use crate::tile::{mosaic_extent, normalize_positions, GridCoord, TilePosition};

pub use edge::EdgeAligner;
pub use phase_correlation::Shift;

/// Parameters handed to an [`Aligner`].
#[derive(Clone, Debug, PartialEq)]
pub struct AlignParams {
    /// Index of the stitching channel.
    pub channel: usize,
    /// Largest accepted deviation, in pixels, from the nominal neighbour offset.
    pub max_shift: f64,
    /// Gaussian pre-filter sigma applied before correlation. 0 disables it.
    pub filter_sigma: f64,
}

/// Registration outcome of one neighbouring tile pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeReport {
    /// Tile indices into the source layout, `a` before `b`.
    pub a: usize,
    pub b: usize,
    /// Measured deviation from the nominal neighbour offset.
    pub shift: Shift,
    /// False when the shift exceeded `max_shift`.
    pub accepted: bool,
}

/// Result of registering a tile set.
#[derive(Clone, Debug)]
pub struct Alignment {
    /// Top-left corner of each tile, indexed like the source layout.
    pub positions: Vec<TilePosition>,
    /// Mosaic (height, width) covering every tile.
    pub mosaic_shape: (usize, usize),
    /// Tiles that could not be registered, truncated to a bounded list.
    pub failed: Vec<GridCoord>,
    /// Number of tiles that could not be registered.
    pub failed_total: usize,
    /// Every correlated edge, accepted or not. Empty for nominal placement.
    pub edges: Vec<EdgeReport>,
}

impl Alignment {
    /// Build an alignment from raw positions, normalizing them to a zero origin.
    pub fn from_positions(
        mut positions: Vec<TilePosition>,
        tile_shape: (usize, usize),
        failed: Vec<GridCoord>,
        failed_total: usize,
    ) -> Self {
        normalize_positions(&mut positions);
        let mosaic_shape = mosaic_extent(&positions, tile_shape);
        Self {
            positions,
            mosaic_shape,
            failed,
            failed_total,
            edges: Vec::new(),
        }
    }

    pub fn with_edges(mut self, edges: Vec<EdgeReport>) -> Self {
        self.edges = edges;
        self
    }
}

pub trait Aligner {
    fn name(&self) -> &'static str;

    fn align(&self, source: &dyn TileSource, params: &AlignParams) -> Result<Alignment>;
}

/// Places every tile at its nominal stage position.
#[derive(Clone, Copy, Debug, Default)]
pub struct NominalAligner;

impl Aligner for NominalAligner {
    fn name(&self) -> &'static str {
        "nominal"
    }

    fn align(&self, source: &dyn TileSource, _params: &AlignParams) -> Result<Alignment> {
        let layout = source.layout();
        let alignment =
            Alignment::from_positions(layout.positions.clone(), layout.tile_shape, vec![], 0);
        info!(
            height = alignment.mosaic_shape.0,
            width = alignment.mosaic_shape.1,
            "Using nominal stage positions"
        );
        Ok(alignment)
    }
}

/// Registration strategy selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMethod {
    /// Phase correlation of neighbour overlaps.
    #[default]
    PhaseCorrelation,
    /// Stage positions only.
    Nominal,
}

impl AlignmentMethod {
    pub fn aligner(self) -> Box<dyn Aligner> {
        match self {
            Self::PhaseCorrelation => Box::new(EdgeAligner),
            Self::Nominal => Box::new(NominalAligner),
        }
    }
}

impl std::fmt::Display for AlignmentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PhaseCorrelation => write!(f, "Phase Correlation"),
            Self::Nominal => write!(f, "Nominal"),
        }
    }
}
