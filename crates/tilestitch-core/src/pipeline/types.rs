use std::path::PathBuf;

use ndarray::Array3;

use crate::tile::GridCoord;

/// Stitching stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StitchStage {
    Reading,
    Alignment,
    Assembly,
    Writing,
    PyramidalTiff,
}

impl std::fmt::Display for StitchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reading => write!(f, "Reading tiles"),
            Self::Alignment => write!(f, "Aligning tiles"),
            Self::Assembly => write!(f, "Assembling mosaic"),
            Self::Writing => write!(f, "Writing output"),
            Self::PyramidalTiff => write!(f, "Writing OME-TIFF"),
        }
    }
}

/// Progress reporting for a stitching run.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (e.g. channel count), if known.
    fn begin_stage(&self, _stage: StitchStage, _total_items: Option<usize>) {}

    /// `items_done` work items of the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    fn finish_stage(&self) {}
}

pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// What a stitching run produced.
#[derive(Debug)]
pub struct StitchOutput {
    pub slide_name: String,
    /// Assembled channel names, in output order.
    pub channels: Vec<String>,
    /// Mosaic (height, width) before cropping.
    pub mosaic_shape: (usize, usize),
    /// (height, width) of the written or returned planes.
    pub output_shape: (usize, usize),
    pub cropped: bool,
    /// Files and directories written, in write order.
    pub written: Vec<PathBuf>,
    /// `(channel, y, x)` mosaic when `return_array` was requested.
    pub array: Option<Array3<u16>>,
    /// First tiles that failed to register.
    pub failed: Vec<GridCoord>,
    pub failed_total: usize,
}
