/// Down-scaling factor used when building overview thumbnails.
pub const THUMBNAIL_SCALE: f64 = 0.05;

/// Multiplier converting thumbnail-scale crop margins into full-resolution
/// pixels. Reciprocal of [`THUMBNAIL_SCALE`].
pub const CROP_FACTOR: f64 = 20.0;

/// Default low/high percentiles for intensity rescaling.
pub const DEFAULT_PERCENTILES: (f64, f64) = (1.0, 99.0);

/// Full-scale value of the 16-bit output depth.
pub const U16_MAX_F64: f64 = 65535.0;

/// Zarr chunk shape along (channel, y, x).
pub const ZARR_CHUNK_SHAPE: [usize; 3] = [1, 1024, 1024];

/// Number of resolution levels written to an OME-Zarr multiscale (including level 0).
pub const ZARR_PYRAMID_LEVELS: usize = 5;

/// Spatial downscale factor between consecutive OME-Zarr levels.
pub const ZARR_DOWNSCALE: usize = 2;

/// Spatial downscale factor between consecutive OME-TIFF pyramid levels.
pub const OME_TIFF_DOWNSCALE: usize = 5;

/// Pyramid generation stops once the largest level dimension fits within this size.
pub const OME_TIFF_PEAK_SIZE: usize = 1024;

/// Rows per strip used by the OME-TIFF encoder.
pub const OME_TIFF_ROWS_PER_STRIP: u32 = 64;

/// Display colours cycled over channels in OME-Zarr `omero` metadata.
pub const CHANNEL_PALETTE: [&str; 9] = [
    "#e60049", "#0bb4ff", "#50e991", "#e6d800", "#9b19f5", "#ffa300", "#dc0ab4", "#b3d4ff",
    "#00bfa0",
];

/// Number of physical tiles sampled for QC example export.
pub const EXAMPLE_TILE_COUNT: usize = 10;

/// Maximum failed-tile coordinates carried in an alignment report.
pub const MAX_REPORTED_FAILURES: usize = 10;

/// Maximum number of batch-array tasks the scheduler may run at once.
pub const MAX_CONCURRENT_ARRAY_TASKS: usize = 20;

/// Default number of stitching jobs executed by one batch-array task.
pub const DEFAULT_JOBS_PER_FILE: usize = 24;

/// Minimum number of overlapping pixels required to register a neighbour pair.
pub const MIN_OVERLAP_PIXELS: usize = 8;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-12;
