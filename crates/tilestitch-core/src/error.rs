use thiserror::Error;

#[derive(Error, Debug)]
pub enum StitchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown channel '{name}' (available: {available})")]
    UnknownChannel { name: String, available: String },

    #[error("Invalid file pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("No tiles matching '{pattern}' found in {dir}")]
    EmptyTileSet { pattern: String, dir: String },

    #[error("Missing tile r{row} c{col} for channel '{channel}'")]
    MissingTile {
        row: usize,
        col: usize,
        channel: String,
    },

    #[error("Tile shape mismatch: expected {expected_w}x{expected_h}, got {w}x{h}")]
    TileShapeMismatch {
        expected_w: usize,
        expected_h: usize,
        w: usize,
        h: usize,
    },

    #[error("Invalid crop: {0}")]
    InvalidCrop(String),

    #[error("Alignment error: {0}")]
    Alignment(String),

    #[error("Batch scan error: {0}")]
    BatchScan(String),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("TIFF encoding error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Zarr store error: {0}")]
    Zarr(String),

    #[error("Plot error: {0}")]
    Plot(String),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, StitchError>;
