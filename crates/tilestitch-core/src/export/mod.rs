//! Output sinks for an assembled mosaic.

pub mod flat_tiff;
pub mod ome_tiff;
pub mod ome_zarr;
pub mod positions;
pub mod qc_plots;
pub mod sidecar;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StitchError;

/// Output container selected for a stitching run. Several may be combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    /// One 16-bit TIFF per channel, optionally with an XML sidecar.
    #[serde(rename = ".tif")]
    Tiff,
    /// Multi-resolution OME-TIFF built straight from the registered tiles.
    #[serde(rename = ".ome.tif")]
    OmeTiff,
    /// Chunked multiscale OME-Zarr.
    #[serde(rename = ".ome.zarr")]
    OmeZarr,
    /// Hand the assembled array back to the caller instead of writing it.
    #[serde(rename = "return_array")]
    ReturnArray,
}

impl OutputFormat {
    /// Whether the sink consumes the assembled (rescaled, cropped) mosaic.
    pub fn needs_assembly(self) -> bool {
        !matches!(self, Self::OmeTiff)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tiff => write!(f, ".tif"),
            Self::OmeTiff => write!(f, ".ome.tif"),
            Self::OmeZarr => write!(f, ".ome.zarr"),
            Self::ReturnArray => write!(f, "return_array"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = StitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "tif" | "tiff" => Ok(Self::Tiff),
            "ome.tif" | "ome.tiff" => Ok(Self::OmeTiff),
            "ome.zarr" | "zarr" => Ok(Self::OmeZarr),
            "return_array" => Ok(Self::ReturnArray),
            other => Err(StitchError::Config(format!(
                "Unknown output filetype '{other}' (expected .tif, .ome.tif, .ome.zarr or return_array)"
            ))),
        }
    }
}
