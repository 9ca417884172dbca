use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::align::AlignmentMethod;
use crate::error::{Result, StitchError};
use crate::export::OutputFormat;
use crate::mosaic::CropSpec;
use crate::rescale::RescaleConfig;

/// Everything needed to stitch one slide.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StitchConfig {
    pub input_dir: PathBuf,
    /// Tile file pattern, e.g. `Row1_Well2_{channel}_zstack3_r{row:03}_c{col:03}.tif`.
    pub pattern: String,
    pub slide_name: String,
    pub output_dir: PathBuf,
    /// Fractional tile overlap used at acquisition.
    #[serde(default = "default_overlap")]
    pub overlap: f64,
    #[serde(default = "default_filetypes")]
    pub filetypes: Vec<OutputFormat>,
    /// Assembled channel order by name. Discovery order when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_order: Option<Vec<String>>,
    /// Write the XML sidecar next to flat TIFF output.
    #[serde(default = "default_true")]
    pub export_xml: bool,
    #[serde(default = "default_true")]
    pub write_tile_positions: bool,
    /// Render edge scatter and edge quality plots after registration.
    #[serde(default = "default_true")]
    pub plot_qc: bool,
    #[serde(default)]
    pub flip_x: bool,
    #[serde(default = "default_true")]
    pub flip_y: bool,
    /// Parent directory for the temporary mosaic buffer. Defaults to the
    /// output directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub rescale: RescaleConfig,
    #[serde(default)]
    pub crop: CropSpec,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default)]
    pub method: AlignmentMethod,
    /// Channel the registration runs on.
    #[serde(default = "default_stitching_channel")]
    pub stitching_channel: String,
    /// Largest accepted neighbour shift in pixels.
    #[serde(default = "default_max_shift")]
    pub max_shift: f64,
    #[serde(default)]
    pub filter_sigma: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            method: AlignmentMethod::default(),
            stitching_channel: default_stitching_channel(),
            max_shift: default_max_shift(),
            filter_sigma: 0.0,
        }
    }
}

fn default_overlap() -> f64 {
    0.1
}

fn default_filetypes() -> Vec<OutputFormat> {
    vec![OutputFormat::Tiff]
}

fn default_true() -> bool {
    true
}

fn default_stitching_channel() -> String {
    "Alexa488".into()
}

fn default_max_shift() -> f64 {
    30.0
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            pattern: "Row1_Well1_{channel}_zstack001_r{row:03}_c{col:03}.tif".into(),
            slide_name: "slide".into(),
            output_dir: PathBuf::from("stitched"),
            overlap: default_overlap(),
            filetypes: default_filetypes(),
            channel_order: None,
            export_xml: true,
            write_tile_positions: true,
            plot_qc: true,
            flip_x: false,
            flip_y: true,
            scratch_dir: None,
            alignment: AlignmentConfig::default(),
            rescale: RescaleConfig::default(),
            crop: CropSpec::default(),
        }
    }
}

impl StitchConfig {
    /// Check everything that can be checked without touching the tile set.
    pub fn validate(&self) -> Result<()> {
        if self.slide_name.trim().is_empty() {
            return Err(StitchError::Config("slide_name must not be empty".into()));
        }
        if self.filetypes.is_empty() {
            return Err(StitchError::Config(
                "At least one output filetype is required".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(StitchError::Config(format!(
                "Overlap must be in [0, 1), got {}",
                self.overlap
            )));
        }
        if !(self.alignment.max_shift >= 0.0) {
            return Err(StitchError::Config(format!(
                "max_shift must be non-negative, got {}",
                self.alignment.max_shift
            )));
        }
        if !(self.alignment.filter_sigma >= 0.0) {
            return Err(StitchError::Config(format!(
                "filter_sigma must be non-negative, got {}",
                self.alignment.filter_sigma
            )));
        }
        self.rescale.validate()
    }

    /// Selected formats in order, without repeats.
    pub fn formats(&self) -> Vec<OutputFormat> {
        let mut out: Vec<OutputFormat> = Vec::with_capacity(self.filetypes.len());
        for f in &self.filetypes {
            if !out.contains(f) {
                out.push(*f);
            }
        }
        out
    }

    pub fn returns_array(&self) -> bool {
        self.filetypes.contains(&OutputFormat::ReturnArray)
    }

    /// Whether any selected format writes to the output directory.
    pub fn writes_files(&self) -> bool {
        self.filetypes.iter().any(|f| *f != OutputFormat::ReturnArray)
    }
}
