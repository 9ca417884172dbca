use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use tilestitch_core::align::AlignmentMethod;
use tilestitch_core::export::OutputFormat;
use tilestitch_core::mosaic::CropSpec;
use tilestitch_core::pipeline::config::{AlignmentConfig, StitchConfig};
use tilestitch_core::pipeline::run_stitch_reported;
use tilestitch_core::rescale::{PercentilePair, RescaleConfig, RescaleMode, RescaleRange};
use tracing::info;

use crate::progress::BarReporter;
use crate::summary::{print_stitch_result, print_stitch_summary};

#[derive(Clone, Copy, ValueEnum)]
pub enum RescaleArg {
    Off,
    On,
    Partial,
    FullImage,
}

impl From<RescaleArg> for RescaleMode {
    fn from(arg: RescaleArg) -> Self {
        match arg {
            RescaleArg::Off => RescaleMode::Off,
            RescaleArg::On => RescaleMode::On,
            RescaleArg::Partial => RescaleMode::Partial,
            RescaleArg::FullImage => RescaleMode::FullImage,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AlignArg {
    PhaseCorrelation,
    Nominal,
}

impl From<AlignArg> for AlignmentMethod {
    fn from(arg: AlignArg) -> Self {
        match arg {
            AlignArg::PhaseCorrelation => AlignmentMethod::PhaseCorrelation,
            AlignArg::Nominal => AlignmentMethod::Nominal,
        }
    }
}

#[derive(Args)]
pub struct StitchArgs {
    /// Stitching config file (TOML). Other flags are ignored when given.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory containing the tiles
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Tile file pattern, e.g. "Row1_Well2_{channel}_zstack003_r{row:03}_c{col:03}.tif"
    #[arg(long)]
    pub pattern: Option<String>,

    /// Slide name used as the output file prefix
    #[arg(long)]
    pub slide_name: Option<String>,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Fractional tile overlap used at acquisition
    #[arg(long, default_value = "0.1")]
    pub overlap: f64,

    /// Channel used for registration
    #[arg(long, default_value = "Alexa488")]
    pub stitching_channel: String,

    /// Registration method
    #[arg(long, value_enum, default_value = "phase-correlation")]
    pub method: AlignArg,

    /// Largest accepted neighbour shift in pixels
    #[arg(long, default_value = "30")]
    pub max_shift: f64,

    /// Gaussian pre-filter sigma for registration (0 disables)
    #[arg(long, default_value = "0")]
    pub filter_sigma: f64,

    /// Intensity rescale mode
    #[arg(long, value_enum, default_value = "on")]
    pub rescale: RescaleArg,

    /// Lower rescale percentile
    #[arg(long, default_value = "1")]
    pub rescale_low: f64,

    /// Upper rescale percentile
    #[arg(long, default_value = "99")]
    pub rescale_high: f64,

    /// Channel left unscaled in partial mode (repeatable)
    #[arg(long = "exclude-channel")]
    pub exclude_channels: Vec<String>,

    /// Output filetype: .tif, .ome.tif, .ome.zarr (repeatable)
    #[arg(long = "filetype", default_value = ".tif")]
    pub filetypes: Vec<OutputFormat>,

    /// Comma-separated channel order for the output
    #[arg(long, value_delimiter = ',')]
    pub channel_order: Option<Vec<String>>,

    /// Crop margins in thumbnail pixels
    #[arg(long, default_value = "0")]
    pub crop_top: u32,
    #[arg(long, default_value = "0")]
    pub crop_bottom: u32,
    #[arg(long, default_value = "0")]
    pub crop_left: u32,
    #[arg(long, default_value = "0")]
    pub crop_right: u32,

    /// Skip the XML sidecar
    #[arg(long)]
    pub no_xml: bool,

    /// Skip the tile position table
    #[arg(long)]
    pub no_positions: bool,

    /// Skip the registration QC plots
    #[arg(long)]
    pub no_plot_qc: bool,

    /// Mirror stage positions horizontally
    #[arg(long)]
    pub flip_x: bool,

    /// Keep the stage Y axis as recorded
    #[arg(long)]
    pub no_flip_y: bool,

    /// Parent directory for the temporary mosaic buffer
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,
}

pub fn run(args: &StitchArgs) -> Result<()> {
    let config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        let config: StitchConfig =
            toml::from_str(&contents).context("Invalid stitching config")?;
        info!(path = %config_path.display(), "Loaded stitching config");
        config
    } else {
        build_config_from_args(args)?
    };

    print_stitch_summary(&config);

    let reporter = Arc::new(BarReporter::new()?);
    let output = run_stitch_reported(&config, reporter.clone())
        .with_context(|| format!("Stitching {} failed", config.slide_name))?;
    reporter.finish();

    print_stitch_result(&output);
    Ok(())
}

fn build_config_from_args(args: &StitchArgs) -> Result<StitchConfig> {
    let (Some(input_dir), Some(pattern), Some(slide_name), Some(output_dir)) = (
        args.input_dir.clone(),
        args.pattern.clone(),
        args.slide_name.clone(),
        args.output_dir.clone(),
    ) else {
        bail!("--input-dir, --pattern, --slide-name and --output-dir are required without --config");
    };

    let exclude_channels = if args.exclude_channels.is_empty() {
        None
    } else {
        Some(args.exclude_channels.clone())
    };

    Ok(StitchConfig {
        input_dir,
        pattern,
        slide_name,
        output_dir,
        overlap: args.overlap,
        filetypes: args.filetypes.clone(),
        channel_order: args.channel_order.clone(),
        export_xml: !args.no_xml,
        write_tile_positions: !args.no_positions,
        plot_qc: !args.no_plot_qc,
        flip_x: args.flip_x,
        flip_y: !args.no_flip_y,
        scratch_dir: args.scratch_dir.clone(),
        alignment: AlignmentConfig {
            method: args.method.into(),
            stitching_channel: args.stitching_channel.clone(),
            max_shift: args.max_shift,
            filter_sigma: args.filter_sigma,
        },
        rescale: RescaleConfig {
            mode: args.rescale.into(),
            range: RescaleRange::Uniform(PercentilePair::new(args.rescale_low, args.rescale_high)),
            exclude_channels,
        },
        crop: CropSpec {
            top: args.crop_top,
            bottom: args.crop_bottom,
            left: args.crop_left,
            right: args.crop_right,
        },
    })
}
