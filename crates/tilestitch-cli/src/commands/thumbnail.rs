use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tilestitch_core::consts::THUMBNAIL_SCALE;
use tilestitch_core::rescale::PercentilePair;
use tilestitch_core::thumbnail::{generate_thumbnail, ThumbnailConfig};

#[derive(Args)]
pub struct ThumbnailArgs {
    /// Directory containing the tiles
    pub input_dir: PathBuf,

    /// Tile file pattern
    #[arg(long)]
    pub pattern: String,

    /// Slide name used as the output file prefix
    #[arg(long)]
    pub name: String,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "0.1")]
    pub overlap: f64,

    /// Channel rendered into the thumbnail
    #[arg(long, default_value = "DAPI")]
    pub channel: String,

    /// Use raw intensities
    #[arg(long)]
    pub no_rescale: bool,

    #[arg(long, default_value = "1")]
    pub rescale_low: f64,

    #[arg(long, default_value = "99")]
    pub rescale_high: f64,

    /// Scale factor relative to full resolution
    #[arg(long, default_value_t = THUMBNAIL_SCALE)]
    pub scale: f64,

    /// Keep the stage Y axis as recorded
    #[arg(long)]
    pub no_flip_y: bool,

    /// Also export a random sample of tiles in every channel
    #[arg(long)]
    pub examples: bool,

    /// Seed for the example sample
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run(args: &ThumbnailArgs) -> Result<()> {
    let config = ThumbnailConfig {
        input_dir: args.input_dir.clone(),
        pattern: args.pattern.clone(),
        output_dir: args.output_dir.clone(),
        name: args.name.clone(),
        overlap: args.overlap,
        stitching_channel: args.channel.clone(),
        rescale: !args.no_rescale,
        rescale_range: PercentilePair::new(args.rescale_low, args.rescale_high),
        scale: args.scale,
        flip_y: !args.no_flip_y,
        export_examples: args.examples,
        seed: args.seed,
    };

    let output = generate_thumbnail(&config).context("Thumbnail generation failed")?;
    println!(
        "Thumbnail ({}x{}) saved to {}",
        output.shape.1,
        output.shape.0,
        output.thumbnail.display()
    );
    if !output.examples.is_empty() {
        println!("Exported {} example tile image(s)", output.examples.len());
    }
    Ok(())
}
