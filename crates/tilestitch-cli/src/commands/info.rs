use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tilestitch_core::io::reader::{FilePatternReader, TileSource};
use tilestitch_core::tile::mosaic_extent;

#[derive(Args)]
pub struct InfoArgs {
    /// Directory containing the tiles
    pub input_dir: PathBuf,

    /// Tile file pattern
    #[arg(long)]
    pub pattern: String,

    #[arg(long, default_value = "0.1")]
    pub overlap: f64,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let reader = FilePatternReader::open(&args.input_dir, &args.pattern, args.overlap)?;
    let layout = reader.layout();
    let (rows, cols) = layout.grid_shape();
    let (th, tw) = layout.tile_shape;
    let (mh, mw) = mosaic_extent(&layout.positions, layout.tile_shape);

    println!("Directory:   {}", reader.dir().display());
    println!("Pattern:     {}", reader.pattern().as_str());
    println!("Channels:    {}", reader.channel_map().names().join(", "));
    println!("Grid:        {rows} rows x {cols} cols");
    println!("Tiles:       {}", layout.len());
    println!("Tile size:   {tw}x{th}");
    if let Some(z) = reader.zstack() {
        println!("Z-stack:     {z}");
    }
    println!("Nominal:     {mw}x{mh}");

    let bytes = mh * mw * reader.channel_map().len() * std::mem::size_of::<u16>();
    println!("Mosaic size: {:.1} MB", bytes as f64 / (1024.0 * 1024.0));
    Ok(())
}
