mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tilestitch", about = "Microscopy tile stitching tool")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and assemble a tile set, then export it
    Stitch(commands::stitch::StitchArgs),
    /// Write a down-scaled overview of a tile set
    Thumbnail(commands::thumbnail::ThumbnailArgs),
    /// Generate cluster array-job scripts for a project directory
    Batch(commands::batch::BatchArgs),
    /// Show channels and grid layout of a tile set
    Info(commands::info::InfoArgs),
    /// Print or save a default stitching config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Stitch(args) => commands::stitch::run(args),
        Commands::Thumbnail(args) => commands::thumbnail::run(args),
        Commands::Batch(args) => commands::batch::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
