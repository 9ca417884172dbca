use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tilestitch_core::batch::{prepare_batch_jobs, BatchConfig, JOBS_DIR, LOGS_DIR};
use tilestitch_core::consts::DEFAULT_JOBS_PER_FILE;
use tilestitch_core::rescale::PercentilePair;

#[derive(Args)]
pub struct BatchArgs {
    /// Project root containing `well_sorted/`
    pub root: PathBuf,

    #[arg(long, default_value = "mCherry")]
    pub stitching_channel: String,

    /// Z-stack plane to stitch
    #[arg(long, default_value = "1")]
    pub zstack: usize,

    #[arg(long, default_value = "0.1")]
    pub rescale_low: f64,

    #[arg(long, default_value = "99.9")]
    pub rescale_high: f64,

    #[arg(long, default_value = "0.1")]
    pub overlap: f64,

    /// Stitching runs per array task
    #[arg(long, default_value_t = DEFAULT_JOBS_PER_FILE)]
    pub jobs_per_file: usize,

    /// Command the generated driver invokes
    #[arg(long, default_value = "tilestitch")]
    pub executable: String,
}

pub fn run(args: &BatchArgs) -> Result<()> {
    let config = BatchConfig {
        stitching_channel: args.stitching_channel.clone(),
        zstack: args.zstack,
        rescale_range: PercentilePair::new(args.rescale_low, args.rescale_high),
        overlap: args.overlap,
        jobs_per_file: args.jobs_per_file,
        executable: args.executable.clone(),
    };
    let plan = prepare_batch_jobs(&args.root, &config)
        .with_context(|| format!("Failed to prepare batch jobs in {}", args.root.display()))?;

    println!("Jobs:        {}", plan.jobs.len());
    println!("Array tasks: {}", plan.array_size);
    println!("Table:       {}", plan.table.display());
    println!("Driver:      {}", plan.driver.display());
    println!("Submit:      {}", plan.submit.display());
    println!();
    println!(
        "Submit with: cd {} && sbatch ../run.sh",
        args.root.join(JOBS_DIR).join(LOGS_DIR).display()
    );
    Ok(())
}
