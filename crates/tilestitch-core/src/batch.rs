//! Cluster array-job scaffolding for stitching every well and timepoint of
//! a project.
//!
//! Layout under the project root:
//!
//! ```text
//! well_sorted/<Row.._Well..>/<Timepoint...>_*.tif   (input)
//! stitched_wells/                                   (stitch output)
//! slurm_jobs/stitch_all/array_inputs.tsv
//! slurm_jobs/stitch_all/process.sh
//! slurm_jobs/stitch_all/run.sh
//! slurm_jobs/stitch_all/logs/
//! ```

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consts::{DEFAULT_JOBS_PER_FILE, MAX_CONCURRENT_ARRAY_TASKS};
use crate::error::{Result, StitchError};
use crate::rescale::PercentilePair;

pub const INPUT_DIR: &str = "well_sorted";
pub const OUTPUT_DIR: &str = "stitched_wells";
pub const JOBS_DIR: &str = "slurm_jobs/stitch_all";
pub const LOGS_DIR: &str = "logs";

const WELL_REGEX: &str = r"Row.._Well..";
const TIMEPOINT_REGEX: &str = r"^Timepoint...";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub stitching_channel: String,
    pub zstack: usize,
    pub rescale_range: PercentilePair,
    pub overlap: f64,
    /// Stitching runs executed by one array task.
    pub jobs_per_file: usize,
    /// Command the driver script invokes.
    pub executable: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            stitching_channel: "mCherry".into(),
            zstack: 1,
            rescale_range: PercentilePair::new(0.1, 99.9),
            overlap: 0.1,
            jobs_per_file: DEFAULT_JOBS_PER_FILE,
            executable: "tilestitch".into(),
        }
    }
}

/// One stitching invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchJob {
    pub pattern: String,
    pub slide_name: String,
    pub input_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct BatchPlan {
    pub jobs: Vec<BatchJob>,
    /// Number of array tasks, `ceil(jobs / jobs_per_file)`.
    pub array_size: usize,
    pub jobs_dir: PathBuf,
    pub table: PathBuf,
    pub driver: PathBuf,
    pub submit: PathBuf,
}

/// `ceil(jobs / jobs_per_file)`
pub fn array_size(jobs: usize, jobs_per_file: usize) -> usize {
    jobs.div_ceil(jobs_per_file.max(1))
}

/// Pattern matching every tile of one timepoint/well at the given z-stack.
pub fn job_pattern(timepoint: &str, well: &str, zstack: usize) -> String {
    format!("{timepoint}_{well}_{{channel}}_zstack{zstack:03}_r{{row:03}}_c{{col:03}}.tif")
}

fn unique_matches<I>(names: I, re: &Regex) -> BTreeSet<String>
where
    I: IntoIterator<Item = String>,
{
    names
        .into_iter()
        .filter_map(|n| re.find(&n).map(|m| m.as_str().to_string()))
        .collect()
}

fn list_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        if let Some(name) = entry?.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Find wells under `input` and the timepoints present across them.
pub fn scan_project(input: &Path) -> Result<(Vec<String>, Vec<String>)> {
    let well_re = Regex::new(WELL_REGEX)?;
    let tp_re = Regex::new(TIMEPOINT_REGEX)?;

    let wells: Vec<String> = unique_matches(list_names(input)?, &well_re).into_iter().collect();
    if wells.is_empty() {
        return Err(StitchError::BatchScan(format!(
            "No well directories matching '{WELL_REGEX}' in {}",
            input.display()
        )));
    }

    let mut timepoints = BTreeSet::new();
    for well in &wells {
        let tifs = list_names(&input.join(well))?
            .into_iter()
            .filter(|n| n.ends_with(".tif"));
        timepoints.extend(unique_matches(tifs, &tp_re));
    }
    if timepoints.is_empty() {
        return Err(StitchError::BatchScan(format!(
            "No timepoint-prefixed .tif files found under {}",
            input.display()
        )));
    }
    Ok((wells, timepoints.into_iter().collect()))
}

fn render_table(jobs: &[BatchJob]) -> String {
    let mut out = String::from("ArrayTaskID\tpattern\tslidename\tpath\n");
    for (i, job) in jobs.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}",
            i + 1,
            job.pattern,
            job.slide_name,
            job.input_dir.display()
        );
    }
    out
}

fn render_driver(config: &BatchConfig, outdir: &Path) -> String {
    let mut out = String::from("#!/bin/bash -l\n");
    out.push_str("# Usage: process.sh <pattern> <slidename> <input dir>\n");
    out.push_str("set -euo pipefail\n\n");
    let _ = writeln!(
        out,
        "{exe} stitch \\\n  --input-dir \"$3\" \\\n  --pattern \"$1\" \\\n  --slide-name \"$2\" \\\n  --output-dir \"{outdir}\" \\\n  --overlap {overlap} \\\n  --stitching-channel \"{channel}\" \\\n  --rescale on \\\n  --rescale-low {low} \\\n  --rescale-high {high} \\\n  --filetype .tif \\\n  --no-xml \\\n  --no-positions",
        exe = config.executable,
        outdir = outdir.display(),
        overlap = config.overlap,
        channel = config.stitching_channel,
        low = config.rescale_range.low,
        high = config.rescale_range.high,
    );
    out
}

fn render_submit(config: &BatchConfig, array_size: usize, table: &Path) -> String {
    let mut out = String::from("#!/bin/bash -l\n");
    out.push_str("#SBATCH --job-name=stitching\n");
    out.push_str("#SBATCH -o \"./run%A-%a.out.%j\"\n");
    out.push_str("#SBATCH -e \"./run%A-%a.err.%j\"\n");
    out.push_str("#SBATCH -D ./\n");
    out.push_str("#SBATCH --nodes=1\n");
    out.push_str("#SBATCH --tasks-per-node=1\n");
    out.push_str("#SBATCH --cpus-per-task=1\n");
    out.push_str("#SBATCH --time=24:00:00\n");
    let _ = writeln!(
        out,
        "#SBATCH --array=1-{array_size}%{MAX_CONCURRENT_ARRAY_TASKS}\n"
    );
    let _ = writeln!(out, "PER_TASK={}", config.jobs_per_file.max(1));
    out.push_str("START_NUM=$(( (SLURM_ARRAY_TASK_ID - 1) * PER_TASK + 1 ))\n");
    out.push_str("END_NUM=$(( SLURM_ARRAY_TASK_ID * PER_TASK ))\n");
    let _ = writeln!(out, "config=\"{}\"\n", table.display());
    out.push_str("for (( run=START_NUM; run<=END_NUM; run++ )); do\n");
    out.push_str("  pattern=$(awk -F'\\t' -v id=\"$run\" '$1==id {print $2}' \"$config\")\n");
    out.push_str("  slidename=$(awk -F'\\t' -v id=\"$run\" '$1==id {print $3}' \"$config\")\n");
    out.push_str("  path=$(awk -F'\\t' -v id=\"$run\" '$1==id {print $4}' \"$config\")\n");
    out.push_str("  [ -z \"$pattern\" ] && break\n");
    out.push_str("  echo \"stitching $slidename from $path\"\n");
    out.push_str("  srun bash ../process.sh \"$pattern\" \"$slidename\" \"$path\"\n");
    out.push_str("done\n");
    out
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Scan `root` and write the job table, driver and submission scripts.
///
/// Jobs are the cross product of timepoints and wells, timepoint-major.
/// Submit from `slurm_jobs/stitch_all/logs` with `sbatch ../run.sh`.
pub fn prepare_batch_jobs(root: &Path, config: &BatchConfig) -> Result<BatchPlan> {
    if config.jobs_per_file == 0 {
        return Err(StitchError::Config("jobs_per_file must be at least 1".into()));
    }
    config.rescale_range.validate()?;

    let input = root.join(INPUT_DIR);
    let outdir = root.join(OUTPUT_DIR);
    let jobs_dir = root.join(JOBS_DIR);
    std::fs::create_dir_all(jobs_dir.join(LOGS_DIR))?;
    std::fs::create_dir_all(&outdir)?;

    let (wells, timepoints) = scan_project(&input)?;
    let input = &input;
    let jobs: Vec<BatchJob> = timepoints
        .iter()
        .flat_map(|tp| {
            wells.iter().map(move |well| BatchJob {
                pattern: job_pattern(tp, well, config.zstack),
                slide_name: format!("{tp}_{well}"),
                input_dir: input.join(well),
            })
        })
        .collect();
    let array_size = array_size(jobs.len(), config.jobs_per_file);

    let table = jobs_dir.join("array_inputs.tsv");
    std::fs::write(&table, render_table(&jobs))?;
    let driver = jobs_dir.join("process.sh");
    std::fs::write(&driver, render_driver(config, &outdir))?;
    make_executable(&driver)?;
    let submit = jobs_dir.join("run.sh");
    std::fs::write(&submit, render_submit(config, array_size, &table))?;
    make_executable(&submit)?;

    info!(
        wells = wells.len(),
        timepoints = timepoints.len(),
        jobs = jobs.len(),
        array_size,
        dir = %jobs_dir.display(),
        "Batch job files generated"
    );

    Ok(BatchPlan {
        jobs,
        array_size,
        jobs_dir,
        table,
        driver,
        submit,
    })
}
