use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::align::AlignParams;
use crate::error::Result;
use crate::export::flat_tiff::write_flat_tiffs;
use crate::export::ome_tiff::write_ome_tiff;
use crate::export::ome_zarr::write_ome_zarr;
use crate::export::positions::write_positions;
use crate::export::qc_plots::write_qc_plots;
use crate::export::sidecar::write_sidecar;
use crate::export::OutputFormat;
use crate::io::reader::{flip_axes, FilePatternReader, RescaleReader, TileSource};
use crate::mosaic::{assemble, MosaicPlan};
use crate::rescale::RescaleMode;

use super::config::StitchConfig;
use super::types::{NoOpReporter, ProgressReporter, StitchOutput, StitchStage};

/// Stitch one slide without progress reporting.
pub fn run_stitch(config: &StitchConfig) -> Result<StitchOutput> {
    run_stitch_reported(config, Arc::new(NoOpReporter))
}

/// Stitch one slide: read, register, assemble, then run every selected exporter.
///
/// Configuration errors (including a `partial` rescale without exclusions and
/// unknown channel names) are raised before any pixel data is read.
pub fn run_stitch_reported(
    config: &StitchConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<StitchOutput> {
    config.validate()?;
    let formats = config.formats();
    let outdir = &config.output_dir;
    if config.writes_files() {
        std::fs::create_dir_all(outdir)?;
    }

    reporter.begin_stage(StitchStage::Reading, None);
    let mut reader = FilePatternReader::open(&config.input_dir, &config.pattern, config.overlap)?;
    flip_axes(reader.layout_mut(), config.flip_x, config.flip_y);
    let channels = reader.channel_map().clone();
    let rescale = config.rescale.resolve(&channels)?;
    let order = channels.resolve_order(config.channel_order.as_deref())?;
    let stitch_channel = channels.index_of(&config.alignment.stitching_channel)?;
    let source = RescaleReader::new(reader, rescale);
    reporter.finish_stage();

    info!(
        slide = %config.slide_name,
        rescale = %config.rescale.mode,
        formats = ?formats,
        "Starting stitching run"
    );

    reporter.begin_stage(StitchStage::Alignment, None);
    let aligner = config.alignment.method.aligner();
    let params = AlignParams {
        channel: stitch_channel,
        max_shift: config.alignment.max_shift,
        filter_sigma: config.alignment.filter_sigma,
    };
    let alignment = aligner.align(&source, &params)?;
    if alignment.failed_total > 0 {
        warn!(
            failed = alignment.failed_total,
            tiles = ?alignment.failed,
            "Some tiles could not be aligned and were placed at their nominal positions"
        );
    }
    reporter.finish_stage();

    let mut written: Vec<PathBuf> = Vec::new();
    if config.plot_qc && config.writes_files() {
        written.extend(write_qc_plots(
            &alignment,
            source.layout().tile_shape,
            config.alignment.max_shift,
            outdir,
            &config.slide_name,
        )?);
    }
    if config.write_tile_positions && !config.returns_array() {
        written.push(write_positions(outdir, &config.slide_name, &alignment.positions)?);
    }

    let plan = MosaicPlan::new(&source, &alignment)?;
    let mut output = StitchOutput {
        slide_name: config.slide_name.clone(),
        channels: order
            .iter()
            .filter_map(|&c| channels.name(c).map(str::to_string))
            .collect(),
        mosaic_shape: plan.shape(),
        output_shape: plan.shape(),
        cropped: false,
        written,
        array: None,
        failed: alignment.failed.clone(),
        failed_total: alignment.failed_total,
    };

    if formats.iter().any(|f| f.needs_assembly()) {
        let scratch = match &config.scratch_dir {
            Some(dir) => dir.clone(),
            None if config.writes_files() => outdir.clone(),
            None => std::env::temp_dir(),
        };

        reporter.begin_stage(StitchStage::Assembly, Some(order.len()));
        let mosaic = assemble(
            &plan,
            &order,
            source.plan(),
            &config.crop,
            &scratch,
            |done| reporter.advance(done),
        )?;
        reporter.finish_stage();

        let (_, h, w) = mosaic.shape();
        output.output_shape = (h, w);
        output.cropped = mosaic.is_cropped();
        output.channels = mosaic.channels().to_vec();

        for format in formats.iter().filter(|f| f.needs_assembly()) {
            reporter.begin_stage(StitchStage::Writing, None);
            match format {
                OutputFormat::Tiff => {
                    output
                        .written
                        .extend(write_flat_tiffs(&mosaic, outdir, &config.slide_name)?);
                    if config.export_xml {
                        output.written.push(write_sidecar(
                            outdir,
                            mosaic.channels(),
                            &config.slide_name,
                            mosaic.is_cropped(),
                        )?);
                    }
                }
                OutputFormat::OmeZarr => {
                    output
                        .written
                        .push(write_ome_zarr(&mosaic, outdir, &config.slide_name)?);
                }
                OutputFormat::ReturnArray => output.array = Some(mosaic.to_array()),
                OutputFormat::OmeTiff => {}
            }
            reporter.finish_stage();
        }
        // Releases the mapped pixels and removes the scratch directory.
        drop(mosaic);
    }

    if formats.contains(&OutputFormat::OmeTiff) {
        if !config.crop.is_zero() || config.rescale.mode == RescaleMode::FullImage {
            warn!(
                "The OME-TIFF writer does not support cropping or full-image rescaling; \
                 both are ignored for this output"
            );
        }
        reporter.begin_stage(StitchStage::PyramidalTiff, Some(order.len()));
        output.written.push(write_ome_tiff(
            &plan,
            &order,
            outdir,
            &config.slide_name,
            |done| reporter.advance(done),
        )?);
        reporter.finish_stage();
    }

    info!(
        slide = %config.slide_name,
        files = output.written.len(),
        height = output.output_shape.0,
        width = output.output_shape.1,
        "Stitching complete"
    );
    Ok(output)
}
