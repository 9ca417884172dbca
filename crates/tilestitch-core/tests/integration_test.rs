//! End-to-end stitching runs over synthetic tile sets.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ndarray::s;

use tilestitch_core::align::AlignmentMethod;
use tilestitch_core::error::StitchError;
use tilestitch_core::export::OutputFormat;
use tilestitch_core::io::image_io::load_gray16;
use tilestitch_core::mosaic::CropSpec;
use tilestitch_core::pipeline::config::StitchConfig;
use tilestitch_core::pipeline::{run_stitch, run_stitch_reported, ProgressReporter, StitchStage};
use tilestitch_core::rescale::RescaleMode;

use common::{write_regular_tile_set, write_tile_set, TileSet, PATTERN};

fn config_for(set: &TileSet, out: &std::path::Path) -> StitchConfig {
    let mut c = StitchConfig {
        input_dir: set.path().to_path_buf(),
        pattern: PATTERN.to_string(),
        slide_name: "S1".into(),
        output_dir: out.to_path_buf(),
        overlap: 0.5,
        flip_y: false,
        ..Default::default()
    };
    c.alignment.stitching_channel = "DAPI".into();
    c.rescale.mode = RescaleMode::Off;
    c
}

#[derive(Default)]
struct RecordingReporter {
    stages: Mutex<Vec<StitchStage>>,
    advances: AtomicUsize,
}

impl ProgressReporter for RecordingReporter {
    fn begin_stage(&self, stage: StitchStage, _total_items: Option<usize>) {
        self.stages.lock().unwrap().push(stage);
    }

    fn advance(&self, _items_done: usize) {
        self.advances.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_stitch_writes_tiffs_sidecar_and_positions() {
    let set = write_tile_set(2, 2, (64, 64), 0.5, &["DAPI", "Alexa488"], |r, c| (r * 2, c));
    let out = tempfile::tempdir().unwrap();
    let config = config_for(&set, out.path());

    let output = run_stitch(&config).unwrap();
    assert_eq!(output.failed_total, 0);
    assert!(!output.cropped);
    assert_eq!(output.channels, vec!["Alexa488", "DAPI"]);

    for name in ["S1_Alexa488.tif", "S1_DAPI.tif", "S1.XML", "S1_tile_positions.tsv"] {
        assert!(out.path().join(name).exists(), "{name} missing");
    }
    let positions = std::fs::read_to_string(out.path().join("S1_tile_positions.tsv")).unwrap();
    assert_eq!(positions.lines().count(), 4);

    // Only outputs remain; the scratch buffer directory is gone.
    let leftovers: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".tilestitch-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_registration_writes_qc_plots() {
    let set = write_tile_set(2, 2, (64, 64), 0.5, &["DAPI"], |r, c| (r * 2, c));
    let out = tempfile::tempdir().unwrap();
    let config = config_for(&set, out.path());

    let output = run_stitch(&config).unwrap();
    for name in ["S1_edge_scatter.png", "S1_edge_quality.png"] {
        let path = out.path().join(name);
        assert!(output.written.contains(&path), "{name} not reported");
        let plot = image::open(&path).unwrap();
        assert!(plot.width() > 0 && plot.height() > 0);
    }
    let scatter = image::open(out.path().join("S1_edge_scatter.png")).unwrap();
    assert_eq!((scatter.width(), scatter.height()), (800, 600));
}

#[test]
fn test_qc_plots_can_be_disabled() {
    let set = write_tile_set(2, 2, (64, 64), 0.5, &["DAPI"], |r, c| (r * 2, c));
    let out = tempfile::tempdir().unwrap();
    let mut config = config_for(&set, out.path());
    config.plot_qc = false;

    run_stitch(&config).unwrap();
    assert!(!out.path().join("S1_edge_scatter.png").exists());
    assert!(!out.path().join("S1_edge_quality.png").exists());
}

#[test]
fn test_nominal_run_has_no_qc_plots() {
    let set = write_regular_tile_set(2, 2, (32, 32), &["DAPI"]);
    let out = tempfile::tempdir().unwrap();
    let mut config = config_for(&set, out.path());
    config.alignment.method = AlignmentMethod::Nominal;

    run_stitch(&config).unwrap();
    assert!(!out.path().join("S1_edge_scatter.png").exists());
}

#[test]
fn test_stitched_mosaic_matches_scene() {
    let set = write_regular_tile_set(2, 3, (32, 32), &["DAPI"]);
    let out = tempfile::tempdir().unwrap();
    let mut config = config_for(&set, out.path());
    config.alignment.method = AlignmentMethod::Nominal;

    run_stitch(&config).unwrap();
    let mosaic = load_gray16(&out.path().join("S1_DAPI.tif")).unwrap();
    assert_eq!(mosaic.dim(), (48, 64));
    assert_eq!(mosaic, set.scenes[0].slice(s![..48, ..64]));
}

#[test]
fn test_return_array_skips_positions() {
    let set = write_regular_tile_set(2, 2, (32, 32), &["DAPI", "Alexa488", "WGA"]);
    let out = tempfile::tempdir().unwrap();
    let mut config = config_for(&set, out.path().join("never").as_path());
    config.filetypes = vec![OutputFormat::ReturnArray];
    config.channel_order = Some(vec!["WGA".into(), "DAPI".into()]);
    config.scratch_dir = Some(out.path().to_path_buf());

    let output = run_stitch(&config).unwrap();
    let array = output.array.unwrap();
    assert_eq!(array.dim(), (2, 48, 48));
    assert_eq!(output.channels, vec!["WGA", "DAPI"]);
    assert!(output.written.is_empty());
    assert!(!out.path().join("never").exists());
}

#[test]
fn test_cropped_run_names_outputs() {
    let set = write_regular_tile_set(2, 2, (32, 32), &["DAPI"]);
    let out = tempfile::tempdir().unwrap();
    let mut config = config_for(&set, out.path());
    config.alignment.method = AlignmentMethod::Nominal;
    config.crop = CropSpec {
        top: 1,
        bottom: 0,
        left: 0,
        right: 1,
    };

    let output = run_stitch(&config).unwrap();
    assert!(output.cropped);
    assert_eq!(output.output_shape, (28, 28));
    assert!(out.path().join("S1_DAPI_cropped.tif").exists());
    assert!(!out.path().join("S1_DAPI.tif").exists());
    let xml = std::fs::read_to_string(out.path().join("S1.XML")).unwrap();
    assert!(xml.contains("S1_DAPI_cropped.tif"));
}

#[test]
fn test_all_selected_formats_are_written() {
    let set = write_regular_tile_set(2, 2, (32, 32), &["DAPI", "Alexa488"]);
    let out = tempfile::tempdir().unwrap();
    let mut config = config_for(&set, out.path());
    config.filetypes = vec![OutputFormat::Tiff, OutputFormat::OmeZarr, OutputFormat::OmeTiff];
    config.export_xml = false;
    config.write_tile_positions = false;
    config.plot_qc = false;

    let reporter = Arc::new(RecordingReporter::default());
    let output = run_stitch_reported(&config, reporter.clone()).unwrap();

    assert!(out.path().join("S1_DAPI.tif").exists());
    assert!(out.path().join("S1.ome.zarr").join("zarr.json").exists());
    assert!(out.path().join("S1.ome.tiff").exists());
    assert!(!out.path().join("S1.XML").exists());
    assert!(!out.path().join("S1_tile_positions.tsv").exists());
    assert_eq!(output.written.len(), 4);

    let stages = reporter.stages.lock().unwrap().clone();
    assert_eq!(stages.first(), Some(&StitchStage::Reading));
    assert!(stages.contains(&StitchStage::Assembly));
    assert_eq!(stages.last(), Some(&StitchStage::PyramidalTiff));
    // Two channels assembled, two written to the OME-TIFF.
    assert_eq!(reporter.advances.load(Ordering::Relaxed), 4);
}

#[test]
fn test_partial_rescale_without_exclusions_fails_before_reading() {
    let out = tempfile::tempdir().unwrap();
    let mut config = StitchConfig {
        input_dir: out.path().join("does-not-exist"),
        output_dir: out.path().join("out"),
        ..Default::default()
    };
    config.rescale.mode = RescaleMode::Partial;

    let err = run_stitch(&config).err().unwrap();
    assert!(matches!(err, StitchError::Config(_)));
    assert!(!out.path().join("out").exists());
}

#[test]
fn test_unknown_stitching_channel() {
    let set = write_regular_tile_set(1, 2, (32, 32), &["DAPI"]);
    let out = tempfile::tempdir().unwrap();
    let mut config = config_for(&set, out.path());
    config.alignment.stitching_channel = "Alexa488".into();

    let err = run_stitch(&config).err().unwrap();
    assert!(matches!(err, StitchError::UnknownChannel { .. }));
}

#[test]
fn test_unknown_channel_in_order() {
    let set = write_regular_tile_set(1, 2, (32, 32), &["DAPI"]);
    let out = tempfile::tempdir().unwrap();
    let mut config = config_for(&set, out.path());
    config.channel_order = Some(vec!["DAPI".into(), "Cy5".into()]);

    let err = run_stitch(&config).err().unwrap();
    assert!(matches!(err, StitchError::UnknownChannel { .. }));
}

#[test]
fn test_per_tile_rescale_spreads_range() {
    let set = write_regular_tile_set(2, 2, (32, 32), &["DAPI"]);
    let out = tempfile::tempdir().unwrap();
    let mut config = config_for(&set, out.path());
    config.rescale.mode = RescaleMode::On;
    config.filetypes = vec![OutputFormat::ReturnArray];

    let array = run_stitch(&config).unwrap().array.unwrap();
    assert_eq!(array.iter().copied().max(), Some(u16::MAX));
    assert_eq!(array.iter().copied().min(), Some(0));
}
