use tilestitch_core::align::AlignmentMethod;
use tilestitch_core::export::OutputFormat;
use tilestitch_core::pipeline::config::StitchConfig;
use tilestitch_core::pipeline::StitchStage;
use tilestitch_core::rescale::{PercentilePair, RescaleMode, RescaleRange};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[test]
fn test_defaults() {
    let c = StitchConfig::default();
    assert_eq!(c.overlap, 0.1);
    assert_eq!(c.alignment.max_shift, 30.0);
    assert_eq!(c.alignment.stitching_channel, "Alexa488");
    assert_eq!(c.alignment.filter_sigma, 0.0);
    assert_eq!(c.filetypes, vec![OutputFormat::Tiff]);
    assert_eq!(c.rescale.mode, RescaleMode::On);
    assert_eq!(c.rescale.range, RescaleRange::Uniform(PercentilePair::new(1.0, 99.0)));
    assert!(c.export_xml);
    assert!(c.write_tile_positions);
    assert!(c.plot_qc);
    assert!(c.flip_y);
    assert!(!c.flip_x);
    assert!(c.crop.is_zero());
}

#[test]
fn test_minimal_toml_fills_defaults() {
    let c: StitchConfig = toml::from_str(
        r#"
        input_dir = "tiles"
        pattern = "S1_{channel}_r{row:03}_c{col:03}.tif"
        slide_name = "S1"
        output_dir = "out"
        "#,
    )
    .unwrap();
    assert_eq!(c.slide_name, "S1");
    assert_eq!(c.alignment.method, AlignmentMethod::PhaseCorrelation);
    assert_eq!(c.filetypes, vec![OutputFormat::Tiff]);
    assert!(c.validate().is_ok());
}

#[test]
fn test_full_toml() {
    let c: StitchConfig = toml::from_str(
        r#"
        input_dir = "tiles"
        pattern = "S1_{channel}_r{row:03}_c{col:03}.tif"
        slide_name = "S1"
        output_dir = "out"
        overlap = 0.15
        filetypes = [".tif", ".ome.zarr", "return_array"]
        channel_order = ["DAPI", "WGA"]
        export_xml = false
        plot_qc = false

        [alignment]
        method = "nominal"
        stitching_channel = "DAPI"
        max_shift = 12.0

        [rescale]
        mode = "partial"
        range = [0.5, 99.5]
        exclude_channels = ["WGA"]

        [crop]
        top = 2
        left = 1
        "#,
    )
    .unwrap();
    assert_eq!(c.overlap, 0.15);
    assert!(!c.plot_qc);
    assert_eq!(
        c.filetypes,
        vec![OutputFormat::Tiff, OutputFormat::OmeZarr, OutputFormat::ReturnArray]
    );
    assert_eq!(c.alignment.method, AlignmentMethod::Nominal);
    assert_eq!(c.rescale.mode, RescaleMode::Partial);
    assert_eq!(c.rescale.range, RescaleRange::Uniform(PercentilePair::new(0.5, 99.5)));
    assert_eq!(c.crop.top, 2);
    assert_eq!(c.crop.bottom, 0);
    assert!(c.returns_array());
    assert!(c.writes_files());
    assert!(c.validate().is_ok());
}

#[test]
fn test_per_channel_range_toml() {
    let c: StitchConfig = toml::from_str(
        r#"
        input_dir = "tiles"
        pattern = "S1_{channel}_r{row:03}_c{col:03}.tif"
        slide_name = "S1"
        output_dir = "out"

        [rescale]
        mode = "full_image"

        [rescale.range]
        DAPI = [1.0, 99.0]
        WGA = [0.1, 99.9]
        "#,
    )
    .unwrap();
    match c.rescale.range {
        RescaleRange::PerChannel(map) => {
            assert_eq!(map.len(), 2);
            assert_eq!(map["WGA"], PercentilePair::new(0.1, 99.9));
        }
        other => panic!("expected per-channel range, got {other:?}"),
    }
}

#[test]
fn test_default_roundtrips_through_toml() {
    let c = StitchConfig::default();
    let text = toml::to_string_pretty(&c).unwrap();
    let back: StitchConfig = toml::from_str(&text).unwrap();
    assert_eq!(back, c);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn test_partial_without_exclusions_fails_validation() {
    let mut c = StitchConfig::default();
    c.rescale.mode = RescaleMode::Partial;
    assert!(c.validate().is_err());
}

#[test]
fn test_empty_filetypes_fail_validation() {
    let mut c = StitchConfig::default();
    c.filetypes.clear();
    assert!(c.validate().is_err());
}

#[test]
fn test_formats_deduplicated() {
    let mut c = StitchConfig::default();
    c.filetypes = vec![OutputFormat::Tiff, OutputFormat::OmeTiff, OutputFormat::Tiff];
    assert_eq!(c.formats(), vec![OutputFormat::Tiff, OutputFormat::OmeTiff]);
}

#[test]
fn test_return_array_only_writes_nothing() {
    let mut c = StitchConfig::default();
    c.filetypes = vec![OutputFormat::ReturnArray];
    assert!(!c.writes_files());
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

#[test]
fn test_stage_display() {
    assert_eq!(StitchStage::Alignment.to_string(), "Aligning tiles");
    assert_eq!(StitchStage::Assembly.to_string(), "Assembling mosaic");
}

#[test]
fn test_rescale_mode_display() {
    assert_eq!(RescaleMode::FullImage.to_string(), "Full image");
    assert_eq!(RescaleMode::Off.to_string(), "Off");
}
