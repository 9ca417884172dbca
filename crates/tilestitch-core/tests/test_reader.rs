mod common;

use ndarray::Array2;

use tilestitch_core::error::StitchError;
use tilestitch_core::io::image_io::save_gray16_tiff;
use tilestitch_core::io::reader::{flip_axes, FilePatternReader, RescaleReader, TileSource};
use tilestitch_core::rescale::{PercentilePair, RescaleConfig, RescaleMode, RescaleRange};
use tilestitch_core::tile::GridCoord;

use common::{write_regular_tile_set, PATTERN};

#[test]
fn test_channel_map_sorted_and_grid_discovered() {
    let set = write_regular_tile_set(2, 3, (32, 40), &["DAPI", "Alexa488"]);
    let reader = FilePatternReader::open(set.path(), PATTERN, 0.5).unwrap();

    assert_eq!(reader.channel_map().names(), &["Alexa488", "DAPI"]);
    assert_eq!(reader.layout().grid_shape(), (2, 3));
    assert_eq!(reader.layout().len(), 6);
    assert_eq!(reader.layout().tile_shape, (32, 40));
    assert_eq!(reader.zstack(), None);
}

#[test]
fn test_nominal_positions_follow_overlap() {
    let set = write_regular_tile_set(2, 2, (32, 40), &["DAPI"]);
    let reader = FilePatternReader::open(set.path(), PATTERN, 0.5).unwrap();
    let layout = reader.layout();

    let t = layout.find(GridCoord { row: 1, col: 1 }).unwrap();
    assert_eq!(layout.positions[t].y, 16.0);
    assert_eq!(layout.positions[t].x, 20.0);
}

#[test]
fn test_read_tile_returns_pixels() {
    let set = write_regular_tile_set(2, 2, (16, 16), &["DAPI"]);
    let reader = FilePatternReader::open(set.path(), PATTERN, 0.5).unwrap();
    let t = reader.layout().find(GridCoord { row: 1, col: 0 }).unwrap();

    let data = reader.read_tile(t, 0).unwrap();
    assert_eq!(data, set.tile_data(1, 0, 0));
}

#[test]
fn test_missing_tile_is_reported() {
    let set = write_regular_tile_set(2, 2, (16, 16), &["DAPI", "Alexa488"]);
    std::fs::remove_file(set.tile_file(1, 1, "DAPI")).unwrap();

    let err = FilePatternReader::open(set.path(), PATTERN, 0.5).err().unwrap();
    match err {
        StitchError::MissingTile { row, col, channel } => {
            assert_eq!((row, col), (1, 1));
            assert_eq!(channel, "DAPI");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_tile_shape_mismatch() {
    let set = write_regular_tile_set(1, 2, (16, 16), &["DAPI"]);
    let odd = Array2::<u16>::zeros((16, 12));
    save_gray16_tiff(&odd.view(), &set.tile_file(0, 1, "DAPI")).unwrap();

    let err = FilePatternReader::open(set.path(), PATTERN, 0.5).err().unwrap();
    assert!(matches!(err, StitchError::TileShapeMismatch { .. }));
}

#[test]
fn test_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    let err = FilePatternReader::open(dir.path(), PATTERN, 0.1).err().unwrap();
    assert!(matches!(err, StitchError::EmptyTileSet { .. }));
}

#[test]
fn test_invalid_overlap() {
    let set = write_regular_tile_set(1, 1, (16, 16), &["DAPI"]);
    assert!(FilePatternReader::open(set.path(), PATTERN, 1.0).is_err());
}

#[test]
fn test_unrelated_files_ignored() {
    let set = write_regular_tile_set(1, 2, (16, 16), &["DAPI"]);
    std::fs::write(set.path().join("notes.txt"), "x").unwrap();
    std::fs::write(set.path().join("S2_DAPI_r000_c000.tif"), "x").unwrap();

    let reader = FilePatternReader::open(set.path(), PATTERN, 0.5).unwrap();
    assert_eq!(reader.layout().len(), 2);
}

#[test]
fn test_flip_y_mirrors_rows() {
    let set = write_regular_tile_set(2, 2, (16, 16), &["DAPI"]);
    let mut reader = FilePatternReader::open(set.path(), PATTERN, 0.5).unwrap();
    flip_axes(reader.layout_mut(), false, true);
    let layout = reader.layout();

    let top = layout.find(GridCoord { row: 0, col: 1 }).unwrap();
    let bottom = layout.find(GridCoord { row: 1, col: 1 }).unwrap();
    assert_eq!(layout.positions[top].y, 8.0);
    assert_eq!(layout.positions[bottom].y, 0.0);
    assert_eq!(layout.positions[top].x, 8.0);
}

#[test]
fn test_partial_rescale_leaves_excluded_channel() {
    let set = write_regular_tile_set(1, 1, (32, 32), &["DAPI", "WGA"]);
    let reader = FilePatternReader::open(set.path(), PATTERN, 0.1).unwrap();
    let config = RescaleConfig {
        mode: RescaleMode::Partial,
        range: RescaleRange::Uniform(PercentilePair::new(1.0, 99.0)),
        exclude_channels: Some(vec!["WGA".into()]),
    };
    let plan = config.resolve(reader.channel_map()).unwrap();
    let dapi = reader.channel_map().index_of("DAPI").unwrap();
    let wga = reader.channel_map().index_of("WGA").unwrap();
    let source = RescaleReader::new(reader, plan);

    assert_eq!(source.read_tile(0, wga).unwrap(), set.tile_data(0, 0, 1));

    let rescaled = source.read_tile(0, dapi).unwrap();
    assert_eq!(rescaled.iter().copied().max(), Some(u16::MAX));
    assert_eq!(rescaled.iter().copied().min(), Some(0));
}
