mod common;

use std::fs::File;

use tiff::decoder::Decoder;
use tiff::tags::Tag;

use tilestitch_core::align::{AlignParams, Aligner, Alignment, NominalAligner};
use tilestitch_core::export::flat_tiff::{channel_file_name, write_flat_tiffs};
use tilestitch_core::export::ome_tiff::write_ome_tiff;
use tilestitch_core::export::positions::{read_positions, write_positions};
use tilestitch_core::export::sidecar::{render_sidecar, write_sidecar};
use tilestitch_core::io::image_io::load_gray16;
use tilestitch_core::io::reader::FilePatternReader;
use tilestitch_core::mosaic::{assemble, AssembledMosaic, CropSpec, MosaicPlan};
use tilestitch_core::rescale::RescalePlan;
use tilestitch_core::tile::TilePosition;

use common::{write_regular_tile_set, TileSet, PATTERN};

fn nominal(set: &TileSet) -> (FilePatternReader, Alignment) {
    let reader = FilePatternReader::open(set.path(), PATTERN, 0.5).unwrap();
    let params = AlignParams {
        channel: 0,
        max_shift: 30.0,
        filter_sigma: 0.0,
    };
    let alignment = NominalAligner.align(&reader, &params).unwrap();
    (reader, alignment)
}

fn build_mosaic(set: &TileSet, crop: CropSpec, scratch: &std::path::Path) -> AssembledMosaic {
    let (reader, alignment) = nominal(set);
    let plan = MosaicPlan::new(&reader, &alignment).unwrap();
    let n = set.channels.len();
    let order: Vec<usize> = (0..n).collect();
    assemble(&plan, &order, &RescalePlan::disabled(n), &crop, scratch, |_| {}).unwrap()
}

#[test]
fn test_sidecar_document() {
    let xml = render_sidecar(&["DAPI".to_string(), "Alexa488".to_string()], "S1", false);
    let expected = [
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        r#"<BIAS version="1.0">"#,
        r#"    <channels>"#,
        r#"        <channel id="1">"#,
        r#"            <name>DAPI</name>"#,
        r#"        </channel>"#,
        r#"        <channel id="2">"#,
        r#"            <name>Alexa488</name>"#,
        r#"        </channel>"#,
        r#"    </channels>"#,
        r#"    <images>"#,
        r#"        <image url="S1_DAPI.tif">"#,
        r#"            <channel>1</channel>"#,
        r#"        </image>"#,
        r#"        <image url="S1_Alexa488.tif">"#,
        r#"            <channel>2</channel>"#,
        r#"        </image>"#,
        r#"    </images>"#,
        r#"</BIAS>"#,
    ]
    .join("\r\n");
    assert_eq!(xml, expected);
}

#[test]
fn test_sidecar_uses_cropped_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_sidecar(dir.path(), &["DAPI".to_string()], "S1", true).unwrap();
    assert_eq!(path.file_name().unwrap(), "S1.XML");
    let xml = std::fs::read_to_string(&path).unwrap();
    assert!(xml.contains(r#"url="S1_DAPI_cropped.tif""#));
    assert_eq!(xml.matches('\n').count(), xml.matches("\r\n").count());
}

#[test]
fn test_channel_file_names() {
    assert_eq!(channel_file_name("S1", "DAPI", false), "S1_DAPI.tif");
    assert_eq!(channel_file_name("S1", "DAPI", true), "S1_DAPI_cropped.tif");
}

#[test]
fn test_flat_tiffs_follow_crop_state() {
    let set = write_regular_tile_set(2, 2, (32, 32), &["DAPI", "Alexa488"]);
    let out = tempfile::tempdir().unwrap();

    let full = build_mosaic(&set, CropSpec::default(), out.path());
    let written = write_flat_tiffs(&full, out.path(), "S1").unwrap();
    assert_eq!(written.len(), 2);
    for path in &written {
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(!name.contains("_cropped"), "{name}");
    }
    let loaded = load_gray16(&written[0]).unwrap();
    assert_eq!(loaded, full.plane(0));
    drop(full);

    let crop = CropSpec {
        top: 1,
        ..Default::default()
    };
    let cropped = build_mosaic(&set, crop, out.path());
    let written = write_flat_tiffs(&cropped, out.path(), "S1").unwrap();
    for path in &written {
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_cropped.tif"), "{name}");
        assert_eq!(load_gray16(path).unwrap().dim(), (28, 48));
    }
}

#[test]
fn test_positions_table() {
    let dir = tempfile::tempdir().unwrap();
    let positions = vec![
        TilePosition { y: 0.0, x: 0.0 },
        TilePosition { y: 12.5, x: 900.25 },
    ];
    let path = write_positions(dir.path(), "S1", &positions).unwrap();
    assert_eq!(path.file_name().unwrap(), "S1_tile_positions.tsv");

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.lines().all(|l| l.split('\t').count() == 2));
    assert_eq!(read_positions(&path).unwrap(), positions);
}

#[test]
fn test_ome_tiff_pages() {
    let set = write_regular_tile_set(2, 2, (32, 32), &["DAPI", "Alexa488"]);
    let (reader, alignment) = nominal(&set);
    let plan = MosaicPlan::new(&reader, &alignment).unwrap();
    let out = tempfile::tempdir().unwrap();

    let path = write_ome_tiff(&plan, &[1, 0], out.path(), "S1", |_| {}).unwrap();
    assert_eq!(path.file_name().unwrap(), "S1.ome.tiff");

    let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
    let description = decoder.get_tag_ascii_string(Tag::ImageDescription).unwrap();
    assert!(description.contains(r#"SizeC="2""#));
    assert!(description.find("DAPI").unwrap() < description.find("Alexa488").unwrap());

    let mut pages = 1;
    assert_eq!(decoder.dimensions().unwrap(), (48, 48));
    while decoder.more_images() {
        decoder.next_image().unwrap();
        pages += 1;
    }
    assert_eq!(pages, 2);
}

#[test]
fn test_ome_tiff_pyramid_levels() {
    let set = write_regular_tile_set(1, 1, (40, 1100), &["DAPI"]);
    let (reader, alignment) = nominal(&set);
    let plan = MosaicPlan::new(&reader, &alignment).unwrap();
    let out = tempfile::tempdir().unwrap();

    let path = write_ome_tiff(&plan, &[0], out.path(), "S1", |_| {}).unwrap();
    let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
    let mut dims = vec![decoder.dimensions().unwrap()];
    while decoder.more_images() {
        decoder.next_image().unwrap();
        dims.push(decoder.dimensions().unwrap());
    }
    assert_eq!(dims, vec![(1100, 40), (220, 8)]);

    let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
    let description = decoder.get_tag_ascii_string(Tag::ImageDescription).unwrap();
    assert!(description.contains(r#"<Image ID="Image:1" Name="S1 level 1">"#));
    assert!(description.contains(r#"SizeX="220" SizeY="8""#));
    assert!(description.contains(r#"<TiffData IFD="1" PlaneCount="1"/>"#));
}

#[test]
fn test_ome_tiff_is_bigtiff() {
    let set = write_regular_tile_set(1, 2, (32, 32), &["DAPI"]);
    let (reader, alignment) = nominal(&set);
    let plan = MosaicPlan::new(&reader, &alignment).unwrap();
    let out = tempfile::tempdir().unwrap();

    let path = write_ome_tiff(&plan, &[0], out.path(), "S1", |_| {}).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    // little-endian byte order mark followed by version 43
    assert_eq!(&bytes[..4], &[b'I', b'I', 43, 0]);
}
