//! Down-scaled overview of a tile set, built from nominal stage positions.

use std::path::{Path, PathBuf};

use ndarray::{s, Array2, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consts::{EXAMPLE_TILE_COUNT, THUMBNAIL_SCALE};
use crate::error::{Result, StitchError};
use crate::io::image_io::{resize_gray16, save_gray16_tiff};
use crate::io::reader::{flip_axes, FilePatternReader, RescaleReader, TileSource};
use crate::rescale::{rescale_intensity, PercentilePair, RescaleConfig, RescaleMode, RescaleRange};
use crate::tile::mosaic_extent;

/// Directory, under the output directory, receiving example tiles.
pub const EXAMPLES_DIR: &str = "example_images";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub input_dir: PathBuf,
    pub pattern: String,
    pub output_dir: PathBuf,
    /// Slide name used as the output file prefix.
    pub name: String,
    pub overlap: f64,
    pub stitching_channel: String,
    /// Rescale tiles before they are reduced.
    pub rescale: bool,
    pub rescale_range: PercentilePair,
    pub scale: f64,
    pub flip_y: bool,
    pub export_examples: bool,
    /// Fixed seed for the example sample. Random when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            pattern: String::new(),
            output_dir: PathBuf::from("."),
            name: "slide".into(),
            overlap: 0.1,
            stitching_channel: "DAPI".into(),
            rescale: true,
            rescale_range: PercentilePair::default(),
            scale: THUMBNAIL_SCALE,
            flip_y: true,
            export_examples: false,
            seed: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ThumbnailOutput {
    pub thumbnail: PathBuf,
    pub shape: (usize, usize),
    pub examples: Vec<PathBuf>,
}

/// `{name}_thumbnail_{channel}.tif`
pub fn thumbnail_file_name(name: &str, channel: &str) -> String {
    format!("{name}_thumbnail_{channel}.tif")
}

/// Reduce every tile of `channel` by `scale` and place it at its scaled
/// nominal position. Overlapping pixels keep the brighter value.
pub fn make_thumbnail(source: &dyn TileSource, channel: usize, scale: f64) -> Result<Array2<u16>> {
    if !(scale > 0.0 && scale <= 1.0) {
        return Err(StitchError::Config(format!(
            "Thumbnail scale must be in (0, 1], got {scale}"
        )));
    }
    let layout = source.layout();
    let (mh, mw) = mosaic_extent(&layout.positions, layout.tile_shape);
    let out_h = ((mh as f64 * scale).ceil() as usize).max(1);
    let out_w = ((mw as f64 * scale).ceil() as usize).max(1);
    let (th, tw) = layout.tile_shape;
    let tile_h = ((th as f64 * scale).round() as usize).max(1);
    let tile_w = ((tw as f64 * scale).round() as usize).max(1);

    let mut out = Array2::<u16>::zeros((out_h, out_w));
    for (tile, pos) in layout.positions.iter().enumerate() {
        let data = source.read_tile(tile, channel)?;
        let small = resize_gray16(&data.view(), tile_h, tile_w)?;
        let y0 = (pos.y * scale).round().max(0.0) as usize;
        let x0 = (pos.x * scale).round().max(0.0) as usize;
        if y0 >= out_h || x0 >= out_w {
            continue;
        }
        let h = tile_h.min(out_h - y0);
        let w = tile_w.min(out_w - x0);
        Zip::from(out.slice_mut(s![y0..y0 + h, x0..x0 + w]))
            .and(small.slice(s![..h, ..w]))
            .for_each(|o, &v| *o = (*o).max(v));
    }
    Ok(out)
}

/// Write the thumbnail of the stitching channel and, if asked, a random
/// sample of physical tiles across every channel for rescale QC.
pub fn generate_thumbnail(config: &ThumbnailConfig) -> Result<ThumbnailOutput> {
    config.rescale_range.validate()?;
    let mut reader = FilePatternReader::open(&config.input_dir, &config.pattern, config.overlap)?;
    flip_axes(reader.layout_mut(), false, config.flip_y);

    let rescale = RescaleConfig {
        mode: if config.rescale {
            RescaleMode::On
        } else {
            RescaleMode::Off
        },
        range: RescaleRange::Uniform(config.rescale_range),
        exclude_channels: None,
    };
    let plan = rescale.resolve(reader.channel_map())?;
    let source = RescaleReader::new(reader, plan);

    let channel = source.channel_map().index_of(&config.stitching_channel)?;
    let thumb = make_thumbnail(&source, channel, config.scale)?;

    std::fs::create_dir_all(&config.output_dir)?;
    let path = config
        .output_dir
        .join(thumbnail_file_name(&config.name, &config.stitching_channel));
    save_gray16_tiff(&thumb.view(), &path)?;
    info!(
        path = %path.display(),
        height = thumb.nrows(),
        width = thumb.ncols(),
        "Thumbnail written"
    );

    let examples = if config.export_examples {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        export_examples(
            source.inner(),
            &config.output_dir.join(EXAMPLES_DIR),
            config.rescale_range,
            &mut rng,
        )?
    } else {
        Vec::new()
    };

    Ok(ThumbnailOutput {
        thumbnail: path,
        shape: thumb.dim(),
        examples,
    })
}

/// Sample up to [`EXAMPLE_TILE_COUNT`] tiles and write every channel of each,
/// rescaled with `range`, under the tile's own file name.
pub fn export_examples(
    reader: &FilePatternReader,
    outdir: &Path,
    range: PercentilePair,
    rng: &mut StdRng,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(outdir)?;
    let n = reader.layout().len();
    let picked = rand::seq::index::sample(rng, n, n.min(EXAMPLE_TILE_COUNT)).into_vec();

    let mut written = Vec::with_capacity(picked.len() * reader.channel_map().len());
    for (channel, name) in reader.channel_map().names().iter().enumerate() {
        for &tile in &picked {
            let coord = reader.layout().coords[tile];
            let file = reader
                .pattern()
                .format(coord.row, coord.col, name, reader.zstack());
            let data = reader.read_tile(tile, channel)?;
            let path = outdir.join(file);
            save_gray16_tiff(&rescale_intensity(&data.view(), range).view(), &path)?;
            written.push(path);
        }
    }
    info!(
        tiles = picked.len(),
        files = written.len(),
        dir = %outdir.display(),
        "Example tiles exported"
    );
    Ok(written)
}
