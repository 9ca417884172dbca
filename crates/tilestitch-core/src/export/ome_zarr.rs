//! Chunked multiscale OME-Zarr (Zarr v3 store, NGFF 0.5 metadata).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{s, ArrayView2};
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use zarrs::array::{Array, ArrayBuilder, ChunkGrid, DataType, FillValue};
use zarrs::filesystem::FilesystemStore;
use zarrs::group::GroupBuilder;

use crate::consts::{CHANNEL_PALETTE, ZARR_CHUNK_SHAPE, ZARR_DOWNSCALE, ZARR_PYRAMID_LEVELS};
use crate::error::{Result, StitchError};
use crate::mosaic::AssembledMosaic;

/// NGFF version written into the group attributes.
pub const NGFF_VERSION: &str = "0.5";

/// `{slide}.ome.zarr`
pub fn zarr_dir_name(slide: &str) -> String {
    format!("{slide}.ome.zarr")
}

/// Display colour for the channel at `index`, cycling through the palette.
pub fn channel_color(index: usize) -> &'static str {
    CHANNEL_PALETTE[index % CHANNEL_PALETTE.len()]
}

fn zarr_error(e: impl std::fmt::Display) -> StitchError {
    StitchError::Zarr(e.to_string())
}

fn level_step(level: usize) -> usize {
    ZARR_DOWNSCALE.pow(level as u32)
}

/// Group attributes: the `ome` block with `multiscales` and `omero`.
fn group_attributes(slide: &str, channels: &[String]) -> Map<String, Value> {
    let datasets: Vec<Value> = (0..ZARR_PYRAMID_LEVELS)
        .map(|level| {
            let step = level_step(level) as f64;
            json!({
                "path": level.to_string(),
                "coordinateTransformations": [
                    { "type": "scale", "scale": [1.0, step, step] }
                ]
            })
        })
        .collect();
    let omero_channels: Vec<Value> = channels
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({
                "label": name,
                "color": channel_color(i),
                "active": true
            })
        })
        .collect();

    let mut attrs = Map::new();
    attrs.insert(
        "ome".into(),
        json!({
            "version": NGFF_VERSION,
            "multiscales": [{
                "name": slide,
                "axes": [
                    { "name": "c", "type": "channel" },
                    { "name": "y", "type": "space" },
                    { "name": "x", "type": "space" }
                ],
                "datasets": datasets
            }],
            "omero": {
                "name": zarr_dir_name(slide),
                "channels": omero_channels
            }
        }),
    );
    attrs
}

/// Create the uncompressed u16 `(c, y, x)` array for one pyramid level.
fn create_level_array(
    store: &Arc<FilesystemStore>,
    level: usize,
    shape: [usize; 3],
) -> Result<Array<FilesystemStore>> {
    let chunk_grid: ChunkGrid = ZARR_CHUNK_SHAPE
        .iter()
        .map(|&n| n as u64)
        .collect::<Vec<u64>>()
        .try_into()
        .map_err(zarr_error)?;
    let array = ArrayBuilder::new(
        shape.iter().map(|&n| n as u64).collect(),
        DataType::UInt16,
        chunk_grid,
        FillValue::from(0u16),
    )
    .bytes_to_bytes_codecs(vec![])
    .dimension_names(["c", "y", "x"].into())
    .build(store.clone(), &format!("/{level}"))
    .map_err(zarr_error)?;
    array.store_metadata().map_err(zarr_error)?;
    Ok(array)
}

/// Store every chunk of one channel plane. Edge chunks are padded with the
/// fill value to the full chunk shape.
fn write_plane_chunks(
    array: &Array<FilesystemStore>,
    channel: usize,
    plane: &ArrayView2<u16>,
) -> Result<usize> {
    let [_, ch, cw] = ZARR_CHUNK_SHAPE;
    let (h, w) = plane.dim();
    let mut chunk = vec![0u16; ch * cw];
    let mut count = 0;

    for cy in 0..h.div_ceil(ch) {
        for cx in 0..w.div_ceil(cw) {
            chunk.fill(0);
            let y0 = cy * ch;
            let x0 = cx * cw;
            let block = plane.slice(s![y0..(y0 + ch).min(h), x0..(x0 + cw).min(w)]);
            for (r, row) in block.rows().into_iter().enumerate() {
                let dst = &mut chunk[r * cw..r * cw + row.len()];
                dst.iter_mut().zip(row.iter()).for_each(|(d, &v)| *d = v);
            }
            array
                .store_chunk_elements::<u16>(&[channel as u64, cy as u64, cx as u64], &chunk)
                .map_err(zarr_error)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Write `mosaic` as `{slide}.ome.zarr` under `outdir`, replacing any
/// existing store of the same name.
///
/// Reduced levels subsample the full-resolution plane by powers of
/// [`ZARR_DOWNSCALE`].
pub fn write_ome_zarr(mosaic: &AssembledMosaic, outdir: &Path, slide: &str) -> Result<PathBuf> {
    let root = outdir.join(zarr_dir_name(slide));
    if root.exists() {
        info!(path = %root.display(), "Output already exists, removing");
        fs::remove_dir_all(&root)?;
    }
    fs::create_dir_all(&root)?;

    let store = Arc::new(FilesystemStore::new(&root).map_err(zarr_error)?);
    let group = GroupBuilder::new()
        .attributes(group_attributes(slide, mosaic.channels()))
        .build(store.clone(), "/")
        .map_err(zarr_error)?;
    group.store_metadata().map_err(zarr_error)?;

    let (c, h, w) = mosaic.shape();
    info!(
        path = %root.display(),
        channels = c,
        height = h,
        width = w,
        levels = ZARR_PYRAMID_LEVELS,
        "Writing OME-Zarr"
    );

    for level in 0..ZARR_PYRAMID_LEVELS {
        let step = level_step(level);
        let array = create_level_array(&store, level, [c, h.div_ceil(step), w.div_ceil(step)])?;

        let mut chunks = 0;
        for i in 0..c {
            let plane = mosaic.plane(i);
            let level_plane = plane.slice(s![..;step as isize, ..;step as isize]);
            chunks += write_plane_chunks(&array, i, &level_plane)?;
        }
        debug!(level, chunks, "Wrote pyramid level");
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_cycles() {
        assert_eq!(channel_color(0), CHANNEL_PALETTE[0]);
        assert_eq!(channel_color(CHANNEL_PALETTE.len() + 2), CHANNEL_PALETTE[2]);
    }

    #[test]
    fn test_attrs_shape() {
        let attrs = group_attributes("S1", &["DAPI".to_string()]);
        let ome = &attrs["ome"];
        assert_eq!(ome["version"], NGFF_VERSION);
        assert_eq!(ome["omero"]["name"], "S1.ome.zarr");
        assert_eq!(ome["omero"]["channels"][0]["label"], "DAPI");
        assert_eq!(
            ome["multiscales"][0]["datasets"].as_array().unwrap().len(),
            ZARR_PYRAMID_LEVELS
        );
        assert_eq!(
            ome["multiscales"][0]["datasets"][2]["coordinateTransformations"][0]["scale"],
            json!([1.0, 4.0, 4.0])
        );
    }

    #[test]
    fn test_chunks_are_padded() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FilesystemStore::new(dir.path()).unwrap());
        let array = create_level_array(&store, 0, [1, 3, 5]).unwrap();
        let plane = ndarray::Array2::<u16>::from_elem((3, 5), 7);

        let n = write_plane_chunks(&array, 0, &plane.view()).unwrap();
        assert_eq!(n, 1);

        let [_, ch, cw] = ZARR_CHUNK_SHAPE;
        let chunk = array.retrieve_chunk_elements::<u16>(&[0, 0, 0]).unwrap();
        assert_eq!(chunk.len(), ch * cw);
        assert_eq!(chunk[0], 7);
        assert_eq!(chunk[4], 7);
        assert_eq!(chunk[5], 0);
        assert_eq!(chunk[cw], 7);
        assert_eq!(chunk[3 * cw], 0);
    }
}
