use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::io::image_io::save_gray16_tiff;
use crate::mosaic::AssembledMosaic;

/// Marker appended to file names of cropped output.
pub const CROP_MARKER: &str = "_cropped";

/// `{slide}_{channel}[_cropped].tif`
pub fn channel_file_name(slide: &str, channel: &str, cropped: bool) -> String {
    let marker = if cropped { CROP_MARKER } else { "" };
    format!("{slide}_{channel}{marker}.tif")
}

/// Write each channel plane of `mosaic` as its own 16-bit TIFF.
pub fn write_flat_tiffs(mosaic: &AssembledMosaic, outdir: &Path, slide: &str) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(mosaic.channels().len());
    for (channel, plane) in mosaic.planes() {
        let path = outdir.join(channel_file_name(slide, channel, mosaic.is_cropped()));
        info!(channel, path = %path.display(), "Writing channel TIFF");
        save_gray16_tiff(&plane, &path)?;
        written.push(path);
    }
    Ok(written)
}
