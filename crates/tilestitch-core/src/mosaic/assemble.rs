use std::path::Path;

use ndarray::{s, Array2, Array3, ArrayView2, ArrayViewMut2};
use tracing::info;

use crate::align::Alignment;
use crate::consts::CROP_FACTOR;
use crate::error::{Result, StitchError};
use crate::io::reader::TileSource;
use crate::rescale::{rescale_plane, RescalePlan};

use super::buffer::MosaicBuffer;
use super::crop::{CropSpec, CropWindow};

/// A tile source paired with its registered positions.
pub struct MosaicPlan<'a> {
    source: &'a dyn TileSource,
    alignment: &'a Alignment,
}

impl<'a> MosaicPlan<'a> {
    pub fn new(source: &'a dyn TileSource, alignment: &'a Alignment) -> Result<Self> {
        if alignment.positions.len() != source.layout().len() {
            return Err(StitchError::Alignment(format!(
                "{} positions for {} tiles",
                alignment.positions.len(),
                source.layout().len()
            )));
        }
        Ok(Self { source, alignment })
    }

    pub fn source(&self) -> &'a dyn TileSource {
        self.source
    }

    /// Mosaic (height, width).
    pub fn shape(&self) -> (usize, usize) {
        self.alignment.mosaic_shape
    }

    /// Paste every tile of `channel` into `out` at its registered position.
    ///
    /// Positions are rounded to whole pixels; where tiles overlap, the tile
    /// pasted later wins.
    pub fn assemble_channel_into(&self, channel: usize, mut out: ArrayViewMut2<u16>) -> Result<()> {
        let (mh, mw) = out.dim();
        for (tile, pos) in self.alignment.positions.iter().enumerate() {
            let data = self.source.read_tile(tile, channel)?;
            let (th, tw) = data.dim();
            let y0 = pos.y.round().max(0.0) as usize;
            let x0 = pos.x.round().max(0.0) as usize;
            if y0 >= mh || x0 >= mw {
                continue;
            }
            let h = th.min(mh - y0);
            let w = tw.min(mw - x0);
            out.slice_mut(s![y0..y0 + h, x0..x0 + w])
                .assign(&data.slice(s![..h, ..w]));
        }
        Ok(())
    }

    pub fn assemble_channel(&self, channel: usize) -> Result<Array2<u16>> {
        let mut out = Array2::<u16>::zeros(self.shape());
        self.assemble_channel_into(channel, out.view_mut())?;
        Ok(out)
    }
}

/// Assembled, optionally rescaled and cropped, multi-channel mosaic.
///
/// Owns its memory-mapped buffer; dropping it releases the pixels and the
/// scratch directory.
pub struct AssembledMosaic {
    buffer: MosaicBuffer,
    channels: Vec<String>,
    window: CropWindow,
    cropped: bool,
}

impl AssembledMosaic {
    /// Channel names in plane order.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Cropped (channel, height, width).
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.channels.len(), self.window.height(), self.window.width())
    }

    pub fn is_cropped(&self) -> bool {
        self.cropped
    }

    pub fn window(&self) -> CropWindow {
        self.window
    }

    pub fn scratch_dir(&self) -> &Path {
        self.buffer.scratch_dir()
    }

    /// One channel plane, restricted to the crop window.
    pub fn plane(&self, index: usize) -> ArrayView2<'_, u16> {
        let w = self.window;
        self.buffer
            .plane(index)
            .slice_move(s![w.y0..w.y1, w.x0..w.x1])
    }

    /// Copy the cropped mosaic into an owned `(channel, y, x)` array.
    pub fn to_array(&self) -> Array3<u16> {
        let w = self.window;
        self.buffer
            .view()
            .slice(s![.., w.y0..w.y1, w.x0..w.x1])
            .to_owned()
    }

    /// Iterate `(name, plane)` pairs in plane order.
    pub fn planes(&self) -> impl Iterator<Item = (&str, ArrayView2<'_, u16>)> + '_ {
        self.channels
            .iter()
            .enumerate()
            .map(move |(i, name)| (name.as_str(), self.plane(i)))
    }
}

/// Assemble the channels listed in `order`, rescale whole planes where the
/// plan asks for it, then apply one crop window to every plane.
///
/// `on_channel` is called with the number of channels finished.
pub fn assemble(
    plan: &MosaicPlan<'_>,
    order: &[usize],
    rescale: &RescalePlan,
    crop: &CropSpec,
    scratch_parent: &Path,
    mut on_channel: impl FnMut(usize),
) -> Result<AssembledMosaic> {
    let channel_map = plan.source().channel_map();
    let (h, w) = plan.shape();

    // Validate the crop before spending time on assembly.
    let window = if crop.is_zero() {
        CropWindow::full((h, w))
    } else {
        crop.window((h, w), CROP_FACTOR)?
    };

    let mut buffer = MosaicBuffer::create_in(scratch_parent, (order.len(), h, w))?;
    let mut channels = Vec::with_capacity(order.len());

    for (i, &channel) in order.iter().enumerate() {
        let name = channel_map
            .name(channel)
            .ok_or_else(|| StitchError::Config(format!("Channel index {channel} out of range")))?;
        plan.assemble_channel_into(channel, buffer.plane_mut(i))?;

        if let Some(pair) = rescale.full_image_range(channel) {
            info!(channel = name, range = %pair, "Rescaling assembled channel");
            rescale_plane(buffer.plane_mut(i), pair);
        }
        channels.push(name.to_string());
        on_channel(i + 1);
    }

    let cropped = !crop.is_zero();
    if cropped {
        info!(
            crop = %crop,
            height = window.height(),
            width = window.width(),
            "Cropping mosaic"
        );
    }

    Ok(AssembledMosaic {
        buffer,
        channels,
        window,
        cropped,
    })
}
