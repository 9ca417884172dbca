//! Multi-resolution BigTIFF OME-TIFF written directly from registered tiles.
//!
//! Page layout: every channel at full resolution first (pages `0..C`), then
//! each reduced level in the same channel order, so level `k` occupies pages
//! `k*C..(k+1)*C`. Page 0 carries the OME-XML, which declares one `Image` per
//! level with a `TiffData` block pointing at that level's first page.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use tiff::encoder::{colortype, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tracing::{debug, info};

use crate::consts::{OME_TIFF_DOWNSCALE, OME_TIFF_PEAK_SIZE, OME_TIFF_ROWS_PER_STRIP};
use crate::error::{Result, StitchError};
use crate::mosaic::MosaicPlan;

use super::sidecar::escape_xml;

/// `{slide}.ome.tiff`
pub fn ome_tiff_file_name(slide: &str) -> String {
    format!("{slide}.ome.tiff")
}

/// Reduce `plane` by `factor` in both axes, averaging each block.
///
/// Edge blocks that fall short of `factor` average over the pixels they have.
pub fn downscale_mean(plane: &ArrayView2<u16>, factor: usize) -> Array2<u16> {
    let (h, w) = plane.dim();
    let factor = factor.max(1);
    let oh = h.div_ceil(factor);
    let ow = w.div_ceil(factor);
    Array2::from_shape_fn((oh, ow), |(oy, ox)| {
        let y0 = oy * factor;
        let x0 = ox * factor;
        let y1 = (y0 + factor).min(h);
        let x1 = (x0 + factor).min(w);
        let mut sum = 0u64;
        for y in y0..y1 {
            for x in x0..x1 {
                sum += plane[[y, x]] as u64;
            }
        }
        let count = ((y1 - y0) * (x1 - x0)) as u64;
        ((sum + count / 2) / count) as u16
    })
}

/// Shapes of every pyramid level, full resolution first.
///
/// Levels shrink by `downscale` until the larger side fits within `peak`.
pub fn pyramid_shapes(shape: (usize, usize), downscale: usize, peak: usize) -> Vec<(usize, usize)> {
    let mut shapes = vec![shape];
    let (mut h, mut w) = shape;
    while h.max(w) > peak && downscale > 1 {
        h = h.div_ceil(downscale);
        w = w.div_ceil(downscale);
        shapes.push((h, w));
    }
    shapes
}

fn ome_xml(slide: &str, channels: &[String], shapes: &[(usize, usize)]) -> String {
    let c = channels.len();
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push_str(
        r#"<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://www.openmicroscopy.org/Schemas/OME/2016-06 http://www.openmicroscopy.org/Schemas/OME/2016-06/ome.xsd">"#,
    );
    for (level, &(h, w)) in shapes.iter().enumerate() {
        let name = if level == 0 {
            escape_xml(slide)
        } else {
            format!("{} level {level}", escape_xml(slide))
        };
        xml.push_str(&format!(r#"<Image ID="Image:{level}" Name="{name}">"#));
        xml.push_str(&format!(
            r#"<Pixels ID="Pixels:{level}" DimensionOrder="XYCZT" Type="uint16" SizeX="{w}" SizeY="{h}" SizeC="{c}" SizeZ="1" SizeT="1">"#,
        ));
        for (i, channel) in channels.iter().enumerate() {
            xml.push_str(&format!(
                r#"<Channel ID="Channel:{level}:{i}" Name="{}" SamplesPerPixel="1"><LightPath/></Channel>"#,
                escape_xml(channel)
            ));
        }
        xml.push_str(&format!(
            r#"<TiffData IFD="{}" PlaneCount="{c}"/>"#,
            level * c
        ));
        xml.push_str("</Pixels></Image>");
    }
    xml.push_str("</OME>");
    xml
}

fn write_page<W: std::io::Write + std::io::Seek, K: TiffKind>(
    encoder: &mut TiffEncoder<W, K>,
    plane: &ArrayView2<u16>,
    description: Option<&str>,
) -> Result<()> {
    let (h, w) = plane.dim();
    let width = u32::try_from(w).map_err(|_| StitchError::Config(format!("Width {w} exceeds TIFF limits")))?;
    let height = u32::try_from(h).map_err(|_| StitchError::Config(format!("Height {h} exceeds TIFF limits")))?;

    let mut image = encoder.new_image::<colortype::Gray16>(width, height)?;
    if let Some(desc) = description {
        image.encoder().write_tag(Tag::ImageDescription, desc)?;
    }
    image.rows_per_strip(OME_TIFF_ROWS_PER_STRIP)?;

    let pixels: Vec<u16> = match plane.as_slice() {
        Some(s) => s.to_vec(),
        None => plane.iter().copied().collect(),
    };
    image.write_data(&pixels)?;
    Ok(())
}

/// Assemble each channel in `order` from `plan` and write a pyramidal OME-TIFF.
///
/// Only one full-resolution plane is held in memory at a time; reduced levels
/// are kept until all full-resolution pages are written.
pub fn write_ome_tiff(
    plan: &MosaicPlan<'_>,
    order: &[usize],
    outdir: &Path,
    slide: &str,
    mut on_channel: impl FnMut(usize),
) -> Result<PathBuf> {
    let channel_map = plan.source().channel_map();
    let names = order
        .iter()
        .map(|&c| {
            channel_map
                .name(c)
                .map(str::to_string)
                .ok_or_else(|| StitchError::Config(format!("Channel index {c} out of range")))
        })
        .collect::<Result<Vec<_>>>()?;

    let shape = plan.shape();
    let shapes = pyramid_shapes(shape, OME_TIFF_DOWNSCALE, OME_TIFF_PEAK_SIZE);
    let description = ome_xml(slide, &names, &shapes);

    let path = outdir.join(ome_tiff_file_name(slide));
    info!(
        path = %path.display(),
        levels = shapes.len(),
        channels = names.len(),
        "Writing OME-TIFF"
    );
    let mut encoder = TiffEncoder::new_big(BufWriter::new(File::create(&path)?))?;

    // reduced[level - 1][channel]
    let mut reduced: Vec<Vec<Array2<u16>>> = vec![Vec::with_capacity(order.len()); shapes.len() - 1];
    for (i, &channel) in order.iter().enumerate() {
        let full = plan.assemble_channel(channel)?;
        let desc = (i == 0).then_some(description.as_str());
        write_page(&mut encoder, &full.view(), desc)?;

        let mut prev = full;
        for level in reduced.iter_mut() {
            let next = downscale_mean(&prev.view(), OME_TIFF_DOWNSCALE);
            level.push(next.clone());
            prev = next;
        }
        debug!(channel = %names[i], "Wrote full-resolution page");
        on_channel(i + 1);
    }

    for level in &reduced {
        for plane in level {
            write_page(&mut encoder, &plane.view(), None)?;
        }
    }
    Ok(path)
}
