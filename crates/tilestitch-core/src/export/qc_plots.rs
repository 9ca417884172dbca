//! Registration QC plots rendered after alignment.
//!
//! Two PNGs are written per slide:
//!
//! - `{slide}_edge_scatter.png`: one point per correlated edge, registration
//!   error (`-ln(peak)`) on x against shift magnitude on y. Accepted edges are
//!   blue, rejected edges red; the grey line marks `max_shift`.
//! - `{slide}_edge_quality.png`: tile centres at their registered positions,
//!   joined by their edges. Accepted edges fade from green (low error) to
//!   orange (high error); rejected edges are red.
//!
//! The plots carry no text so they render without system fonts.

use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::info;

use crate::align::{Alignment, EdgeReport};
use crate::error::{Result, StitchError};

const SCATTER_SIZE: (u32, u32) = (800, 600);
const QUALITY_WIDTH: u32 = 1000;
const QUALITY_HEIGHT_RANGE: (u32, u32) = (200, 2000);

const ACCEPTED: RGBColor = RGBColor(31, 119, 180);
const REJECTED: RGBColor = RGBColor(214, 39, 40);
const LOW_ERROR: RGBColor = RGBColor(44, 160, 44);
const HIGH_ERROR: RGBColor = RGBColor(255, 127, 14);

/// `{slide}_edge_scatter.png`
pub fn edge_scatter_file_name(slide: &str) -> String {
    format!("{slide}_edge_scatter.png")
}

/// `{slide}_edge_quality.png`
pub fn edge_quality_file_name(slide: &str) -> String {
    format!("{slide}_edge_quality.png")
}

fn plot_error(e: impl std::fmt::Display) -> StitchError {
    StitchError::Plot(e.to_string())
}

fn blend(from: RGBColor, to: RGBColor, t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    RGBColor(mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

fn max_error(edges: &[EdgeReport]) -> f64 {
    edges
        .iter()
        .map(|e| e.shift.error())
        .fold(0.0, f64::max)
}

/// Image size for the quality plot, keeping the mosaic aspect ratio.
fn quality_size(mosaic_shape: (usize, usize)) -> (u32, u32) {
    let (h, w) = mosaic_shape;
    let aspect = h as f64 / w.max(1) as f64;
    let height = (QUALITY_WIDTH as f64 * aspect).round() as u32;
    (
        QUALITY_WIDTH,
        height.clamp(QUALITY_HEIGHT_RANGE.0, QUALITY_HEIGHT_RANGE.1),
    )
}

fn draw_edge_scatter(edges: &[EdgeReport], max_shift: f64, path: &Path) -> Result<()> {
    let x_max = (max_error(edges) * 1.1).max(1e-3);
    let y_max = edges
        .iter()
        .map(|e| e.shift.magnitude())
        .fold(max_shift, f64::max)
        * 1.1;
    let y_max = y_max.max(1.0);

    let root = BitMapBackend::new(path, SCATTER_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(0.0..x_max, 0.0..y_max)
        .map_err(plot_error)?;

    chart
        .draw_series(LineSeries::new(
            vec![(0.0, 0.0), (x_max, 0.0)],
            BLACK.stroke_width(1),
        ))
        .map_err(plot_error)?;
    chart
        .draw_series(LineSeries::new(
            vec![(0.0, 0.0), (0.0, y_max)],
            BLACK.stroke_width(1),
        ))
        .map_err(plot_error)?;
    chart
        .draw_series(LineSeries::new(
            vec![(0.0, max_shift), (x_max, max_shift)],
            BLACK.mix(0.3).stroke_width(2),
        ))
        .map_err(plot_error)?;

    chart
        .draw_series(edges.iter().map(|e| {
            let color = if e.accepted { ACCEPTED } else { REJECTED };
            Circle::new((e.shift.error(), e.shift.magnitude()), 4, color.filled())
        }))
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    Ok(())
}

fn draw_edge_quality(
    alignment: &Alignment,
    tile_shape: (usize, usize),
    path: &Path,
) -> Result<()> {
    let (mh, mw) = alignment.mosaic_shape;
    let (th, tw) = tile_shape;
    // Mosaic rows grow downwards; the chart y axis grows upwards.
    let centre = |i: usize| {
        let p = alignment.positions[i];
        (p.x + tw as f64 / 2.0, mh as f64 - (p.y + th as f64 / 2.0))
    };
    let worst = max_error(&alignment.edges).max(f64::EPSILON);

    let root = BitMapBackend::new(path, quality_size(alignment.mosaic_shape)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(0.0..mw.max(1) as f64, 0.0..mh.max(1) as f64)
        .map_err(plot_error)?;

    chart
        .draw_series(alignment.edges.iter().map(|e| {
            let color = if e.accepted {
                blend(LOW_ERROR, HIGH_ERROR, e.shift.error() / worst)
            } else {
                REJECTED
            };
            PathElement::new(vec![centre(e.a), centre(e.b)], color.stroke_width(3))
        }))
        .map_err(plot_error)?;
    chart
        .draw_series(
            (0..alignment.positions.len()).map(|i| Circle::new(centre(i), 3, BLACK.filled())),
        )
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    Ok(())
}

/// Render both QC plots for `alignment` into `outdir`.
///
/// Returns the written paths, or nothing when no edge was correlated.
pub fn write_qc_plots(
    alignment: &Alignment,
    tile_shape: (usize, usize),
    max_shift: f64,
    outdir: &Path,
    slide: &str,
) -> Result<Vec<PathBuf>> {
    if alignment.edges.is_empty() {
        info!(slide, "No correlated edges, skipping QC plots");
        return Ok(Vec::new());
    }

    let scatter = outdir.join(edge_scatter_file_name(slide));
    draw_edge_scatter(&alignment.edges, max_shift, &scatter)?;
    let quality = outdir.join(edge_quality_file_name(slide));
    draw_edge_quality(alignment, tile_shape, &quality)?;

    info!(
        edges = alignment.edges.len(),
        scatter = %scatter.display(),
        quality = %quality.display(),
        "QC plots written"
    );
    Ok(vec![scatter, quality])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_endpoints() {
        assert_eq!(blend(LOW_ERROR, HIGH_ERROR, 0.0), LOW_ERROR);
        assert_eq!(blend(LOW_ERROR, HIGH_ERROR, 1.0), HIGH_ERROR);
        assert_eq!(blend(LOW_ERROR, HIGH_ERROR, 7.0), HIGH_ERROR);
    }

    #[test]
    fn test_quality_size_keeps_aspect() {
        assert_eq!(quality_size((500, 1000)), (1000, 500));
        assert_eq!(quality_size((10, 1000)), (1000, 200));
        assert_eq!(quality_size((100_000, 1000)), (1000, 2000));
    }
}
