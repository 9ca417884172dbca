use std::collections::{HashMap, VecDeque};

use ndarray::{s, Array2, ArrayView2};
use tracing::{debug, info, warn};

use crate::consts::{MAX_REPORTED_FAILURES, MIN_OVERLAP_PIXELS, U16_MAX_F64};
use crate::error::Result;
use crate::io::reader::TileSource;
use crate::tile::TilePosition;

use super::gaussian::gaussian_blur;
use super::phase_correlation::{phase_correlate, Shift};
use super::{AlignParams, Aligner, Alignment, EdgeReport};

/// Registers neighbouring tiles by phase correlation of their nominal overlap.
///
/// Each grid edge yields a shift relative to the nominal neighbour offset.
/// Edges whose shift exceeds `max_shift` are rejected; positions are then
/// propagated breadth-first over the accepted edges. Tiles left with only
/// rejected edges stay at their nominal position and are reported as failed.
#[derive(Clone, Copy, Debug, Default)]
pub struct EdgeAligner;

#[derive(Clone, Copy, Debug)]
struct Region {
    y0: usize,
    y1: usize,
    x0: usize,
    x1: usize,
}

impl Region {
    fn view<'a>(&self, data: &'a Array2<f32>) -> ArrayView2<'a, f32> {
        data.slice(s![self.y0..self.y1, self.x0..self.x1])
    }
}

/// Overlap of tile `b` placed at `(dy, dx)` relative to tile `a`, in each tile's own coordinates.
fn overlap_regions(dy: isize, dx: isize, h: usize, w: usize) -> Option<(Region, Region)> {
    let (h, w) = (h as isize, w as isize);
    let y0 = dy.max(0);
    let y1 = (h + dy).min(h);
    let x0 = dx.max(0);
    let x1 = (w + dx).min(w);
    if y1 - y0 < MIN_OVERLAP_PIXELS as isize || x1 - x0 < MIN_OVERLAP_PIXELS as isize {
        return None;
    }
    let in_a = Region {
        y0: y0 as usize,
        y1: y1 as usize,
        x0: x0 as usize,
        x1: x1 as usize,
    };
    let in_b = Region {
        y0: (y0 - dy) as usize,
        y1: (y1 - dy) as usize,
        x0: (x0 - dx) as usize,
        x1: (x1 - dx) as usize,
    };
    Some((in_a, in_b))
}

fn is_flat(data: &ArrayView2<f32>) -> bool {
    let (lo, hi) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    hi - lo < 1e-6
}

fn prepare(strip: ArrayView2<f32>, sigma: f64) -> Array2<f32> {
    if sigma > 0.0 {
        gaussian_blur(&strip, sigma as f32)
    } else {
        strip.to_owned()
    }
}

struct TileCache<'a> {
    source: &'a dyn TileSource,
    channel: usize,
    tiles: HashMap<usize, Array2<f32>>,
}

impl<'a> TileCache<'a> {
    fn get(&mut self, tile: usize) -> Result<&Array2<f32>> {
        if !self.tiles.contains_key(&tile) {
            let raw = self.source.read_tile(tile, self.channel)?;
            self.tiles
                .insert(tile, raw.mapv(|v| (v as f64 / U16_MAX_F64) as f32));
        }
        Ok(&self.tiles[&tile])
    }

    fn evict(&mut self, tile: usize) {
        self.tiles.remove(&tile);
    }
}

impl Aligner for EdgeAligner {
    fn name(&self) -> &'static str {
        "phase-correlation"
    }

    fn align(&self, source: &dyn TileSource, params: &AlignParams) -> Result<Alignment> {
        let layout = source.layout();
        let n = layout.len();
        let (h, w) = layout.tile_shape;
        let nominal = &layout.positions;

        let mut forward: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (a, b) in layout.neighbors() {
            forward[a].push(b);
        }

        let mut cache = TileCache {
            source,
            channel: params.channel,
            tiles: HashMap::new(),
        };
        // (neighbour, dy, dx) offsets from each tile to its registered neighbours
        let mut adjacency: Vec<Vec<(usize, f64, f64)>> = vec![Vec::new(); n];
        let mut rejected = vec![false; n];
        let mut edges: Vec<EdgeReport> = Vec::new();

        for a in 0..n {
            for &b in &forward[a] {
                let nominal_dy = nominal[b].y - nominal[a].y;
                let nominal_dx = nominal[b].x - nominal[a].x;
                let Some((in_a, in_b)) =
                    overlap_regions(nominal_dy.round() as isize, nominal_dx.round() as isize, h, w)
                else {
                    continue;
                };

                let strip_a = prepare(in_a.view(cache.get(a)?), params.filter_sigma);
                let strip_b = prepare(in_b.view(cache.get(b)?), params.filter_sigma);
                if is_flat(&strip_a.view()) || is_flat(&strip_b.view()) {
                    debug!(a, b, "Skipping featureless overlap");
                    continue;
                }

                let shift: Shift = phase_correlate(&strip_a.view(), &strip_b.view())?;
                let accepted = shift.magnitude() <= params.max_shift;
                edges.push(EdgeReport {
                    a,
                    b,
                    shift,
                    accepted,
                });
                if !accepted {
                    debug!(
                        a = %layout.coords[a],
                        b = %layout.coords[b],
                        dy = shift.dy,
                        dx = shift.dx,
                        "Rejected edge above max shift"
                    );
                    rejected[a] = true;
                    rejected[b] = true;
                    continue;
                }

                let dy = nominal_dy + shift.dy;
                let dx = nominal_dx + shift.dx;
                adjacency[a].push((b, dy, dx));
                adjacency[b].push((a, -dy, -dx));
            }
            cache.evict(a);
        }

        let mut placed: Vec<Option<TilePosition>> = vec![None; n];
        for root in 0..n {
            if placed[root].is_some() {
                continue;
            }
            placed[root] = Some(nominal[root]);
            let mut queue = VecDeque::from([root]);
            while let Some(i) = queue.pop_front() {
                let Some(origin) = placed[i] else { continue };
                for &(j, dy, dx) in &adjacency[i] {
                    if placed[j].is_none() {
                        placed[j] = Some(TilePosition {
                            y: origin.y + dy,
                            x: origin.x + dx,
                        });
                        queue.push_back(j);
                    }
                }
            }
        }
        let positions: Vec<TilePosition> = placed
            .into_iter()
            .zip(nominal)
            .map(|(p, &nom)| p.unwrap_or(nom))
            .collect();

        let failed_all: Vec<_> = (0..n)
            .filter(|&i| rejected[i] && adjacency[i].is_empty())
            .map(|i| layout.coords[i])
            .collect();
        let failed_total = failed_all.len();
        let failed: Vec<_> = failed_all.into_iter().take(MAX_REPORTED_FAILURES).collect();

        info!(
            edges = edges.len(),
            rejected = edges.iter().filter(|e| !e.accepted).count(),
            max_shift = params.max_shift,
            "Registered tile overlaps"
        );
        if failed_total > 0 {
            let listed: Vec<String> = failed.iter().map(ToString::to_string).collect();
            warn!(
                count = failed_total,
                tiles = %listed.join(", "),
                "Tiles exceeded max shift and kept their stage position"
            );
        }

        Ok(
            Alignment::from_positions(positions, layout.tile_shape, failed, failed_total)
                .with_edges(edges),
        )
    }
}
