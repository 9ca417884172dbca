//! Percentile-based intensity rescaling.
//!
//! A percentile pair `(low, high)` is measured over a plane, the measured
//! values become the input range of a linear map onto the full 16-bit output
//! range, and everything outside is clipped.

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_PERCENTILES, EPSILON, U16_MAX_F64};
use crate::error::{Result, StitchError};
use crate::tile::ChannelMap;

/// Low/high percentiles in `[0, 100]`. Serialized as a two-element array.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct PercentilePair {
    pub low: f64,
    pub high: f64,
}

impl PercentilePair {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.low)
            || !(0.0..=100.0).contains(&self.high)
            || self.low >= self.high
        {
            return Err(StitchError::Config(format!(
                "Invalid percentile range ({}, {}): need 0 <= low < high <= 100",
                self.low, self.high
            )));
        }
        Ok(())
    }
}

impl Default for PercentilePair {
    fn default() -> Self {
        Self::new(DEFAULT_PERCENTILES.0, DEFAULT_PERCENTILES.1)
    }
}

impl From<(f64, f64)> for PercentilePair {
    fn from((low, high): (f64, f64)) -> Self {
        Self { low, high }
    }
}

impl From<PercentilePair> for (f64, f64) {
    fn from(p: PercentilePair) -> Self {
        (p.low, p.high)
    }
}

impl std::fmt::Display for PercentilePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.low, self.high)
    }
}

/// When rescaling is applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescaleMode {
    /// Pixel data is used as read.
    Off,
    /// Every tile is rescaled before assembly.
    #[default]
    On,
    /// Every tile is rescaled except tiles of the excluded channels.
    Partial,
    /// Each assembled channel plane is rescaled once, over the whole mosaic.
    FullImage,
}

impl std::fmt::Display for RescaleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "Off"),
            Self::On => write!(f, "Per tile"),
            Self::Partial => write!(f, "Per tile (partial)"),
            Self::FullImage => write!(f, "Full image"),
        }
    }
}

/// A single percentile pair for every channel, or one per channel name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RescaleRange {
    Uniform(PercentilePair),
    PerChannel(BTreeMap<String, PercentilePair>),
}

impl Default for RescaleRange {
    fn default() -> Self {
        Self::Uniform(PercentilePair::default())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RescaleConfig {
    #[serde(default)]
    pub mode: RescaleMode,
    #[serde(default)]
    pub range: RescaleRange,
    /// Channels left untouched in `Partial` mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_channels: Option<Vec<String>>,
}

/// Rescale settings resolved against a channel map, indexed by channel.
#[derive(Clone, Debug, PartialEq)]
pub struct RescalePlan {
    /// Percentiles applied to each tile as it is read.
    pub tile: Vec<Option<PercentilePair>>,
    /// Percentiles applied to each assembled channel plane.
    pub full_image: Vec<Option<PercentilePair>>,
}

impl RescalePlan {
    /// A plan that never rescales.
    pub fn disabled(channels: usize) -> Self {
        Self {
            tile: vec![None; channels],
            full_image: vec![None; channels],
        }
    }

    pub fn tile_range(&self, channel: usize) -> Option<PercentilePair> {
        self.tile.get(channel).copied().flatten()
    }

    pub fn full_image_range(&self, channel: usize) -> Option<PercentilePair> {
        self.full_image.get(channel).copied().flatten()
    }
}

impl RescaleConfig {
    /// Check parameter combinations that do not depend on the tile set.
    pub fn validate(&self) -> Result<()> {
        if self.mode == RescaleMode::Partial
            && self.exclude_channels.as_ref().map_or(true, |c| c.is_empty())
        {
            return Err(StitchError::Config(
                "Rescale mode 'partial' requires a list of channels to exclude from rescaling"
                    .into(),
            ));
        }
        match &self.range {
            RescaleRange::Uniform(pair) => pair.validate()?,
            RescaleRange::PerChannel(map) => {
                for pair in map.values() {
                    pair.validate()?;
                }
            }
        }
        Ok(())
    }

    /// Resolve channel names to indices once, before any pixel data is read.
    ///
    /// Channels absent from a per-channel range are never rescaled.
    pub fn resolve(&self, channels: &ChannelMap) -> Result<RescalePlan> {
        self.validate()?;

        let n = channels.len();
        let mut pairs: Vec<Option<PercentilePair>> = vec![None; n];
        match &self.range {
            RescaleRange::Uniform(pair) => pairs.iter_mut().for_each(|p| *p = Some(*pair)),
            RescaleRange::PerChannel(map) => {
                for (name, pair) in map {
                    pairs[channels.index_of(name)?] = Some(*pair);
                }
            }
        }

        let plan = match self.mode {
            RescaleMode::Off => RescalePlan::disabled(n),
            RescaleMode::On => RescalePlan {
                tile: pairs,
                full_image: vec![None; n],
            },
            RescaleMode::Partial => {
                let mut tile = pairs;
                for name in self.exclude_channels.iter().flatten() {
                    tile[channels.index_of(name)?] = None;
                }
                RescalePlan {
                    tile,
                    full_image: vec![None; n],
                }
            }
            RescaleMode::FullImage => RescalePlan {
                tile: vec![None; n],
                full_image: pairs,
            },
        };
        Ok(plan)
    }
}

/// Compute percentiles (in `[0, 100]`) of 16-bit samples.
///
/// Uses linear interpolation between the two nearest order statistics.
/// Counting into a full-depth histogram keeps this linear in the sample count,
/// which matters for whole-mosaic planes.
pub fn percentiles<I>(values: I, pcts: &[f64]) -> Vec<f64>
where
    I: IntoIterator<Item = u16>,
{
    let mut histogram = vec![0u64; u16::MAX as usize + 1];
    let mut total: u64 = 0;
    for v in values {
        histogram[v as usize] += 1;
        total += 1;
    }
    if total == 0 {
        return vec![0.0; pcts.len()];
    }

    pcts.iter()
        .map(|&p| {
            let rank = p.clamp(0.0, 100.0) / 100.0 * (total - 1) as f64;
            let lo_rank = rank.floor() as u64;
            let hi_rank = (lo_rank + 1).min(total - 1);
            let frac = rank - lo_rank as f64;
            let lo = order_statistic(&histogram, lo_rank) as f64;
            let hi = order_statistic(&histogram, hi_rank) as f64;
            lo + (hi - lo) * frac
        })
        .collect()
}

fn order_statistic(histogram: &[u64], rank: u64) -> u16 {
    let mut seen = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen > rank {
            return value as u16;
        }
    }
    u16::MAX
}

/// Map `value` from the input range `[low, high]` onto `[0, 65535]`.
#[inline]
pub fn rescale_value(value: u16, low: f64, high: f64) -> u16 {
    let v = value as f64;
    let range = high - low;
    if range.abs() < EPSILON {
        return if v > low { u16::MAX } else { 0 };
    }
    (((v - low) / range).clamp(0.0, 1.0) * U16_MAX_F64) as u16
}

/// Measured input range of `plane` for a percentile pair.
pub fn measure_range(plane: &ArrayView2<u16>, pair: PercentilePair) -> (f64, f64) {
    let p = percentiles(plane.iter().copied(), &[pair.low, pair.high]);
    (p[0], p[1])
}

/// Percentile-rescale a plane into a new array.
pub fn rescale_intensity(plane: &ArrayView2<u16>, pair: PercentilePair) -> Array2<u16> {
    let (low, high) = measure_range(plane, pair);
    plane.mapv(|v| rescale_value(v, low, high))
}

/// Percentile-rescale a plane in place.
pub fn rescale_plane(mut plane: ArrayViewMut2<u16>, pair: PercentilePair) {
    let (low, high) = measure_range(&plane.view(), pair);
    plane.mapv_inplace(|v| rescale_value(v, low, high));
}
