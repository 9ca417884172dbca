use ndarray::{Array2, ArrayView2};
use num_complex::Complex;
use rustfft::FftPlanner;

use crate::consts::EPSILON;
use crate::error::{Result, StitchError};

/// Translation between two equally sized planes, in pixels.
///
/// Shifting the target by `(dy, dx)` aligns it with the reference.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Shift {
    pub dy: f64,
    pub dx: f64,
    /// Height of the correlation peak, 1.0 for identical planes.
    pub peak: f64,
}

impl Shift {
    pub fn magnitude(&self) -> f64 {
        self.dy.hypot(self.dx)
    }

    /// Registration error as `-ln(peak)`. Lower is better.
    pub fn error(&self) -> f64 {
        -self.peak.max(EPSILON).ln()
    }
}

/// Estimate the translation between two planes by FFT phase correlation.
pub fn phase_correlate(reference: &ArrayView2<f32>, target: &ArrayView2<f32>) -> Result<Shift> {
    let (h, w) = reference.dim();
    let (th, tw) = target.dim();
    if h != th || w != tw {
        return Err(StitchError::Alignment(format!(
            "Plane size mismatch: {w}x{h} vs {tw}x{th}"
        )));
    }
    if h < 3 || w < 3 {
        return Err(StitchError::Alignment(format!(
            "Plane too small for phase correlation: {w}x{h}"
        )));
    }

    let ref_fft = fft2d(&apply_hann(reference));
    let tgt_fft = fft2d(&apply_hann(target));
    let correlation = ifft2d(&normalized_cross_power(&ref_fft, &tgt_fft));

    let (peak_row, peak_col) = find_peak(&correlation);

    // Peaks past the midpoint are negative shifts wrapped around
    let dy = if peak_row > h / 2 {
        peak_row as f64 - h as f64
    } else {
        peak_row as f64
    };
    let dx = if peak_col > w / 2 {
        peak_col as f64 - w as f64
    } else {
        peak_col as f64
    };

    let (sub_dy, sub_dx) = refine_peak(&correlation, peak_row, peak_col);

    Ok(Shift {
        dy: dy + sub_dy,
        dx: dx + sub_dx,
        peak: correlation[[peak_row, peak_col]],
    })
}

fn apply_hann(data: &ArrayView2<f32>) -> Array2<f32> {
    let (h, w) = data.dim();
    let hann = |i: usize, n: usize| 0.5 * (1.0 - (std::f64::consts::TAU * i as f64 / n as f64).cos());
    Array2::from_shape_fn((h, w), |(row, col)| {
        data[[row, col]] * (hann(row, h) * hann(col, w)) as f32
    })
}

/// Row-wise then column-wise forward FFT.
fn fft2d(data: &Array2<f32>) -> Array2<Complex<f64>> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let fft_row = planner.plan_fft_forward(w);
    let fft_col = planner.plan_fft_forward(h);

    let mut result = data.mapv(|v| Complex::new(v as f64, 0.0));

    for mut row in result.rows_mut() {
        let mut buf: Vec<Complex<f64>> = row.to_vec();
        fft_row.process(&mut buf);
        row.iter_mut().zip(buf).for_each(|(dst, v)| *dst = v);
    }
    for mut col in result.columns_mut() {
        let mut buf: Vec<Complex<f64>> = col.to_vec();
        fft_col.process(&mut buf);
        col.iter_mut().zip(buf).for_each(|(dst, v)| *dst = v);
    }

    result
}

/// Inverse 2D FFT, returning the normalized real part.
fn ifft2d(data: &Array2<Complex<f64>>) -> Array2<f64> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let ifft_row = planner.plan_fft_inverse(w);
    let ifft_col = planner.plan_fft_inverse(h);

    let mut work = data.clone();
    for mut col in work.columns_mut() {
        let mut buf: Vec<Complex<f64>> = col.to_vec();
        ifft_col.process(&mut buf);
        col.iter_mut().zip(buf).for_each(|(dst, v)| *dst = v);
    }
    for mut row in work.rows_mut() {
        let mut buf: Vec<Complex<f64>> = row.to_vec();
        ifft_row.process(&mut buf);
        row.iter_mut().zip(buf).for_each(|(dst, v)| *dst = v);
    }

    let scale = 1.0 / (h * w) as f64;
    work.mapv(|c| c.re * scale)
}

fn normalized_cross_power(
    ref_fft: &Array2<Complex<f64>>,
    tgt_fft: &Array2<Complex<f64>>,
) -> Array2<Complex<f64>> {
    let mut result = ref_fft * &tgt_fft.mapv(|c| c.conj());
    result.mapv_inplace(|cross| {
        let mag = cross.norm();
        if mag > EPSILON {
            cross / mag
        } else {
            Complex::new(0.0, 0.0)
        }
    });
    result
}

fn find_peak(data: &Array2<f64>) -> (usize, usize) {
    let mut best = (0, 0);
    let mut best_val = f64::NEG_INFINITY;
    for ((row, col), &v) in data.indexed_iter() {
        if v > best_val {
            best_val = v;
            best = (row, col);
        }
    }
    best
}

/// Sub-pixel peak refinement by fitting a parabola through the 3x3
/// neighbourhood along each axis. Neighbours wrap, matching the periodic
/// correlation surface. Result is clamped to +/- 0.5 px.
fn refine_peak(correlation: &Array2<f64>, peak_row: usize, peak_col: usize) -> (f64, f64) {
    let (h, w) = correlation.dim();
    let parabola = |prev: f64, curr: f64, next: f64| {
        let denom = prev - 2.0 * curr + next;
        if denom.abs() > EPSILON {
            ((prev - next) / (2.0 * denom)).clamp(-0.5, 0.5)
        } else {
            0.0
        }
    };

    let up = (peak_row + h - 1) % h;
    let down = (peak_row + 1) % h;
    let left = (peak_col + w - 1) % w;
    let right = (peak_col + 1) % w;
    let centre = correlation[[peak_row, peak_col]];

    (
        parabola(correlation[[up, peak_col]], centre, correlation[[down, peak_col]]),
        parabola(correlation[[peak_row, left]], centre, correlation[[peak_row, right]]),
    )
}
