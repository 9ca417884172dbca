use ndarray::{Array2, ArrayView2};

/// Separable Gaussian blur with edge clamping.
pub fn gaussian_blur(data: &ArrayView2<f32>, sigma: f32) -> Array2<f32> {
    let kernel = make_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let (h, w) = data.dim();

    let rows = Array2::from_shape_fn((h, w), |(row, col)| {
        kernel
            .iter()
            .enumerate()
            .map(|(ki, &kv)| {
                let src = (col as isize + ki as isize - radius).clamp(0, w as isize - 1) as usize;
                data[[row, src]] * kv
            })
            .sum::<f32>()
    });

    Array2::from_shape_fn((h, w), |(row, col)| {
        kernel
            .iter()
            .enumerate()
            .map(|(ki, &kv)| {
                let src = (row as isize + ki as isize - radius).clamp(0, h as isize - 1) as usize;
                rows[[src, col]] * kv
            })
            .sum::<f32>()
    })
}

fn make_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..2 * radius + 1)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}
