use serde::{Deserialize, Serialize};

use crate::error::{Result, StitchError};

/// Crop margins in thumbnail-scale units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropSpec {
    #[serde(default)]
    pub top: u32,
    #[serde(default)]
    pub bottom: u32,
    #[serde(default)]
    pub left: u32,
    #[serde(default)]
    pub right: u32,
}

impl CropSpec {
    /// True when no margin is set and no crop step runs.
    pub fn is_zero(&self) -> bool {
        self.top == 0 && self.bottom == 0 && self.left == 0 && self.right == 0
    }

    /// Convert margins to a full-resolution window inside a `(height, width)` plane.
    pub fn window(&self, shape: (usize, usize), factor: f64) -> Result<CropWindow> {
        let (h, w) = shape;
        let px = |m: u32| (m as f64 * factor) as usize;
        let (top, bottom, left, right) = (px(self.top), px(self.bottom), px(self.left), px(self.right));

        if top + bottom >= h || left + right >= w {
            return Err(StitchError::InvalidCrop(format!(
                "margins top={top} bottom={bottom} left={left} right={right} (px) leave nothing of a {w}x{h} mosaic"
            )));
        }

        Ok(CropWindow {
            y0: top,
            y1: h - bottom,
            x0: left,
            x1: w - right,
        })
    }
}

impl std::fmt::Display for CropSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "top={} bottom={} left={} right={}",
            self.top, self.bottom, self.left, self.right
        )
    }
}

/// Half-open pixel window `[y0, y1) x [x0, x1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropWindow {
    pub y0: usize,
    pub y1: usize,
    pub x0: usize,
    pub x1: usize,
}

impl CropWindow {
    pub fn full(shape: (usize, usize)) -> Self {
        Self {
            y0: 0,
            y1: shape.0,
            x0: 0,
            x1: shape.1,
        }
    }

    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }

    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }
}
