//! Text-region detector seam.
//!
//! The detector itself is a frozen black box: image in, two tensors out
//! (per-cell confidence plus box geometry). The host wires a concrete
//! session at startup; when none is available the pipeline degrades to the
//! pure embedding route.

use dejavu_core::Result;
use image::DynamicImage;

/// Raw detector output at the fixed detector input resolution.
///
/// `scores` holds one confidence per grid cell, row-major. `geometry` holds
/// five channels per cell — distances from the cell's anchor to the box
/// top/right/bottom/left edges plus a rotation angle — stored channel-major
/// (channel, row, col).
#[derive(Debug, Clone)]
pub struct DetectionGrid {
    /// Grid width (detector input side / stride).
    pub cols: usize,
    /// Grid height.
    pub rows: usize,
    /// Per-cell confidence, `rows * cols` values.
    pub scores: Vec<f32>,
    /// Per-cell geometry, `5 * rows * cols` values.
    pub geometry: Vec<f32>,
}

impl DetectionGrid {
    /// Confidence at cell (col, row).
    pub fn score_at(&self, col: usize, row: usize) -> f32 {
        self.scores[row * self.cols + col]
    }

    /// Geometry channel value at cell (col, row).
    pub fn geometry_at(&self, channel: usize, col: usize, row: usize) -> f32 {
        self.geometry[channel * self.rows * self.cols + row * self.cols + col]
    }
}

/// A frozen text-region detection model.
pub trait TextDetector: Send + Sync {
    /// Run detection on the full-size image. The implementation handles its
    /// own resize to the detector input resolution.
    fn detect(&self, image: &DynamicImage) -> Result<DetectionGrid>;
}
