//! Geometry decoding for the text-region detector.
//!
//! Converts the detector's raw score/geometry grid into a single scalar:
//! the fraction of image area covered by text. Rotated-box reconstruction,
//! then greedy non-max suppression, then union area. Each stage must be
//! exact, since a wrong reconstruction silently degrades OCR routing for
//! every text-heavy image.

use dejavu_core::constants::{DETECTOR_INPUT_SIDE, DETECTOR_STRIDE, EAST_SCORE_THRESHOLD};

use crate::detector::DetectionGrid;

/// An axis-aligned box in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    /// Left edge.
    pub x0: f32,
    /// Top edge.
    pub y0: f32,
    /// Right edge.
    pub x1: f32,
    /// Bottom edge.
    pub y1: f32,
}

impl PixelBox {
    /// Box area; zero for degenerate boxes.
    pub fn area(&self) -> f32 {
        (self.x1 - self.x0).max(0.0) * (self.y1 - self.y0).max(0.0)
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &PixelBox) -> f32 {
        let ix0 = self.x0.max(other.x0);
        let iy0 = self.y0.max(other.y0);
        let ix1 = self.x1.min(other.x1);
        let iy1 = self.y1.min(other.y1);
        let intersection = (ix1 - ix0).max(0.0) * (iy1 - iy0).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    /// Clip to the image frame.
    pub fn clamp_to(&self, width: f32, height: f32) -> PixelBox {
        PixelBox {
            x0: self.x0.clamp(0.0, width),
            y0: self.y0.clamp(0.0, height),
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
        }
    }
}

/// One decoded detection: an axis-aligned box plus confidence. Lives only
/// within a single coverage computation.
#[derive(Debug, Clone, Copy)]
pub struct EastCandidate {
    /// Axis-aligned envelope of the rotated text box, in image pixels.
    pub bbox: PixelBox,
    /// Detector confidence for the originating cell.
    pub confidence: f32,
}

/// Decode score-gated grid cells into candidate boxes in image coordinates.
///
/// For each activated cell the anchor is the cell's pixel offset at the
/// detector stride; the right/bottom edge distances are projected through
/// the cell's rotation angle to an absolute end point, the start point is
/// derived by subtracting the box extent, and the axis-aligned envelope is
/// scaled from detector input space to the original image and clamped.
pub fn decode_candidates(grid: &DetectionGrid, image_w: u32, image_h: u32) -> Vec<EastCandidate> {
    let scale_x = image_w as f32 / DETECTOR_INPUT_SIDE as f32;
    let scale_y = image_h as f32 / DETECTOR_INPUT_SIDE as f32;
    let mut candidates = Vec::new();

    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let score = grid.score_at(col, row);
            if score < EAST_SCORE_THRESHOLD {
                continue;
            }

            let offset_x = (col as u32 * DETECTOR_STRIDE) as f32;
            let offset_y = (row as u32 * DETECTOR_STRIDE) as f32;
            let d_top = grid.geometry_at(0, col, row);
            let d_right = grid.geometry_at(1, col, row);
            let d_bottom = grid.geometry_at(2, col, row);
            let d_left = grid.geometry_at(3, col, row);
            let angle = grid.geometry_at(4, col, row);

            let cos = angle.cos();
            let sin = angle.sin();
            let width = d_left + d_right;
            let height = d_top + d_bottom;

            let end_x = offset_x + cos * d_right + sin * d_bottom;
            let end_y = offset_y - sin * d_right + cos * d_bottom;
            let start_x = end_x - width;
            let start_y = end_y - height;

            let bbox = PixelBox {
                x0: start_x * scale_x,
                y0: start_y * scale_y,
                x1: end_x * scale_x,
                y1: end_y * scale_y,
            }
            .clamp_to(image_w as f32, image_h as f32);

            if bbox.area() <= 0.0 {
                continue;
            }
            candidates.push(EastCandidate {
                bbox,
                confidence: score,
            });
        }
    }

    candidates
}

/// Greedy non-max suppression: keep a candidate only if its IoU with every
/// already-kept box stays at or below `iou_threshold`.
pub fn apply_nms(mut candidates: Vec<EastCandidate>, iou_threshold: f32) -> Vec<EastCandidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<EastCandidate> = Vec::new();
    for candidate in candidates {
        if kept
            .iter()
            .all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

/// Fraction of the image covered by the union of the boxes.
///
/// Union, not a naive sum: overlapping regions count once. Sweep over sorted
/// x-edge events while maintaining the set of active boxes; at each x-gap the
/// covered area grows by gap width times the merged length of the active
/// y-intervals.
pub fn union_coverage_ratio(boxes: &[PixelBox], image_w: u32, image_h: u32) -> f32 {
    let image_area = image_w as f32 * image_h as f32;
    if image_area <= 0.0 || boxes.is_empty() {
        return 0.0;
    }

    let clipped: Vec<PixelBox> = boxes
        .iter()
        .map(|b| b.clamp_to(image_w as f32, image_h as f32))
        .filter(|b| b.area() > 0.0)
        .collect();
    if clipped.is_empty() {
        return 0.0;
    }

    // (x, is_start, box index)
    let mut events: Vec<(f32, bool, usize)> = Vec::with_capacity(clipped.len() * 2);
    for (idx, b) in clipped.iter().enumerate() {
        events.push((b.x0, true, idx));
        events.push((b.x1, false, idx));
    }
    events.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut active: Vec<usize> = Vec::new();
    let mut area = 0.0f32;
    let mut prev_x = events[0].0;

    for (x, is_start, idx) in events {
        if x > prev_x && !active.is_empty() {
            let merged = merged_interval_length(active.iter().map(|&i| {
                let b = &clipped[i];
                (b.y0, b.y1)
            }));
            area += (x - prev_x) * merged;
        }
        if is_start {
            active.push(idx);
        } else if let Some(pos) = active.iter().position(|&i| i == idx) {
            active.swap_remove(pos);
        }
        prev_x = x;
    }

    (area / image_area).clamp(0.0, 1.0)
}

/// Total length covered by a set of possibly overlapping y-intervals.
fn merged_interval_length(intervals: impl Iterator<Item = (f32, f32)>) -> f32 {
    let mut sorted: Vec<(f32, f32)> = intervals.collect();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut total = 0.0f32;
    let mut current: Option<(f32, f32)> = None;
    for (start, end) in sorted {
        match current {
            Some((cur_start, cur_end)) if start <= cur_end => {
                current = Some((cur_start, cur_end.max(end)));
            }
            Some((cur_start, cur_end)) => {
                total += cur_end - cur_start;
                current = Some((start, end));
            }
            None => current = Some((start, end)),
        }
    }
    if let Some((start, end)) = current {
        total += end - start;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use dejavu_core::constants::EAST_NMS_IOU_THRESHOLD;

    /// Grid with one activated cell and explicit geometry.
    fn single_cell_grid(
        cols: usize,
        rows: usize,
        cell: (usize, usize),
        score: f32,
        geo: [f32; 5],
    ) -> DetectionGrid {
        let mut scores = vec![0.0; rows * cols];
        scores[cell.1 * cols + cell.0] = score;
        let mut geometry = vec![0.0; 5 * rows * cols];
        for (channel, value) in geo.iter().enumerate() {
            geometry[channel * rows * cols + cell.1 * cols + cell.0] = *value;
        }
        DetectionGrid {
            cols,
            rows,
            scores,
            geometry,
        }
    }

    #[test]
    fn test_decode_angle_zero_matches_hand_computation() {
        // Cell (10, 5) at stride 4 anchors at (40, 20). With angle 0 the box
        // is axis-aligned: [anchor - left, anchor - top, anchor + right,
        // anchor + bottom]. Image is exactly detector-sized, so scale is 1.
        let grid = single_cell_grid(80, 80, (10, 5), 0.9, [6.0, 12.0, 10.0, 8.0, 0.0]);
        let candidates = decode_candidates(&grid, 320, 320);

        assert_eq!(candidates.len(), 1);
        let b = candidates[0].bbox;
        assert!((b.x0 - 32.0).abs() < 1e-4);
        assert!((b.y0 - 14.0).abs() < 1e-4);
        assert!((b.x1 - 52.0).abs() < 1e-4);
        assert!((b.y1 - 30.0).abs() < 1e-4);
        assert!((candidates[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_scales_to_image_dimensions() {
        let grid = single_cell_grid(80, 80, (10, 5), 0.9, [6.0, 12.0, 10.0, 8.0, 0.0]);
        // Image twice the detector input on x only.
        let candidates = decode_candidates(&grid, 640, 320);
        let b = candidates[0].bbox;
        assert!((b.x0 - 64.0).abs() < 1e-4);
        assert!((b.x1 - 104.0).abs() < 1e-4);
        assert!((b.y0 - 14.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_skips_low_score_and_degenerate() {
        let below = single_cell_grid(80, 80, (0, 0), 0.4, [6.0, 12.0, 10.0, 8.0, 0.0]);
        assert!(decode_candidates(&below, 320, 320).is_empty());

        let zero_area = single_cell_grid(80, 80, (0, 0), 0.9, [0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(decode_candidates(&zero_area, 320, 320).is_empty());
    }

    #[test]
    fn test_nms_keeps_best_of_overlap_plus_disjoint() {
        let overlapping_strong = EastCandidate {
            bbox: PixelBox {
                x0: 0.0,
                y0: 0.0,
                x1: 10.0,
                y1: 10.0,
            },
            confidence: 0.95,
        };
        let overlapping_weak = EastCandidate {
            bbox: PixelBox {
                x0: 1.0,
                y0: 1.0,
                x1: 11.0,
                y1: 11.0,
            },
            confidence: 0.80,
        };
        let disjoint = EastCandidate {
            bbox: PixelBox {
                x0: 50.0,
                y0: 50.0,
                x1: 60.0,
                y1: 60.0,
            },
            confidence: 0.60,
        };

        let kept = apply_nms(
            vec![overlapping_weak, disjoint, overlapping_strong],
            EAST_NMS_IOU_THRESHOLD,
        );
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.95).abs() < 1e-6);
        assert!((kept[1].confidence - 0.60).abs() < 1e-6);
    }

    #[test]
    fn test_union_coverage_counts_overlap_once() {
        // Two 10x10 boxes overlapping on a 5x10 strip: union is 150, not 200.
        let a = PixelBox {
            x0: 0.0,
            y0: 0.0,
            x1: 10.0,
            y1: 10.0,
        };
        let b = PixelBox {
            x0: 5.0,
            y0: 0.0,
            x1: 15.0,
            y1: 10.0,
        };
        let ratio = union_coverage_ratio(&[a, b], 100, 100);
        assert!((ratio - 150.0 / 10_000.0).abs() < 1e-5);
    }

    #[test]
    fn test_union_coverage_clips_out_of_bounds() {
        let oversized = PixelBox {
            x0: -50.0,
            y0: -50.0,
            x1: 150.0,
            y1: 150.0,
        };
        let ratio = union_coverage_ratio(&[oversized], 100, 100);
        assert!((ratio - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_union_coverage_disjoint_boxes_add() {
        let a = PixelBox {
            x0: 0.0,
            y0: 0.0,
            x1: 10.0,
            y1: 10.0,
        };
        let b = PixelBox {
            x0: 20.0,
            y0: 20.0,
            x1: 30.0,
            y1: 30.0,
        };
        let ratio = union_coverage_ratio(&[a, b], 100, 100);
        assert!((ratio - 200.0 / 10_000.0).abs() < 1e-5);
    }

    #[test]
    fn test_union_coverage_empty_is_zero() {
        assert_eq!(union_coverage_ratio(&[], 100, 100), 0.0);
    }
}
