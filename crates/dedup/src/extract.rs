//! Image feature extraction.
//!
//! One image in, one [`MediaFeatures::Image`] out: visual embedding, text
//! coverage, and for text-heavy images a normalized OCR transcript. Each
//! weaker signal degrades independently; only embedding failure aborts the
//! item.

use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, warn};

use dejavu_core::constants::{
    EAST_NMS_IOU_THRESHOLD, OCR_MIN_CHARS, OCR_MIN_CONFIDENCE, TEXT_COVERAGE_THRESHOLD,
};
use dejavu_core::{Error, MediaFeatures, Result};

use crate::detector::TextDetector;
use crate::east;
use crate::encoder::VisionEncoder;
use crate::ocr;

/// Outcome of the text-coverage pre-filter.
///
/// Distinguishes "the detector saw no text" from "there is no detector": the
/// two persist identically (coverage 0) but log differently, and both skip
/// OCR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextSignal {
    /// Detector ran; fraction of image area covered by text boxes.
    Coverage(f32),
    /// No detector session is available.
    DetectorUnavailable,
}

impl TextSignal {
    /// Coverage ratio as persisted; 0 when the detector is unavailable.
    pub fn ratio(&self) -> f32 {
        match self {
            TextSignal::Coverage(ratio) => *ratio,
            TextSignal::DetectorUnavailable => 0.0,
        }
    }
}

/// Whether text similarity should be the duplicate signal for this image.
///
/// Caption text survives re-encoding and cropping far better than a visual
/// embedding does, but only when there is enough of it and the OCR engine
/// was confident about it.
pub fn should_use_ocr_route(coverage: f32, normalized_text: &str, avg_confidence: f32) -> bool {
    coverage >= TEXT_COVERAGE_THRESHOLD
        && !normalized_text.is_empty()
        && normalized_text.len() >= OCR_MIN_CHARS
        && avg_confidence >= OCR_MIN_CONFIDENCE
}

/// Extracts derived features from still images.
pub struct ImageExtractor {
    encoder: Arc<dyn VisionEncoder>,
    detector: Option<Arc<dyn TextDetector>>,
}

impl ImageExtractor {
    /// Create an extractor over a loaded encoder and an optional detector.
    pub fn new(encoder: Arc<dyn VisionEncoder>, detector: Option<Arc<dyn TextDetector>>) -> Self {
        Self { encoder, detector }
    }

    /// Shared embedding routine, used for both still images and keyframes.
    pub async fn embed(&self, image: DynamicImage) -> Result<Vec<f32>> {
        let encoder = self.encoder.clone();
        tokio::task::spawn_blocking(move || encoder.encode(&image))
            .await
            .map_err(|e| Error::Inference(format!("embedding task aborted: {}", e)))?
    }

    /// Extract the full image feature set from raw bytes.
    pub async fn extract(&self, bytes: &[u8]) -> Result<MediaFeatures> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| Error::Decode(format!("image decode: {}", e)))?;

        // Embedding failure aborts the whole item; everything after this
        // point only degrades the signal.
        let embedding = self.embed(image.clone()).await?;

        let signal = self.text_coverage(&image);
        let coverage = signal.ratio();
        let is_text_heavy = coverage >= TEXT_COVERAGE_THRESHOLD;

        let mut ocr_text = None;
        let mut ocr_confidence = None;
        if is_text_heavy {
            match ocr::recognize(&image).await {
                Ok(Some(result)) if !result.text.is_empty() => {
                    ocr_text = Some(result.text);
                    ocr_confidence = Some(result.avg_confidence);
                }
                Ok(_) => debug!("text-heavy image produced no transcript"),
                // OCR failure falls back to the embedding route.
                Err(e) => warn!("ocr failed, using embedding route: {}", e),
            }
        }

        Ok(MediaFeatures::Image {
            embedding: Some(embedding),
            text_coverage: coverage,
            is_text_heavy,
            ocr_text,
            ocr_confidence,
        })
    }

    /// Run the text-region detector and reduce its output to a coverage
    /// ratio against the original image size.
    fn text_coverage(&self, image: &DynamicImage) -> TextSignal {
        let Some(detector) = &self.detector else {
            debug!("no text detector session, skipping coverage");
            return TextSignal::DetectorUnavailable;
        };

        let grid = match detector.detect(image) {
            Ok(grid) => grid,
            Err(e) => {
                // Detector errors degrade to the pure visual route.
                warn!("text detector failed, treating coverage as 0: {}", e);
                return TextSignal::Coverage(0.0);
            }
        };

        let candidates = east::decode_candidates(&grid, image.width(), image.height());
        let kept = east::apply_nms(candidates, EAST_NMS_IOU_THRESHOLD);
        let boxes: Vec<_> = kept.iter().map(|c| c.bbox).collect();
        TextSignal::Coverage(east::union_coverage_ratio(
            &boxes,
            image.width(),
            image.height(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ocr_route_requires_all_four_conditions() {
        let text_40 = "a".repeat(40);

        assert!(should_use_ocr_route(0.30, &text_40, 72.0));

        // Each condition failing alone flips the gate.
        assert!(!should_use_ocr_route(0.10, &text_40, 72.0));
        assert!(!should_use_ocr_route(0.30, "", 72.0));
        assert!(!should_use_ocr_route(0.30, "short text", 72.0));
        assert!(!should_use_ocr_route(0.30, &text_40, 40.0));
    }

    #[test]
    fn test_ocr_route_boundaries_inclusive() {
        let text_20 = "b".repeat(20);
        assert!(should_use_ocr_route(
            TEXT_COVERAGE_THRESHOLD,
            &text_20,
            OCR_MIN_CONFIDENCE
        ));
        assert!(!should_use_ocr_route(
            TEXT_COVERAGE_THRESHOLD,
            &"c".repeat(19),
            OCR_MIN_CONFIDENCE
        ));
    }

    #[test]
    fn test_text_signal_ratio() {
        assert_eq!(TextSignal::Coverage(0.4).ratio(), 0.4);
        assert_eq!(TextSignal::DetectorUnavailable.ratio(), 0.0);
    }
}
