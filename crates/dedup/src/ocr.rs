//! OCR over an external tesseract process.
//!
//! Text-heavy images get two passes, the grayscale upscaled image and its
//! inverse, because light-on-dark captions often defeat a single pass. Each
//! pass runs under a hard timeout; the higher-quality transcript wins.

use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use dejavu_core::constants::{OCR_QUALITY_LENGTH_CAP, OCR_TIMEOUT_SECS};
use dejavu_core::similarity::normalize_transcript;
use dejavu_core::{Error, Result};

/// The winning OCR pass, normalized for storage and comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    /// Lowercased, punctuation-stripped, whitespace-collapsed transcript.
    pub text: String,
    /// Mean per-token confidence reported by the OCR engine.
    pub avg_confidence: f32,
}

/// One raw OCR pass before normalization.
#[derive(Debug, Clone)]
struct OcrPass {
    text: String,
    avg_confidence: f32,
}

/// Heuristic favoring longer, higher-confidence transcripts.
pub fn quality_score(text_len: usize, confidence: f32) -> f32 {
    confidence + text_len.min(OCR_QUALITY_LENGTH_CAP) as f32 / 4.0
}

/// Run OCR on an image, trying both polarity variants.
///
/// Returns `Ok(None)` when neither pass produced any tokens. Process
/// failures (binary missing, timeout) surface as errors so the caller can
/// degrade to the embedding route.
pub async fn recognize(image: &DynamicImage) -> Result<Option<OcrResult>> {
    let scratch = tempfile::tempdir().map_err(|e| Error::Process(format!("ocr scratch: {}", e)))?;

    // Upscaling the grayscale image doubles the effective glyph size, which
    // measurably helps tesseract on chat-resolution screenshots.
    let gray = image.grayscale();
    let upscaled = gray.resize_exact(
        gray.width() * 2,
        gray.height() * 2,
        image::imageops::FilterType::CatmullRom,
    );
    let mut inverted = upscaled.clone();
    inverted.invert();

    let normal_path = scratch.path().join("normal.png");
    let inverted_path = scratch.path().join("inverted.png");
    save_png(&upscaled, &normal_path)?;
    save_png(&inverted, &inverted_path)?;

    let mut best: Option<OcrPass> = None;
    for path in [&normal_path, &inverted_path] {
        match run_tesseract(path).await {
            Ok(Some(pass)) => {
                let better = match &best {
                    Some(current) => {
                        quality_score(pass.text.len(), pass.avg_confidence)
                            > quality_score(current.text.len(), current.avg_confidence)
                    }
                    None => true,
                };
                if better {
                    best = Some(pass);
                }
            }
            Ok(None) => {}
            Err(e) => {
                // One failed pass does not doom the other.
                warn!("ocr pass on {:?} failed: {}", path, e);
            }
        }
    }

    Ok(best.map(|pass| OcrResult {
        text: normalize_transcript(&pass.text),
        avg_confidence: pass.avg_confidence,
    }))
}

fn save_png(image: &DynamicImage, path: &PathBuf) -> Result<()> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| Error::Process(format!("write ocr input: {}", e)))
}

async fn run_tesseract(input: &Path) -> Result<Option<OcrPass>> {
    let mut command = Command::new("tesseract");
    command
        .arg(input)
        .arg("stdout")
        .args(["--psm", "6", "tsv"])
        .kill_on_drop(true);

    let output = tokio::time::timeout(Duration::from_secs(OCR_TIMEOUT_SECS), command.output())
        .await
        .map_err(|_| Error::Timeout(format!("tesseract exceeded {}s", OCR_TIMEOUT_SECS)))?
        .map_err(|e| Error::Process(format!("spawn tesseract: {}", e)))?;

    if !output.status.success() {
        return Err(Error::Process(format!(
            "tesseract exited with {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let pass = parse_tsv(&stdout);
    debug!(
        "ocr pass on {:?}: {} chars",
        input,
        pass.as_ref().map(|p| p.text.len()).unwrap_or(0)
    );
    Ok(pass)
}

/// Parse tesseract TSV output into a transcript and mean token confidence.
fn parse_tsv(tsv: &str) -> Option<OcrPass> {
    let mut tokens: Vec<&str> = Vec::new();
    let mut confidence_sum = 0.0f32;

    for line in tsv.lines().skip(1) {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 12 {
            continue;
        }
        let confidence: f32 = match columns[10].parse() {
            Ok(c) => c,
            Err(_) => continue,
        };
        let text = columns[11].trim();
        // Confidence -1 marks structural rows (pages, blocks), not words.
        if confidence < 0.0 || text.is_empty() {
            continue;
        }
        tokens.push(text);
        confidence_sum += confidence;
    }

    if tokens.is_empty() {
        return None;
    }
    Some(OcrPass {
        avg_confidence: confidence_sum / tokens.len() as f32,
        text: tokens.join(" "),
    })
}
