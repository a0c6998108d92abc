//! Pipeline constants and tuning thresholds.
//!
//! All values are compile-time; there are no runtime flags for these. The
//! thresholds were tuned against the bot's own corpus and changing them
//! shifts the false-positive/false-negative balance for every chat.

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;

/// Dimension of the visual embedding produced by the frozen encoder.
pub const EMBEDDING_DIM: usize = 512;

/// Side length of the square encoder input, in pixels.
pub const ENCODER_IMAGE_SIDE: u32 = 224;

/// Per-channel normalization mean for the encoder input (RGB).
pub const CHANNEL_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// Per-channel normalization std for the encoder input (RGB).
pub const CHANNEL_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Side length of the square text-detector input, in pixels.
pub const DETECTOR_INPUT_SIDE: u32 = 320;

/// Detector output stride: one grid cell per this many input pixels.
pub const DETECTOR_STRIDE: u32 = 4;

/// Minimum per-cell score for a detector cell to produce a candidate box.
pub const EAST_SCORE_THRESHOLD: f32 = 0.5;

/// Maximum IoU between kept boxes during non-max suppression.
pub const EAST_NMS_IOU_THRESHOLD: f32 = 0.30;

/// Text-coverage ratio at or above which an image is considered text-heavy.
pub const TEXT_COVERAGE_THRESHOLD: f32 = 0.25;

/// Minimum normalized transcript length for the OCR route.
pub const OCR_MIN_CHARS: usize = 20;

/// Minimum mean per-token OCR confidence for the OCR route.
pub const OCR_MIN_CONFIDENCE: f32 = 55.0;

/// Token Dice similarity at or above which two transcripts match.
pub const OCR_SIMILARITY_THRESHOLD: f32 = 0.80;

/// Cosine similarity at or above which two embeddings match.
pub const SIMILARITY_THRESHOLD: f32 = 0.96;

/// Trailing window within which prior posts are duplicate candidates.
pub const DEDUP_WINDOW_DAYS: i64 = 30;

/// Maximum number of keyframes extracted from motion media.
pub const MAX_MOTION_KEYFRAMES: usize = 5;

/// Only the first portion of a video is scanned for keyframes, in seconds.
pub const MOTION_SCAN_SECONDS: u32 = 15;

/// Distinct matched frame pairs required to declare a motion duplicate.
/// Requiring two independent matches instead of one suppresses false
/// positives from recurring video backgrounds; tunable, not a wire constant.
pub const MOTION_REQUIRED_FRAME_MATCHES: usize = 2;

/// Hard timeout for one OCR process invocation.
pub const OCR_TIMEOUT_SECS: u64 = 10;

/// Hard timeout for the keyframe extraction process.
pub const FRAME_EXTRACT_TIMEOUT_SECS: u64 = 20;

/// Transcript length cap used by the OCR quality heuristic.
pub const OCR_QUALITY_LENGTH_CAP: usize = 200;

/// Posts created at or after this instant store embeddings as int8-quantized
/// bytes; older rows are raw little-endian f32. Historical fact, not a knob.
pub static QUANT_SCHEMA_CUTOFF: Lazy<DateTime<Utc>> =
    Lazy::new(|| Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap());
