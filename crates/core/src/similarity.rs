//! Similarity math and transcript normalization.
//!
//! Pure functions shared by the extractor (normalization) and the matcher
//! (cosine and token Dice similarity).

use std::collections::HashSet;

/// Cosine similarity between two vectors.
///
/// Returns `None` when the dimensions differ or either vector has zero norm,
/// so the caller can skip a malformed candidate instead of failing the item.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Token Dice similarity between two normalized transcripts.
///
/// Both sides are tokenized on whitespace into sets; the result is
/// `2·|A∩B| / (|A|+|B|)`. Empty input on either side yields 0.
pub fn token_dice_similarity(a: &str, b: &str) -> f32 {
    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let common = tokens_a.intersection(&tokens_b).count();
    (2 * common) as f32 / (tokens_a.len() + tokens_b.len()) as f32
}

/// Normalize an OCR transcript for storage and comparison.
///
/// Lowercases, replaces every non-alphanumeric character with a space, and
/// collapses whitespace runs to a single space. Idempotent.
pub fn normalize_transcript(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_space = true;
        }
    }
    out
}
