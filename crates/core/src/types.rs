//! Shared data types for the Dejavu pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of media a post carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A still image (photo, sticker, meme).
    Image,
    /// A video or animation.
    Motion,
}

impl MediaKind {
    /// Stable string form used in the post store.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Motion => "motion",
        }
    }

    /// Parse the stored string form. Legacy rows with no kind are `Image`.
    pub fn from_stored(raw: Option<&str>) -> MediaKind {
        match raw {
            Some("motion") => MediaKind::Motion,
            _ => MediaKind::Image,
        }
    }
}

/// Opaque handle to media bytes in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaRef(pub String);

/// Identifies a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatRef(pub i64);

/// Compound key identifying one post inside a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostRef {
    /// Chat the post belongs to.
    pub chat_id: i64,
    /// Message id within the chat.
    pub message_id: i64,
}

impl PostRef {
    /// Create a post reference.
    pub fn new(chat_id: i64, message_id: i64) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

/// One unit of work for the background dispatcher. Created on submit,
/// consumed exactly once, never persisted.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Handle to the media bytes.
    pub media: MediaRef,
    /// Image or motion processing path.
    pub kind: MediaKind,
    /// Chat the post was made in.
    pub chat: ChatRef,
    /// The post itself.
    pub post: PostRef,
    /// Post creation time, immutable. Drives the dedup window and the
    /// embedding codec version for this post's rows.
    pub posted_at: DateTime<Utc>,
}

/// Derived features attached to a post, written once by the extractor.
///
/// Modeled as a sum type so the matcher dispatches on the kind exactly once
/// instead of re-checking it per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaFeatures {
    /// Features of a still image.
    Image {
        /// Unit-norm visual embedding; `None` only on legacy rows whose
        /// payload failed to decode.
        embedding: Option<Vec<f32>>,
        /// Fraction of image area covered by detected text boxes.
        text_coverage: f32,
        /// Whether `text_coverage` crossed the text-heavy threshold.
        is_text_heavy: bool,
        /// Normalized OCR transcript, present only when OCR succeeded.
        ocr_text: Option<String>,
        /// Mean per-token OCR confidence for the winning pass.
        ocr_confidence: Option<f32>,
    },
    /// Features of a video or animation: one embedding per keyframe.
    Motion {
        /// Ordered unit-norm keyframe embeddings, at most
        /// [`crate::constants::MAX_MOTION_KEYFRAMES`] of them.
        embeddings: Vec<Vec<f32>>,
    },
}

impl MediaFeatures {
    /// The media kind this feature set belongs to.
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaFeatures::Image { .. } => MediaKind::Image,
            MediaFeatures::Motion { .. } => MediaKind::Motion,
        }
    }

    /// All embeddings carried by this feature set, in order.
    pub fn embeddings(&self) -> Vec<&Vec<f32>> {
        match self {
            MediaFeatures::Image { embedding, .. } => embedding.iter().collect(),
            MediaFeatures::Motion { embeddings } => embeddings.iter().collect(),
        }
    }
}

/// A prior post returned by the candidate query, newest first.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The prior post.
    pub post: PostRef,
    /// Its creation time; selects the codec for its stored vectors.
    pub posted_at: DateTime<Utc>,
    /// Its decoded feature subset.
    pub features: MediaFeatures,
}
