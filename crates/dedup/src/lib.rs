//! Near-duplicate media detection pipeline for Dejavu
//!
//! For every newly posted image or short video, decide off the
//! message-handling path whether the same content was already posted in
//! the chat within the dedup window, and if so ask the notifier to reply
//! with a link to the earlier post.
//!
//! Message handlers call [`SubmitHandle::submit`] and return immediately; a
//! single background worker fetches the media, extracts features (visual
//! embedding, text coverage, OCR transcript, or per-keyframe embeddings for
//! motion media), persists them on the post record, and scans same-chat
//! candidates for a match.

pub mod detector;
pub mod east;
pub mod encoder;
pub mod extract;
pub mod matcher;
pub mod motion;
pub mod ocr;
pub mod pipeline;
pub mod queue;

// Re-exports for convenience
pub use detector::{DetectionGrid, TextDetector};
pub use encoder::{ClipEncoder, VisionEncoder};
pub use extract::ImageExtractor;
pub use pipeline::Pipeline;
pub use queue::{Dispatcher, SubmitHandle};
