//! Per-item processing: fetch, extract, persist, match, notify.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};

use dejavu_core::constants::DEDUP_WINDOW_DAYS;
use dejavu_core::{Error, MediaFeatures, MediaKind, Result, WorkItem};
use dejavu_store::{BlobStore, Notifier, PostStore};

use crate::extract::ImageExtractor;
use crate::matcher;
use crate::motion;

/// The media deduplication pipeline.
///
/// Owns the extractor (and through it the shared model handles) plus the
/// three collaborator seams. One instance is shared by the single worker
/// task; all state is immutable after construction.
pub struct Pipeline {
    extractor: ImageExtractor,
    blobs: Arc<dyn BlobStore>,
    posts: Arc<dyn PostStore>,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    /// Assemble a pipeline over loaded models and collaborators.
    pub fn new(
        extractor: ImageExtractor,
        blobs: Arc<dyn BlobStore>,
        posts: Arc<dyn PostStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            extractor,
            blobs,
            posts,
            notifier,
        }
    }

    /// Process one submitted item end to end.
    ///
    /// Any error aborts this item only; the worker loop logs it and moves
    /// on. A found duplicate results in one advisory reply and no store
    /// mutation.
    pub async fn process(&self, item: &WorkItem) -> Result<()> {
        let bytes = self.blobs.fetch(&item.media).await?;
        debug!("fetched {} bytes for {:?}", bytes.len(), item.post);

        let features = match item.kind {
            MediaKind::Image => self.extractor.extract(&bytes).await?,
            MediaKind::Motion => self.extract_motion(&bytes).await?,
        };

        self.posts
            .write_features(item.post, item.posted_at, &features)
            .await?;

        let since = item.posted_at - Duration::days(DEDUP_WINDOW_DAYS);
        let candidates = self
            .posts
            .query_candidates(item.chat, item.post, item.kind, since)
            .await?;
        debug!(
            "{} candidates for {:?} within window",
            candidates.len(),
            item.post
        );

        if let Some(matched) = matcher::find_duplicate(&features, &candidates) {
            info!("{:?} duplicates {:?}", item.post, matched);
            let text = matcher::duplicate_notice(matched);
            // Notification is best-effort; a failed reply is not a failed
            // item.
            if let Err(e) = self.notifier.reply_once(item.chat, item.post, &text).await {
                warn!("failed to post duplicate notice: {}", e);
            }
        }

        Ok(())
    }

    async fn extract_motion(&self, bytes: &[u8]) -> Result<MediaFeatures> {
        let frames = motion::extract_keyframes(bytes).await?;
        if frames.is_empty() {
            return Err(Error::Decode("no keyframes extracted".to_string()));
        }

        let mut embeddings = Vec::with_capacity(frames.len());
        for frame in frames {
            embeddings.push(self.extractor.embed(frame).await?);
        }
        Ok(MediaFeatures::Motion { embeddings })
    }
}
