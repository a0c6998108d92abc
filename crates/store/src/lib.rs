//! Collaborator interfaces and storage for Dejavu
//!
//! The pipeline talks to the outside world through three seams: a blob store
//! that fetches media bytes, a post record store that holds derived features,
//! and a notifier that posts advisory replies. This crate defines those
//! traits and provides the SQLite-backed post store and an HTTP blob fetcher.

pub mod blob;
pub mod posts;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dejavu_core::{Candidate, ChatRef, MediaFeatures, MediaKind, MediaRef, PostRef, Result};

pub use blob::HttpBlobStore;
pub use posts::SqlitePostStore;

/// Fetches media payloads by opaque reference.
///
/// Payloads range from sub-MB images to tens-of-MB video clips; failures are
/// transient and abort only the current work item.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the full payload into memory.
    async fn fetch(&self, media: &MediaRef) -> Result<Vec<u8>>;
}

/// Post record store: the pipeline writes derived features onto existing
/// post rows and reads back same-chat candidates.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Upsert the derived features for one post. Idempotent; reprocessing a
    /// post overwrites its previous features.
    async fn write_features(
        &self,
        post: PostRef,
        posted_at: DateTime<Utc>,
        features: &MediaFeatures,
    ) -> Result<()>;

    /// Prior posts in the same chat with matching kind (legacy rows with no
    /// kind count as `Image`) and a creation time within the window,
    /// excluding the post being processed, newest first.
    async fn query_candidates(
        &self,
        chat: ChatRef,
        exclude: PostRef,
        kind: MediaKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<Candidate>>;
}

/// Posts an advisory reply in the chat. Best-effort: the pipeline logs
/// failures and never propagates them.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Reply to `post` in `chat` with `text`.
    async fn reply_once(&self, chat: ChatRef, post: PostRef, text: &str) -> Result<()>;
}
