//! SQLite-backed post record store.
//!
//! Feature rows live in `media_features`, embedding vectors in
//! `media_embeddings` (slot 0 for images, one slot per keyframe for motion
//! media). Vectors are stored in the schema-versioned byte encoding from
//! `dejavu_core::codec`; the post timestamp picks the codec on read.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use dejavu_core::error::IntoCoreError;
use dejavu_core::{codec, Candidate, ChatRef, Error, MediaFeatures, MediaKind, PostRef, Result};

use crate::PostStore;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Post record store over a SQLite pool.
#[derive(Clone)]
pub struct SqlitePostStore {
    pool: SqlitePool,
}

impl SqlitePostStore {
    /// Wrap an existing pool. The caller is responsible for migrations.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `path`, run migrations,
    /// and return a store over a WAL-mode pool.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .storage_context("open post store")?;

        MIGRATOR
            .run(&pool)
            .await
            .storage_context("run post store migrations")?;

        info!("post store ready at {:?}", path.as_ref());
        Ok(Self { pool })
    }

    /// Run migrations against an externally created pool (tests use this
    /// with `sqlite::memory:`).
    pub async fn migrate(pool: &SqlitePool) -> Result<()> {
        MIGRATOR
            .run(pool)
            .await
            .storage_context("run post store migrations")
    }
}

#[async_trait]
impl PostStore for SqlitePostStore {
    async fn write_features(
        &self,
        post: PostRef,
        posted_at: DateTime<Utc>,
        features: &MediaFeatures,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .storage_context("begin feature write")?;

        match features {
            MediaFeatures::Image {
                text_coverage,
                is_text_heavy,
                ocr_text,
                ocr_confidence,
                ..
            } => {
                sqlx::query(
                    "INSERT INTO media_features \
                     (chat_id, message_id, media_kind, posted_at, text_coverage, is_text_heavy, ocr_text, ocr_confidence) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                     ON CONFLICT (chat_id, message_id) DO UPDATE SET \
                     media_kind = excluded.media_kind, posted_at = excluded.posted_at, \
                     text_coverage = excluded.text_coverage, is_text_heavy = excluded.is_text_heavy, \
                     ocr_text = excluded.ocr_text, ocr_confidence = excluded.ocr_confidence",
                )
                .bind(post.chat_id)
                .bind(post.message_id)
                .bind(MediaKind::Image.as_str())
                .bind(posted_at.timestamp_millis())
                .bind(*text_coverage as f64)
                .bind(*is_text_heavy)
                .bind(ocr_text.as_deref())
                .bind(ocr_confidence.map(|c| c as f64))
                .execute(&mut *tx)
                .await
                .storage_context("upsert image features")?;
            }
            MediaFeatures::Motion { .. } => {
                // Text and OCR columns are explicitly cleared for motion media.
                sqlx::query(
                    "INSERT INTO media_features \
                     (chat_id, message_id, media_kind, posted_at, text_coverage, is_text_heavy, ocr_text, ocr_confidence) \
                     VALUES (?1, ?2, ?3, ?4, NULL, NULL, NULL, NULL) \
                     ON CONFLICT (chat_id, message_id) DO UPDATE SET \
                     media_kind = excluded.media_kind, posted_at = excluded.posted_at, \
                     text_coverage = NULL, is_text_heavy = NULL, \
                     ocr_text = NULL, ocr_confidence = NULL",
                )
                .bind(post.chat_id)
                .bind(post.message_id)
                .bind(MediaKind::Motion.as_str())
                .bind(posted_at.timestamp_millis())
                .execute(&mut *tx)
                .await
                .storage_context("upsert motion features")?;
            }
        }

        sqlx::query("DELETE FROM media_embeddings WHERE chat_id = ?1 AND message_id = ?2")
            .bind(post.chat_id)
            .bind(post.message_id)
            .execute(&mut *tx)
            .await
            .storage_context("clear old embeddings")?;

        for (slot, vector) in features.embeddings().into_iter().enumerate() {
            sqlx::query(
                "INSERT INTO media_embeddings (chat_id, message_id, slot, vector) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(post.chat_id)
            .bind(post.message_id)
            .bind(slot as i64)
            .bind(codec::encode(vector))
            .execute(&mut *tx)
            .await
            .storage_context("insert embedding slot")?;
        }

        tx.commit().await.storage_context("commit feature write")
    }

    async fn query_candidates(
        &self,
        chat: ChatRef,
        exclude: PostRef,
        kind: MediaKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<Candidate>> {
        let rows = sqlx::query(
            "SELECT chat_id, message_id, media_kind, posted_at, text_coverage, is_text_heavy, ocr_text, ocr_confidence \
             FROM media_features \
             WHERE chat_id = ?1 AND message_id != ?2 \
               AND posted_at >= ?3 \
               AND (media_kind = ?4 OR (media_kind IS NULL AND ?4 = 'image')) \
             ORDER BY posted_at DESC",
        )
        .bind(chat.0)
        .bind(exclude.message_id)
        .bind(since.timestamp_millis())
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .storage_context("query candidates")?;

        let mut stored_vectors = self.load_candidate_blobs(chat, exclude, kind, since).await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let post = PostRef::new(
                row.try_get("chat_id").storage_context("read chat_id")?,
                row.try_get("message_id")
                    .storage_context("read message_id")?,
            );
            let posted_ms: i64 = row.try_get("posted_at").storage_context("read posted_at")?;
            let posted_at = Utc
                .timestamp_millis_opt(posted_ms)
                .single()
                .ok_or_else(|| {
                    Error::MalformedData(format!("post timestamp {} out of range", posted_ms))
                })?;

            let blobs = stored_vectors.remove(&post.message_id).unwrap_or_default();
            let vectors = match decode_vectors(blobs, posted_at) {
                Ok(vectors) => vectors,
                Err(e) => {
                    // Malformed stored vectors only cost us this candidate.
                    warn!("skipping candidate {:?}: {}", post, e);
                    continue;
                }
            };

            let stored_kind: Option<String> = row
                .try_get("media_kind")
                .storage_context("read media_kind")?;
            let features = match MediaKind::from_stored(stored_kind.as_deref()) {
                MediaKind::Image => {
                    let text_coverage: Option<f64> = row
                        .try_get("text_coverage")
                        .storage_context("read text_coverage")?;
                    let is_text_heavy: Option<bool> = row
                        .try_get("is_text_heavy")
                        .storage_context("read is_text_heavy")?;
                    let ocr_text: Option<String> =
                        row.try_get("ocr_text").storage_context("read ocr_text")?;
                    let ocr_confidence: Option<f64> = row
                        .try_get("ocr_confidence")
                        .storage_context("read ocr_confidence")?;
                    MediaFeatures::Image {
                        embedding: vectors.into_iter().next(),
                        text_coverage: text_coverage.unwrap_or(0.0) as f32,
                        is_text_heavy: is_text_heavy.unwrap_or(false),
                        ocr_text,
                        ocr_confidence: ocr_confidence.map(|c| c as f32),
                    }
                }
                MediaKind::Motion => MediaFeatures::Motion {
                    embeddings: vectors,
                },
            };

            candidates.push(Candidate {
                post,
                posted_at,
                features,
            });
        }

        Ok(candidates)
    }
}

impl SqlitePostStore {
    /// Fetch the stored vectors for every candidate in one query, keyed by
    /// message id. The global slot ordering keeps each post's keyframes in
    /// slot order.
    async fn load_candidate_blobs(
        &self,
        chat: ChatRef,
        exclude: PostRef,
        kind: MediaKind,
        since: DateTime<Utc>,
    ) -> Result<HashMap<i64, Vec<Vec<u8>>>> {
        let rows = sqlx::query(
            "SELECT e.message_id, e.vector \
             FROM media_embeddings e \
             JOIN media_features f \
               ON f.chat_id = e.chat_id AND f.message_id = e.message_id \
             WHERE f.chat_id = ?1 AND f.message_id != ?2 \
               AND f.posted_at >= ?3 \
               AND (f.media_kind = ?4 OR (f.media_kind IS NULL AND ?4 = 'image')) \
             ORDER BY e.slot ASC",
        )
        .bind(chat.0)
        .bind(exclude.message_id)
        .bind(since.timestamp_millis())
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .storage_context("load candidate embeddings")?;

        let mut blobs: HashMap<i64, Vec<Vec<u8>>> = HashMap::new();
        for row in rows {
            let message_id: i64 = row
                .try_get("message_id")
                .storage_context("read embedding message_id")?;
            let blob: Vec<u8> = row.try_get("vector").storage_context("read vector blob")?;
            blobs.entry(message_id).or_default().push(blob);
        }
        Ok(blobs)
    }
}

fn decode_vectors(blobs: Vec<Vec<u8>>, posted_at: DateTime<Utc>) -> Result<Vec<Vec<f32>>> {
    blobs
        .iter()
        .map(|blob| codec::decode(blob, posted_at))
        .collect()
}
