//! Candidate matching and route selection.
//!
//! Given a freshly extracted feature set and the same-chat candidate list
//! (newest first), pick the duplicate-detection route and return the first
//! candidate that clears its threshold.

use tracing::debug;

use dejavu_core::constants::{
    MOTION_REQUIRED_FRAME_MATCHES, OCR_SIMILARITY_THRESHOLD, SIMILARITY_THRESHOLD,
};
use dejavu_core::similarity::{cosine_similarity, token_dice_similarity};
use dejavu_core::{Candidate, MediaFeatures, PostRef};

use crate::extract::should_use_ocr_route;

/// Find the first prior post that duplicates the given features.
///
/// Candidates are scanned in the order given (newest first) and the scan
/// short-circuits on the first hit. The match is purely advisory; nothing is
/// written as a result.
pub fn find_duplicate(features: &MediaFeatures, candidates: &[Candidate]) -> Option<PostRef> {
    match features {
        MediaFeatures::Image {
            embedding,
            text_coverage,
            ocr_text,
            ocr_confidence,
            ..
        } => {
            if let Some(text) = ocr_text {
                let confidence = ocr_confidence.unwrap_or(0.0);
                if should_use_ocr_route(*text_coverage, text, confidence) {
                    if let Some(hit) = match_by_transcript(text, candidates) {
                        return Some(hit);
                    }
                    // No transcript hit: fall through to the visual route.
                }
            }

            let embedding = embedding.as_ref()?;
            match_by_embedding(embedding, candidates)
        }
        MediaFeatures::Motion { embeddings } => match_motion(embeddings, candidates),
    }
}

fn match_by_transcript(text: &str, candidates: &[Candidate]) -> Option<PostRef> {
    for candidate in candidates {
        let MediaFeatures::Image {
            ocr_text: Some(stored),
            ..
        } = &candidate.features
        else {
            continue;
        };

        let similarity = token_dice_similarity(text, stored);
        if similarity >= OCR_SIMILARITY_THRESHOLD {
            debug!(
                "transcript match against {:?} at {:.3}",
                candidate.post, similarity
            );
            return Some(candidate.post);
        }
    }
    None
}

fn match_by_embedding(embedding: &[f32], candidates: &[Candidate]) -> Option<PostRef> {
    for candidate in candidates {
        let MediaFeatures::Image {
            embedding: Some(stored),
            ..
        } = &candidate.features
        else {
            continue;
        };

        // Dimension mismatch (model change) skips just this candidate.
        let Some(similarity) = cosine_similarity(embedding, stored) else {
            continue;
        };
        if similarity >= SIMILARITY_THRESHOLD {
            debug!(
                "embedding match against {:?} at {:.4}",
                candidate.post, similarity
            );
            return Some(candidate.post);
        }
    }
    None
}

fn match_motion(embeddings: &[Vec<f32>], candidates: &[Candidate]) -> Option<PostRef> {
    // A single keyframe is judged insufficient signal on either side.
    if embeddings.len() < 2 {
        return None;
    }

    for candidate in candidates {
        let MediaFeatures::Motion { embeddings: stored } = &candidate.features else {
            continue;
        };
        if stored.len() < 2 {
            continue;
        }
        if has_distinct_frame_matches(embeddings, stored, MOTION_REQUIRED_FRAME_MATCHES) {
            debug!("motion match against {:?}", candidate.post);
            return Some(candidate.post);
        }
    }
    None
}

/// Greedily pair incoming frames to distinct stored frames by cosine
/// similarity; true once `required` independent pairs are found. Requiring
/// more than one pair suppresses false positives from recurring backgrounds.
pub fn has_distinct_frame_matches(
    incoming: &[Vec<f32>],
    stored: &[Vec<f32>],
    required: usize,
) -> bool {
    let mut used = vec![false; stored.len()];
    let mut matched = 0usize;

    for frame in incoming {
        for (index, candidate_frame) in stored.iter().enumerate() {
            if used[index] {
                continue;
            }
            let Some(similarity) = cosine_similarity(frame, candidate_frame) else {
                continue;
            };
            if similarity >= SIMILARITY_THRESHOLD {
                used[index] = true;
                matched += 1;
                break;
            }
        }
        if matched >= required {
            return true;
        }
    }
    false
}

/// The advisory reply posted when a duplicate is found.
pub fn duplicate_notice(matched: PostRef) -> String {
    format!(
        "Seen before: https://t.me/c/{}/{}",
        matched.chat_id, matched.message_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dejavu_core::Candidate;

    fn image_candidate(message_id: i64, embedding: Vec<f32>, ocr_text: Option<&str>) -> Candidate {
        Candidate {
            post: PostRef::new(1, message_id),
            posted_at: Utc::now(),
            features: MediaFeatures::Image {
                embedding: Some(embedding),
                text_coverage: if ocr_text.is_some() { 0.4 } else { 0.0 },
                is_text_heavy: ocr_text.is_some(),
                ocr_text: ocr_text.map(String::from),
                ocr_confidence: ocr_text.map(|_| 80.0),
            },
        }
    }

    fn motion_candidate(message_id: i64, embeddings: Vec<Vec<f32>>) -> Candidate {
        Candidate {
            post: PostRef::new(1, message_id),
            posted_at: Utc::now(),
            features: MediaFeatures::Motion { embeddings },
        }
    }

    #[test]
    fn test_ocr_route_matches_transcript() {
        let features = MediaFeatures::Image {
            embedding: Some(vec![1.0, 0.0]),
            text_coverage: 0.4,
            is_text_heavy: true,
            ocr_text: Some("this caption is long enough to route".to_string()),
            ocr_confidence: Some(90.0),
        };
        // Visually unrelated but textually identical.
        let candidates = vec![image_candidate(
            7,
            vec![0.0, 1.0],
            Some("this caption is long enough to route"),
        )];

        assert_eq!(
            find_duplicate(&features, &candidates),
            Some(PostRef::new(1, 7))
        );
    }

    #[test]
    fn test_ocr_route_falls_back_to_embedding() {
        let features = MediaFeatures::Image {
            embedding: Some(vec![1.0, 0.0]),
            text_coverage: 0.4,
            is_text_heavy: true,
            ocr_text: Some("completely different words in this long caption".to_string()),
            ocr_confidence: Some(90.0),
        };
        // Transcript misses, embedding hits.
        let candidates = vec![image_candidate(
            3,
            vec![1.0, 0.0],
            Some("nothing in common with the incoming transcript text"),
        )];

        assert_eq!(
            find_duplicate(&features, &candidates),
            Some(PostRef::new(1, 3))
        );
    }

    #[test]
    fn test_embedding_route_skips_dimension_mismatch() {
        let features = MediaFeatures::Image {
            embedding: Some(vec![1.0, 0.0]),
            text_coverage: 0.0,
            is_text_heavy: false,
            ocr_text: None,
            ocr_confidence: None,
        };
        let candidates = vec![
            image_candidate(2, vec![1.0, 0.0, 0.0], None),
            image_candidate(4, vec![1.0, 0.0], None),
        ];

        assert_eq!(
            find_duplicate(&features, &candidates),
            Some(PostRef::new(1, 4))
        );
    }

    #[test]
    fn test_first_hit_wins_newest_first() {
        let features = MediaFeatures::Image {
            embedding: Some(vec![1.0, 0.0]),
            text_coverage: 0.0,
            is_text_heavy: false,
            ocr_text: None,
            ocr_confidence: None,
        };
        let candidates = vec![
            image_candidate(9, vec![1.0, 0.0], None),
            image_candidate(2, vec![1.0, 0.0], None),
        ];

        assert_eq!(
            find_duplicate(&features, &candidates),
            Some(PostRef::new(1, 9))
        );
    }

    #[test]
    fn test_motion_requires_two_distinct_pairs() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let c = vec![0.0, 0.0, 1.0];

        // Only one incoming frame matches: no duplicate, even at sim 1.0.
        let features = MediaFeatures::Motion {
            embeddings: vec![a.clone(), b.clone()],
        };
        let one_common = vec![motion_candidate(5, vec![a.clone(), c.clone()])];
        assert_eq!(find_duplicate(&features, &one_common), None);

        // Two distinct pairs: duplicate.
        let two_common = vec![motion_candidate(6, vec![b.clone(), a.clone()])];
        assert_eq!(
            find_duplicate(&features, &two_common),
            Some(PostRef::new(1, 6))
        );
    }

    #[test]
    fn test_motion_single_keyframe_never_matches() {
        let a = vec![1.0, 0.0];
        let features = MediaFeatures::Motion {
            embeddings: vec![a.clone(), a.clone()],
        };
        // Candidate with one stored keyframe is skipped regardless of
        // similarity.
        let candidates = vec![motion_candidate(8, vec![a.clone()])];
        assert_eq!(find_duplicate(&features, &candidates), None);

        // And an incoming single-frame item never matches anything.
        let single = MediaFeatures::Motion {
            embeddings: vec![a.clone()],
        };
        let full = vec![motion_candidate(9, vec![a.clone(), a.clone()])];
        assert_eq!(find_duplicate(&single, &full), None);
    }

    #[test]
    fn test_distinct_pairs_do_not_reuse_stored_frame() {
        let a = vec![1.0, 0.0];
        // Two incoming frames both similar to the single stored frame: the
        // greedy pairing may not count the same stored frame twice.
        assert!(!has_distinct_frame_matches(
            &[a.clone(), a.clone()],
            &[a.clone()],
            2
        ));
        assert!(has_distinct_frame_matches(
            &[a.clone(), a.clone()],
            &[a.clone(), a.clone()],
            2
        ));
    }

    #[test]
    fn test_duplicate_notice_links_matched_post() {
        let text = duplicate_notice(PostRef::new(123, 456));
        assert!(text.contains("123/456"));
    }
}
