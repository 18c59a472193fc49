use super::types::{ClusterMember, UNTITLED_STORY};
use crate::vector::similarity::calculate_direct_similarity;

/// Similarity scores closer than this to the best one count as a tie
pub const TITLE_TIE_EPSILON: f32 = 1e-6;

/// Picks the headline of the article closest to the story centroid.
///
/// Ties go to the earliest published article, then the smallest id. Articles
/// with blank headlines are never picked.
///
/// # Arguments
/// * `members` - The story's articles with their unit vectors
/// * `centroid` - Normalized story centroid, `None` when it was degenerate
///
/// # Returns
/// * `String` - The chosen headline, or `"Untitled Story"` if none is usable
pub fn select_title(members: &[ClusterMember<'_>], centroid: Option<&[f32]>) -> String {
    let titled: Vec<&ClusterMember<'_>> = members
        .iter()
        .filter(|m| !m.article.headline.trim().is_empty())
        .collect();

    let earliest = |candidates: &[&ClusterMember<'_>]| {
        candidates
            .iter()
            .min_by(|a, b| a.chronological_key().cmp(&b.chronological_key()))
            .map(|m| m.article.headline.trim().to_string())
    };

    let scored: Vec<(&ClusterMember<'_>, f32)> = match centroid {
        Some(centroid) => titled
            .iter()
            .filter_map(|m| {
                calculate_direct_similarity(m.vector, centroid)
                    .ok()
                    .map(|score| (*m, score))
            })
            .collect(),
        None => Vec::new(),
    };

    let title = match scored.iter().map(|(_, s)| *s).reduce(f32::max) {
        Some(best) => {
            let tied: Vec<&ClusterMember<'_>> = scored
                .iter()
                .filter(|(_, s)| best - *s <= TITLE_TIE_EPSILON)
                .map(|(m, _)| *m)
                .collect();
            earliest(&tied)
        }
        None => earliest(&titled),
    };

    title.unwrap_or_else(|| UNTITLED_STORY.to_string())
}
