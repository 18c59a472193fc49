use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::VectorError;
use crate::vector::similarity::{magnitude, MIN_MAGNITUDE};
use crate::TARGET_VECTOR;

/// Outcome of normalizing one batch of embeddings.
#[derive(Debug, Default)]
pub struct PreprocessedBatch {
    /// Dimension every accepted vector has, `None` if nothing was accepted
    pub dimension: Option<usize>,
    /// (input position, unit vector) in input order
    pub accepted: Vec<(usize, Vec<f32>)>,
    pub rejected: Vec<VectorError>,
}

/// Scales a single embedding to unit L2 norm.
///
/// # Arguments
/// * `article_id` - Article the embedding belongs to, used in errors
/// * `embedding` - Raw embedding
/// * `expected_dimension` - Dimension required for this window
///
/// # Returns
/// * `Ok(Vec<f32>)` - The unit vector
/// * `Err(VectorError)` - Missing, mis-sized, non-finite or zero embedding
pub fn normalize_embedding(
    article_id: &str,
    embedding: &[f32],
    expected_dimension: usize,
) -> Result<Vec<f32>, VectorError> {
    if embedding.is_empty() {
        return Err(VectorError::MissingEmbedding {
            article_id: article_id.to_string(),
        });
    }

    if embedding.len() != expected_dimension {
        return Err(VectorError::DimensionMismatch {
            article_id: article_id.to_string(),
            expected: expected_dimension,
            actual: embedding.len(),
        });
    }

    if embedding.iter().any(|x| !x.is_finite()) {
        return Err(VectorError::NonFinite {
            article_id: article_id.to_string(),
        });
    }

    let norm = magnitude(embedding);
    if !norm.is_finite() || norm < MIN_MAGNITUDE {
        return Err(VectorError::DegenerateVector {
            article_id: article_id.to_string(),
        });
    }

    Ok(embedding.iter().map(|x| x / norm).collect())
}

/// Picks the window dimension when none is configured: the most common
/// non-zero length, ties going to the smaller dimension.
pub fn infer_dimension<'a, I>(embeddings: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for embedding in embeddings {
        if !embedding.is_empty() {
            *counts.entry(embedding.len()).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .fold(None, |best: Option<(usize, usize)>, (dim, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((dim, count)),
        })
        .map(|(dim, _)| dim)
}

/// Normalizes every embedding of a batch, excluding the ones that break the contract.
///
/// Never fails as a whole: each rejected article is logged and returned in `rejected`.
///
/// # Arguments
/// * `items` - (article_id, raw embedding) pairs in input order
/// * `expected_dimension` - Configured dimension, or `None` to infer it from the batch
pub fn preprocess_batch(
    items: &[(&str, &[f32])],
    expected_dimension: Option<usize>,
) -> PreprocessedBatch {
    let dimension =
        expected_dimension.or_else(|| infer_dimension(items.iter().map(|(_, e)| *e)));

    let Some(dimension) = dimension else {
        // Nothing in the batch has an embedding at all
        let rejected: Vec<VectorError> = items
            .iter()
            .map(|(article_id, _)| VectorError::MissingEmbedding {
                article_id: article_id.to_string(),
            })
            .collect();
        for err in &rejected {
            warn!(target: TARGET_VECTOR, "Excluding article from clustering: {}", err);
        }
        return PreprocessedBatch {
            dimension: None,
            accepted: Vec::new(),
            rejected,
        };
    };

    let mut batch = PreprocessedBatch {
        dimension: Some(dimension),
        ..Default::default()
    };

    for (position, (article_id, embedding)) in items.iter().enumerate() {
        match normalize_embedding(article_id, embedding, dimension) {
            Ok(unit) => batch.accepted.push((position, unit)),
            Err(err) => {
                warn!(target: TARGET_VECTOR, "Excluding article from clustering: {}", err);
                batch.rejected.push(err);
            }
        }
    }

    if batch.accepted.is_empty() {
        batch.dimension = None;
    }

    debug!(
        target: TARGET_VECTOR,
        "Preprocessed {} embeddings: {} accepted, {} rejected, dimension {}",
        items.len(),
        batch.accepted.len(),
        batch.rejected.len(),
        dimension
    );

    batch
}
