use anyhow::Result;

/// Magnitudes below this are treated as zero vectors.
pub const MIN_MAGNITUDE: f32 = f32::EPSILON;

/// L2 norm of a vector.
pub fn magnitude(vec: &[f32]) -> f32 {
    vec.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Inner product of two equal-length vectors.
///
/// On unit vectors this is the cosine similarity.
pub fn dot(vec1: &[f32], vec2: &[f32]) -> f32 {
    vec1.iter().zip(vec2.iter()).map(|(a, b)| a * b).sum()
}

/// Calculate cosine similarity directly between two vectors
///
/// # Arguments
/// * `vec1` - First vector
/// * `vec2` - Second vector
///
/// # Returns
/// * `Result<f32>` - The cosine similarity or an error
pub fn calculate_direct_similarity(vec1: &[f32], vec2: &[f32]) -> Result<f32> {
    if vec1.len() != vec2.len() {
        return Err(anyhow::anyhow!(
            "Vector dimensions don't match: {} vs {}",
            vec1.len(),
            vec2.len()
        ));
    }

    let mag1 = magnitude(vec1);
    let mag2 = magnitude(vec2);

    if mag1 < MIN_MAGNITUDE || mag2 < MIN_MAGNITUDE {
        return Err(anyhow::anyhow!("Zero magnitude vector detected"));
    }

    Ok(dot(vec1, vec2) / (mag1 * mag2))
}

/// Scales a vector to unit length, or `None` if it has (near) zero magnitude.
pub fn unit_vector(vec: &[f32]) -> Option<Vec<f32>> {
    let mag = magnitude(vec);
    if !mag.is_finite() || mag < MIN_MAGNITUDE {
        return None;
    }
    Some(vec.iter().map(|x| x / mag).collect())
}

/// Unit-normalized mean of a set of equal-length vectors.
///
/// Accumulates in f64 so the result does not depend on summation drift.
/// Returns `None` for an empty set or when the mean cancels out to zero.
pub fn normalized_centroid<'a, I>(vectors: I) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut sum: Vec<f64> = Vec::new();
    let mut count = 0usize;

    for vec in vectors {
        if sum.is_empty() {
            sum = vec![0.0; vec.len()];
        }
        if vec.len() != sum.len() {
            return None;
        }
        for (acc, x) in sum.iter_mut().zip(vec.iter()) {
            *acc += *x as f64;
        }
        count += 1;
    }

    if count == 0 {
        return None;
    }

    let mean: Vec<f32> = sum.iter().map(|x| (x / count as f64) as f32).collect();
    unit_vector(&mean)
}
