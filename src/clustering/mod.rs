// Module declarations
pub mod hdbscan;
pub mod types;

pub use hdbscan::{ClusterSelectionMethod, DistanceMetric, Hdbscan, HdbscanParams};
pub use types::*;

use anyhow::Result;

/// Label given to points that belong to no cluster
pub const NOISE_LABEL: i32 = -1;

/// A density-based clustering algorithm over unit vectors.
///
/// Implementations must be deterministic: identical vectors in identical order
/// yield identical labels.
pub trait DensityClusterer: Send + Sync {
    /// Returns one label per vector, `NOISE_LABEL` for unclustered points.
    fn cluster(&self, vectors: &[Vec<f32>]) -> Result<Vec<i32>>;

    /// Stable description of the algorithm and its parameters, mixed into story ids.
    fn fingerprint(&self) -> String;
}
