use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::NOISE_LABEL;

/// Counts describing one clustering run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub total: usize,
    /// Articles that failed preprocessing and never reached the clusterer
    pub excluded: usize,
    pub clustered: usize,
    /// Unclustered articles, excluded ones included
    pub noise: usize,
    pub clusters: usize,
}

impl ClusterStats {
    /// Share of the batch that ended up in a story.
    pub fn clustered_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.clustered as f64 / self.total as f64
        }
    }
}

/// Engine labels grouped by cluster.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LabelGroups {
    /// Label → member positions, ascending
    pub clusters: BTreeMap<i32, Vec<usize>>,
    pub noise: Vec<usize>,
}

/// Groups label positions by cluster.
///
/// # Arguments
/// * `labels` - One engine label per clustered vector
///
/// # Returns
/// * `Err` - If a label below `NOISE_LABEL` is found
pub fn group_labels(labels: &[i32]) -> Result<LabelGroups> {
    let mut groups = LabelGroups::default();
    for (position, label) in labels.iter().enumerate() {
        match *label {
            NOISE_LABEL => groups.noise.push(position),
            l if l >= 0 => groups.clusters.entry(l).or_default().push(position),
            l => return Err(anyhow!("Invalid cluster label {} at position {}", l, position)),
        }
    }
    Ok(groups)
}
