//! HDBSCAN density clustering.
//!
//! Deterministic implementation over dense vectors: core distances, mutual
//! reachability, Prim's minimum spanning tree, single-linkage hierarchy,
//! condensed tree and Excess-of-Mass (or leaf) cluster selection. Nothing in
//! here is randomized; every tie is broken by point index.

use anyhow::{anyhow, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::{DensityClusterer, NOISE_LABEL};
use crate::error::ConfigError;
use crate::vector::similarity::{dot, magnitude, MIN_MAGNITUDE};
use crate::TARGET_CLUSTER;

/// Distances below this are floored before taking `1 / d`.
const MIN_LAMBDA_DISTANCE: f64 = 1e-12;

/// Distance metric used between article vectors.
///
/// Only cosine makes sense for sentence embeddings, so it is the only variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}

/// Cluster selection method for HDBSCAN.
///
/// Determines how clusters are extracted from the condensed hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClusterSelectionMethod {
    /// Excess of Mass - selects clusters by persistence in the hierarchy.
    #[default]
    Eom,
    /// Leaf clusters only - more granular clustering.
    Leaf,
}

impl ClusterSelectionMethod {
    pub fn description(&self) -> &'static str {
        match self {
            ClusterSelectionMethod::Eom => "Excess of Mass - good general purpose clustering",
            ClusterSelectionMethod::Leaf => "Leaf clusters only - more granular clustering",
        }
    }
}

impl fmt::Display for ClusterSelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterSelectionMethod::Eom => write!(f, "eom"),
            ClusterSelectionMethod::Leaf => write!(f, "leaf"),
        }
    }
}

impl FromStr for ClusterSelectionMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eom" => Ok(ClusterSelectionMethod::Eom),
            "leaf" => Ok(ClusterSelectionMethod::Leaf),
            other => Err(ConfigError::invalid_parameter(format!(
                "unknown cluster selection method '{}', expected 'eom' or 'leaf'",
                other
            ))),
        }
    }
}

/// Parameters for HDBSCAN clustering algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HdbscanParams {
    /// Minimum number of points to form a cluster.
    pub min_cluster_size: usize,

    /// Neighbourhood size (the point itself included) for core distances.
    pub min_samples: usize,

    pub metric: DistanceMetric,

    pub cluster_selection_method: ClusterSelectionMethod,

    /// Whether the root of the hierarchy may be selected as the only cluster.
    pub allow_single_cluster: bool,
}

impl Default for HdbscanParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 5,
            min_samples: 5,
            metric: DistanceMetric::Cosine,
            cluster_selection_method: ClusterSelectionMethod::Eom,
            allow_single_cluster: false,
        }
    }
}

impl HdbscanParams {
    /// Validate parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidParameter` if:
    /// - min_cluster_size < 2
    /// - min_samples < 1
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_cluster_size < 2 {
            return Err(ConfigError::invalid_parameter(format!(
                "min_cluster_size must be >= 2, got {}. HDBSCAN requires at least 2 points to form a cluster.",
                self.min_cluster_size
            )));
        }

        if self.min_samples < 1 {
            return Err(ConfigError::invalid_parameter(format!(
                "min_samples must be >= 1, got {}. At least 1 sample is required for core point determination.",
                self.min_samples
            )));
        }

        Ok(())
    }

    /// Returns false if there are fewer points than min_cluster_size.
    #[inline]
    pub fn is_viable_for_size(&self, n_points: usize) -> bool {
        n_points >= self.min_cluster_size
    }
}

/// HDBSCAN over unit vectors.
#[derive(Debug, Clone)]
pub struct Hdbscan {
    params: HdbscanParams,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    a: usize,
    b: usize,
    weight: f64,
}

/// Internal node of the single-linkage hierarchy.
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CondensedChild {
    Point(usize),
    Cluster(usize),
}

#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: CondensedChild,
    lambda: f64,
    size: usize,
}

/// Condensed tree; cluster 0 is the root and children always have larger ids than parents.
#[derive(Debug, Default)]
struct CondensedTree {
    edges: Vec<CondensedEdge>,
    birth: Vec<f64>,
    parent: Vec<Option<usize>>,
}

impl CondensedTree {
    fn cluster_count(&self) -> usize {
        self.birth.len()
    }

    fn new_cluster(&mut self, parent: Option<usize>, birth: f64) -> usize {
        self.birth.push(birth);
        self.parent.push(parent);
        self.birth.len() - 1
    }
}

impl Hdbscan {
    /// Creates a clusterer after validating its parameters.
    pub fn new(params: HdbscanParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &HdbscanParams {
        &self.params
    }

    /// Assigns a cluster label (or `NOISE_LABEL`) to every vector.
    ///
    /// # Arguments
    /// * `data` - Vectors of identical dimension, unit length expected
    ///
    /// # Returns
    /// * `Ok(Vec<i32>)` - One label per input vector, clusters numbered from 0
    ///   in order of their lowest member index
    /// * `Err` - If the vectors have different dimensions or zero magnitude
    pub fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<i32>> {
        let n = data.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let dim = data[0].len();
        if let Some((idx, v)) = data.iter().enumerate().find(|(_, v)| v.len() != dim) {
            return Err(anyhow!(
                "Vector {} has dimension {}, expected {}",
                idx,
                v.len(),
                dim
            ));
        }

        let norms: Vec<f32> = data.iter().map(|v| magnitude(v)).collect();
        if let Some(idx) = norms.iter().position(|m| !(*m >= MIN_MAGNITUDE)) {
            return Err(anyhow!("Vector {} has zero magnitude", idx));
        }

        if !self.params.is_viable_for_size(n) {
            debug!(
                target: TARGET_CLUSTER,
                "Only {} points for min_cluster_size {}, everything is noise",
                n,
                self.params.min_cluster_size
            );
            return Ok(vec![NOISE_LABEL; n]);
        }

        let distance = |i: usize, j: usize| -> f64 {
            if i == j {
                return 0.0;
            }
            match self.params.metric {
                DistanceMetric::Cosine => {
                    let cos = dot(&data[i], &data[j]) as f64 / (norms[i] as f64 * norms[j] as f64);
                    (1.0 - cos).max(0.0)
                }
            }
        };

        let core = self.core_distances(n, &distance);
        let mst = minimum_spanning_tree(n, &core, &distance);
        let merges = single_linkage(n, mst);
        let tree = condense(n, &merges, self.params.min_cluster_size);
        let selected = self.select_clusters(&tree);
        let labels = label_points(n, &tree, &selected, self.params.allow_single_cluster);

        debug!(
            target: TARGET_CLUSTER,
            "HDBSCAN over {} points: {} condensed clusters, {} selected",
            n,
            tree.cluster_count(),
            selected.iter().filter(|s| **s).count()
        );

        Ok(labels)
    }

    /// Distance to the `min_samples`-th nearest point, the point itself counted first.
    fn core_distances<F>(&self, n: usize, distance: &F) -> Vec<f64>
    where
        F: Fn(usize, usize) -> f64 + Sync,
    {
        let k = self.params.min_samples.min(n);
        (0..n)
            .into_par_iter()
            .map(|i| {
                let mut row: Vec<f64> = (0..n).map(|j| distance(i, j)).collect();
                let (_, kth, _) = row.select_nth_unstable_by(k - 1, |a, b| a.total_cmp(b));
                *kth
            })
            .collect()
    }

    fn select_clusters(&self, tree: &CondensedTree) -> Vec<bool> {
        let k = tree.cluster_count();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); k];
        for (cluster, parent) in tree.parent.iter().enumerate() {
            if let Some(parent) = parent {
                children[*parent].push(cluster);
            }
        }

        let mut selected = vec![false; k];

        match self.params.cluster_selection_method {
            ClusterSelectionMethod::Leaf => {
                for cluster in 0..k {
                    if children[cluster].is_empty() {
                        selected[cluster] = true;
                    }
                }
            }
            ClusterSelectionMethod::Eom => {
                let stability = stabilities(tree);
                let mut subtree = stability.clone();

                // Children always carry larger ids, so descending order is bottom-up
                for cluster in (0..k).rev() {
                    if children[cluster].is_empty() {
                        selected[cluster] = true;
                        continue;
                    }
                    let child_sum: f64 = children[cluster].iter().map(|c| subtree[*c]).sum();
                    if child_sum > stability[cluster] {
                        subtree[cluster] = child_sum;
                    } else {
                        selected[cluster] = true;
                        deselect_descendants(cluster, &children, &mut selected);
                    }
                }
            }
        }

        if !self.params.allow_single_cluster && k > 0 && selected[0] {
            selected[0] = false;
            // The root only wins EOM when it beats its children; fall back to them
            if self.params.cluster_selection_method == ClusterSelectionMethod::Eom {
                reselect_below_root(&children, tree, &mut selected);
            }
        }

        selected
    }
}

impl DensityClusterer for Hdbscan {
    fn cluster(&self, vectors: &[Vec<f32>]) -> Result<Vec<i32>> {
        self.fit_predict(vectors)
    }

    fn fingerprint(&self) -> String {
        format!(
            "hdbscan;metric={};min_cluster_size={};min_samples={};selection={};allow_single_cluster={}",
            self.params.metric,
            self.params.min_cluster_size,
            self.params.min_samples,
            self.params.cluster_selection_method,
            self.params.allow_single_cluster
        )
    }
}

fn lambda_of(distance: f64) -> f64 {
    1.0 / distance.max(MIN_LAMBDA_DISTANCE)
}

/// Prim's algorithm over the implicit complete mutual-reachability graph.
fn minimum_spanning_tree<F>(n: usize, core: &[f64], distance: &F) -> Vec<Edge>
where
    F: Fn(usize, usize) -> f64,
{
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[0] = true;

    for _ in 1..n {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let reach = distance(current, j).max(core[current]).max(core[j]);
            if reach < best[j] {
                best[j] = reach;
                from[j] = current;
            }
        }

        let mut next: Option<usize> = None;
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            match next {
                Some(k) if best[k] <= best[j] => {}
                _ => next = Some(j),
            }
        }

        let Some(next) = next else { break };
        in_tree[next] = true;
        edges.push(Edge {
            a: from[next],
            b: next,
            weight: best[next],
        });
        current = next;
    }

    edges.sort_by(|x, y| {
        x.weight
            .total_cmp(&y.weight)
            .then(x.a.min(x.b).cmp(&y.a.min(y.b)))
            .then(x.a.max(x.b).cmp(&y.a.max(y.b)))
    });
    edges
}

/// Builds the single-linkage hierarchy; node `n + i` is `merges[i]`.
fn single_linkage(n: usize, edges: Vec<Edge>) -> Vec<Merge> {
    let mut parent: Vec<usize> = (0..2 * n).collect();
    let mut size: Vec<usize> = vec![1; 2 * n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for edge in edges {
        let ra = find(&mut parent, edge.a);
        let rb = find(&mut parent, edge.b);
        if ra == rb {
            continue;
        }
        let node = n + merges.len();
        let merged = size[ra] + size[rb];
        merges.push(Merge {
            left: ra.min(rb),
            right: ra.max(rb),
            distance: edge.weight,
            size: merged,
        });
        parent[ra] = node;
        parent[rb] = node;
        size[node] = merged;
    }

    merges
}

fn node_size(n: usize, merges: &[Merge], node: usize) -> usize {
    if node < n {
        1
    } else {
        merges[node - n].size
    }
}

fn leaves(n: usize, merges: &[Merge], node: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current < n {
            out.push(current);
        } else {
            let m = merges[current - n];
            stack.push(m.right);
            stack.push(m.left);
        }
    }
    out
}

/// Walks the hierarchy from the root, keeping only splits where both sides
/// reach `min_cluster_size`; everything else falls out as points.
fn condense(n: usize, merges: &[Merge], min_cluster_size: usize) -> CondensedTree {
    let mut tree = CondensedTree::default();
    if merges.is_empty() {
        return tree;
    }

    let root_node = n + merges.len() - 1;
    let root = tree.new_cluster(None, 0.0);
    let mut stack = vec![(root_node, root)];

    while let Some((node, cluster)) = stack.pop() {
        let m = merges[node - n];
        let lambda = lambda_of(m.distance);
        let left_size = node_size(n, merges, m.left);
        let right_size = node_size(n, merges, m.right);
        let left_big = left_size >= min_cluster_size;
        let right_big = right_size >= min_cluster_size;

        let fall_out = |tree: &mut CondensedTree, child: usize| {
            for point in leaves(n, merges, child) {
                tree.edges.push(CondensedEdge {
                    parent: cluster,
                    child: CondensedChild::Point(point),
                    lambda,
                    size: 1,
                });
            }
        };

        match (left_big, right_big) {
            (true, true) => {
                let mut created = Vec::with_capacity(2);
                for (child, child_size) in [(m.left, left_size), (m.right, right_size)] {
                    let id = tree.new_cluster(Some(cluster), lambda);
                    tree.edges.push(CondensedEdge {
                        parent: cluster,
                        child: CondensedChild::Cluster(id),
                        lambda,
                        size: child_size,
                    });
                    created.push((child, id));
                }
                for entry in created.into_iter().rev() {
                    stack.push(entry);
                }
            }
            (true, false) => {
                fall_out(&mut tree, m.right);
                stack.push((m.left, cluster));
            }
            (false, true) => {
                fall_out(&mut tree, m.left);
                stack.push((m.right, cluster));
            }
            (false, false) => {
                fall_out(&mut tree, m.left);
                fall_out(&mut tree, m.right);
            }
        }
    }

    tree
}

fn stabilities(tree: &CondensedTree) -> Vec<f64> {
    let mut stability = vec![0.0; tree.cluster_count()];
    for edge in &tree.edges {
        let birth = tree.birth[edge.parent];
        stability[edge.parent] += (edge.lambda - birth) * edge.size as f64;
    }
    stability
}

fn deselect_descendants(cluster: usize, children: &[Vec<usize>], selected: &mut [bool]) {
    let mut stack: Vec<usize> = children[cluster].clone();
    while let Some(c) = stack.pop() {
        selected[c] = false;
        stack.extend(children[c].iter().copied());
    }
}

/// Re-runs EOM below an excluded root so its subtrees keep their best selection.
fn reselect_below_root(children: &[Vec<usize>], tree: &CondensedTree, selected: &mut [bool]) {
    let stability = stabilities(tree);
    let k = tree.cluster_count();
    let mut subtree = stability.clone();
    for s in selected.iter_mut() {
        *s = false;
    }

    for cluster in (1..k).rev() {
        if children[cluster].is_empty() {
            selected[cluster] = true;
            continue;
        }
        let child_sum: f64 = children[cluster].iter().map(|c| subtree[*c]).sum();
        if child_sum > stability[cluster] {
            subtree[cluster] = child_sum;
        } else {
            selected[cluster] = true;
            deselect_descendants(cluster, children, selected);
        }
    }
}

fn label_points(
    n: usize,
    tree: &CondensedTree,
    selected: &[bool],
    allow_single_cluster: bool,
) -> Vec<i32> {
    let mut owner: Vec<Option<usize>> = vec![None; n];
    let mut point_lambda = vec![0.0; n];
    let root_max_lambda = tree
        .edges
        .iter()
        .filter(|e| e.parent == 0)
        .map(|e| e.lambda)
        .fold(f64::NEG_INFINITY, f64::max);

    for edge in &tree.edges {
        let CondensedChild::Point(point) = edge.child else {
            continue;
        };
        point_lambda[point] = edge.lambda;

        let mut cluster = Some(edge.parent);
        while let Some(c) = cluster {
            if selected[c] {
                owner[point] = Some(c);
                break;
            }
            cluster = tree.parent[c];
        }
    }

    if allow_single_cluster {
        for point in 0..n {
            if owner[point] == Some(0) && point_lambda[point] < root_max_lambda {
                owner[point] = None;
            }
        }
    }

    // Renumber selected clusters by their lowest member index
    let mut renumber: Vec<Option<i32>> = vec![None; tree.cluster_count()];
    let mut next_label = 0i32;
    let mut labels = vec![NOISE_LABEL; n];
    for point in 0..n {
        if let Some(cluster) = owner[point] {
            let label = *renumber[cluster].get_or_insert_with(|| {
                let label = next_label;
                next_label += 1;
                label
            });
            labels[point] = label;
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit vector along `axis` with a small, point-specific offset on the last axis.
    fn jittered(axis: usize, dim: usize, jitter: f32) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v[dim - 1] += jitter;
        let m = magnitude(&v);
        v.iter().map(|x| x / m).collect()
    }

    fn two_groups_and_outlier() -> Vec<Vec<f32>> {
        let mut data = Vec::new();
        for i in 0..5 {
            data.push(jittered(0, 4, 0.01 * (i + 1) as f32));
        }
        for i in 0..5 {
            data.push(jittered(1, 4, 0.01 * (i + 1) as f32));
        }
        // Points away from both groups
        let s = std::f32::consts::FRAC_1_SQRT_2;
        data.push(vec![-s, -s, 0.0, 0.0]);
        data
    }

    fn params(min_cluster_size: usize, min_samples: usize) -> HdbscanParams {
        HdbscanParams {
            min_cluster_size,
            min_samples,
            ..HdbscanParams::default()
        }
    }

    #[test]
    fn test_separates_groups_and_marks_outlier_as_noise() {
        let clusterer = Hdbscan::new(params(3, 2)).unwrap();
        let labels = clusterer.fit_predict(&two_groups_and_outlier()).unwrap();

        assert_eq!(labels.len(), 11);
        assert!(labels[0..5].iter().all(|l| *l == labels[0]));
        assert!(labels[5..10].iter().all(|l| *l == labels[5]));
        assert_ne!(labels[0], labels[5]);
        assert_eq!(labels[0], 0, "labels are numbered by lowest member index");
        assert_eq!(labels[5], 1);
        assert_eq!(labels[10], NOISE_LABEL);
    }

    #[test]
    fn test_leaf_selection_separates_groups() {
        let clusterer = Hdbscan::new(HdbscanParams {
            cluster_selection_method: ClusterSelectionMethod::Leaf,
            ..params(3, 2)
        })
        .unwrap();
        let labels = clusterer.fit_predict(&two_groups_and_outlier()).unwrap();
        assert!(labels[0..5].iter().all(|l| *l == labels[0]));
        assert!(labels[5..10].iter().all(|l| *l == labels[5]));
        assert_ne!(labels[0], labels[5]);
        assert_eq!(labels[10], NOISE_LABEL);
    }

    #[test]
    fn test_is_deterministic() {
        let clusterer = Hdbscan::new(params(3, 2)).unwrap();
        let data = two_groups_and_outlier();
        let first = clusterer.fit_predict(&data).unwrap();
        let second = clusterer.fit_predict(&data).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_and_undersized_input() {
        let clusterer = Hdbscan::new(params(3, 2)).unwrap();
        assert!(clusterer.fit_predict(&[]).unwrap().is_empty());

        let labels = clusterer
            .fit_predict(&[vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        assert_eq!(labels, vec![NOISE_LABEL, NOISE_LABEL]);
    }

    #[test]
    fn test_rejects_mixed_dimensions_and_zero_vectors() {
        let clusterer = Hdbscan::new(params(2, 1)).unwrap();
        assert!(clusterer
            .fit_predict(&[vec![1.0, 0.0], vec![1.0, 0.0, 0.0]])
            .is_err());
        assert!(clusterer
            .fit_predict(&[vec![1.0, 0.0], vec![0.0, 0.0]])
            .is_err());
    }

    #[test]
    fn test_single_group_without_single_cluster_is_noise() {
        // One homogeneous group never splits into two big children, so only the
        // root could hold it.
        let data: Vec<Vec<f32>> = (0..4).map(|i| jittered(0, 3, 0.01 * i as f32)).collect();
        let clusterer = Hdbscan::new(params(3, 2)).unwrap();
        let labels = clusterer.fit_predict(&data).unwrap();
        assert!(labels.iter().all(|l| *l == NOISE_LABEL));
    }

    #[test]
    fn test_validation() {
        assert!(params(1, 1).validate().is_err());
        assert!(params(2, 0).validate().is_err());
        assert!(params(2, 1).validate().is_ok());
        // min_samples larger than min_cluster_size is allowed
        assert!(params(2, 8).validate().is_ok());
        assert!(Hdbscan::new(params(0, 1)).is_err());
    }

    #[test]
    fn test_selection_method_parsing() {
        assert_eq!(
            "EOM".parse::<ClusterSelectionMethod>().unwrap(),
            ClusterSelectionMethod::Eom
        );
        assert_eq!(
            " leaf ".parse::<ClusterSelectionMethod>().unwrap(),
            ClusterSelectionMethod::Leaf
        );
        assert!("dbscan".parse::<ClusterSelectionMethod>().is_err());
        assert_ne!(
            ClusterSelectionMethod::Eom.description(),
            ClusterSelectionMethod::Leaf.description()
        );
    }

    #[test]
    fn test_fingerprint_reflects_parameters() {
        let a = Hdbscan::new(params(3, 2)).unwrap();
        let b = Hdbscan::new(params(4, 2)).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), Hdbscan::new(params(3, 2)).unwrap().fingerprint());
        assert!(a.fingerprint().contains("metric=cosine"));
    }
}
