//! k-means clustering implementation.
//!
//! Used by the tree learner to split the descriptors of every node into
//! `branch_factor` regions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Clusterer, Clustering};
use crate::distance::DistanceMetric;
use crate::packed::PackedDescriptors;
use crate::{Result, VocabError};

/// k-means parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KMeansParams {
    /// Upper bound on refinement iterations per call
    pub max_iterations: usize,

    /// Stop once no centroid moves further than this
    pub tolerance: f32,

    /// Seed for k-means++ initialization. `None` draws one from entropy.
    pub seed: Option<u64>,

    /// Metric used for assignment. Must match the metric used to search the tree.
    pub metric: DistanceMetric,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            seed: None,
            metric: DistanceMetric::L2,
        }
    }
}

/// k-means clustering with k-means++ initialization.
///
/// The random generator is created once, so a sequence of `cluster` calls on the
/// same inputs is reproducible when a seed is configured.
#[derive(Debug)]
pub struct KMeans {
    params: KMeansParams,
    rng: StdRng,
}

impl KMeans {
    pub fn new(params: KMeansParams) -> Result<Self> {
        if params.max_iterations == 0 {
            return Err(VocabError::InvalidConfig(
                "k-means max_iterations must be greater than 0".to_string(),
            ));
        }
        if params.tolerance.is_nan() || params.tolerance < 0.0 {
            return Err(VocabError::InvalidConfig(
                "k-means tolerance must be non-negative".to_string(),
            ));
        }

        // Use an explicit seed when configured; otherwise derive one from entropy.
        let seed = params.seed.unwrap_or_else(|| rand::rng().random());
        Ok(Self {
            params,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Configure a deterministic seed, replacing the current generator.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.params.seed = Some(seed);
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn params(&self) -> &KMeansParams {
        &self.params
    }

    /// Partition `points` into at most `k` non-empty clusters.
    ///
    /// Fewer than `k` clusters come back when there are fewer than `k` points or
    /// when points coincide. Assignments are computed against the returned
    /// centroids using the first-nearest rule, the same rule tree descent uses.
    pub fn fit(&mut self, points: &PackedDescriptors, k: usize) -> Result<Clustering> {
        if k == 0 {
            return Err(VocabError::InvalidConfig(
                "number of clusters must be greater than 0".to_string(),
            ));
        }
        let dimension = points.dimension();
        if points.is_empty() {
            return Ok(Clustering {
                centroids: PackedDescriptors::new(dimension)?,
                assignments: Vec::new(),
            });
        }

        let mut centroids = self.kmeans_plus_plus(points, k.min(points.len()))?;

        // Iterative refinement
        for _iteration in 0..self.params.max_iterations {
            let assignments = self.assign_clusters(points, &centroids);
            let new_centroids = self.update_centroids(points, &centroids, &assignments)?;

            let converged = centroids
                .iter()
                .zip(new_centroids.iter())
                .all(|(old, new)| self.params.metric.distance(old, new) <= self.params.tolerance);

            centroids = new_centroids;
            if converged {
                break;
            }
        }

        let assignments = self.assign_clusters(points, &centroids);
        compact(centroids, assignments)
    }

    /// k-means++ initialization. Stops early once every point sits on a centroid.
    fn kmeans_plus_plus(&mut self, points: &PackedDescriptors, k: usize) -> Result<PackedDescriptors> {
        let num_points = points.len();
        let mut centroids = PackedDescriptors::new(points.dimension())?;
        centroids.reserve(k);

        // First centroid: random point
        let first_idx = self.rng.random_range(0..num_points);
        centroids.push(points.get(first_idx))?;

        let mut nearest: Vec<f64> = points
            .iter()
            .map(|p| squared(self.params.metric.distance(p, centroids.get(0))))
            .collect();

        // Subsequent centroids: sampled proportional to squared distance to the nearest centroid
        while centroids.len() < k {
            let total: f64 = nearest.iter().sum();
            if total <= 0.0 {
                break;
            }

            let threshold = self.rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut chosen = None;
            for (i, &d) in nearest.iter().enumerate() {
                if d <= 0.0 {
                    continue;
                }
                chosen = Some(i);
                cumulative += d;
                if cumulative >= threshold {
                    break;
                }
            }
            let Some(chosen) = chosen else { break };

            centroids.push(points.get(chosen))?;
            let newest = centroids.get(centroids.len() - 1);
            for (i, p) in points.iter().enumerate() {
                let d = squared(self.params.metric.distance(p, newest));
                if d < nearest[i] {
                    nearest[i] = d;
                }
            }
        }

        Ok(centroids)
    }

    /// Assign every point to its nearest centroid. Ties go to the lower cluster id.
    pub fn assign_clusters(&self, points: &PackedDescriptors, centroids: &PackedDescriptors) -> Vec<usize> {
        points
            .iter()
            .map(|p| {
                let mut best_cluster = 0;
                let mut best_dist = f32::INFINITY;
                for (cluster_idx, centroid) in centroids.iter().enumerate() {
                    let dist = self.params.metric.distance(p, centroid);
                    if dist < best_dist {
                        best_dist = dist;
                        best_cluster = cluster_idx;
                    }
                }
                best_cluster
            })
            .collect()
    }

    /// Recompute centroids as member means. Empty clusters keep their old centroid.
    fn update_centroids(
        &self,
        points: &PackedDescriptors,
        centroids: &PackedDescriptors,
        assignments: &[usize],
    ) -> Result<PackedDescriptors> {
        let dimension = points.dimension();
        let k = centroids.len();
        let mut sums = vec![0.0f64; k * dimension];
        let mut counts = vec![0usize; k];

        for (p, &cluster) in points.iter().zip(assignments) {
            counts[cluster] += 1;
            let sum = &mut sums[cluster * dimension..(cluster + 1) * dimension];
            for (s, &v) in sum.iter_mut().zip(p) {
                *s += f64::from(v);
            }
        }

        let mut updated = PackedDescriptors::new(dimension)?;
        updated.reserve(k);
        let mut mean = vec![0.0f32; dimension];
        for (cluster, &count) in counts.iter().enumerate() {
            if count == 0 {
                updated.push(centroids.get(cluster))?;
                continue;
            }
            let sum = &sums[cluster * dimension..(cluster + 1) * dimension];
            for (m, &s) in mean.iter_mut().zip(sum) {
                *m = (s / count as f64) as f32;
            }
            updated.push(&mean)?;
        }
        Ok(updated)
    }
}

impl Clusterer for KMeans {
    fn cluster(&mut self, points: &PackedDescriptors, k: usize) -> Result<Clustering> {
        self.fit(points, k)
    }
}

#[inline]
fn squared(d: f32) -> f64 {
    let d = f64::from(d);
    d * d
}

/// Drop clusters nobody was assigned to, keeping the relative order of the rest.
fn compact(centroids: PackedDescriptors, assignments: Vec<usize>) -> Result<Clustering> {
    let mut counts = vec![0usize; centroids.len()];
    for &a in &assignments {
        counts[a] += 1;
    }
    if counts.iter().all(|&c| c > 0) {
        return Ok(Clustering {
            centroids,
            assignments,
        });
    }

    let mut remap = vec![usize::MAX; counts.len()];
    let mut kept = PackedDescriptors::new(centroids.dimension())?;
    for (cluster, &count) in counts.iter().enumerate() {
        if count > 0 {
            remap[cluster] = kept.len();
            kept.push(centroids.get(cluster))?;
        }
    }
    Ok(Clustering {
        centroids: kept,
        assignments: assignments.into_iter().map(|a| remap[a]).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seeded() -> KMeans {
        KMeans::new(KMeansParams::default()).unwrap().with_seed(7)
    }

    #[test]
    fn separates_well_spread_groups() {
        let rows = vec![
            vec![0.0_f32, 0.0],
            vec![0.1, 0.0],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
        ];
        let points = PackedDescriptors::from_rows(&rows).unwrap();
        let clustering = seeded().fit(&points, 2).unwrap();

        assert_eq!(clustering.len(), 2);
        let a = &clustering.assignments;
        assert_eq!(a[0], a[1]);
        assert_eq!(a[2], a[3]);
        assert_ne!(a[0], a[2]);
        assert_eq!(clustering.cluster_sizes(), vec![2, 2]);
    }

    #[test]
    fn fewer_points_than_clusters() {
        let points = PackedDescriptors::from_rows(&[[1.0_f32, 2.0], [3.0, 4.0]]).unwrap();
        let clustering = seeded().fit(&points, 8).unwrap();
        assert_eq!(clustering.len(), 2);
    }

    #[test]
    fn identical_points_collapse_to_one_cluster() {
        let rows = vec![[5.0_f32, 5.0]; 6];
        let points = PackedDescriptors::from_rows(&rows).unwrap();
        let clustering = seeded().fit(&points, 3).unwrap();
        assert_eq!(clustering.len(), 1);
        assert!(clustering.assignments.iter().all(|&a| a == 0));
    }

    #[test]
    fn empty_input_gives_no_clusters() {
        let points = PackedDescriptors::new(3).unwrap();
        let clustering = seeded().fit(&points, 3).unwrap();
        assert!(clustering.is_empty());
        assert!(seeded().fit(&points, 0).is_err());
    }

    #[test]
    fn rejects_zero_iterations() {
        let params = KMeansParams {
            max_iterations: 0,
            ..KMeansParams::default()
        };
        assert!(matches!(KMeans::new(params), Err(VocabError::InvalidConfig(_))));
    }

    proptest! {
        #[test]
        fn prop_kmeans_fit_is_deterministic_given_seed(
            seed in any::<u64>(),
            dimension in 1usize..8,
            num_points in 1usize..48,
            k in 1usize..8,
            raw in proptest::collection::vec(-1.0f32..1.0f32, 48 * 8),
        ) {
            let rows: Vec<&[f32]> = raw.chunks_exact(dimension).take(num_points).collect();
            let points = PackedDescriptors::from_rows(&rows).unwrap();

            let mut km1 = KMeans::new(KMeansParams::default()).unwrap().with_seed(seed);
            let mut km2 = KMeans::new(KMeansParams::default()).unwrap().with_seed(seed);

            let c1 = km1.fit(&points, k).unwrap();
            let c2 = km2.fit(&points, k).unwrap();
            prop_assert_eq!(&c1, &c2);
        }

        #[test]
        fn prop_assignments_are_nearest_and_clusters_non_empty(
            seed in any::<u64>(),
            num_points in 1usize..40,
            k in 1usize..6,
            raw in proptest::collection::vec(-5.0f32..5.0f32, 40 * 2),
        ) {
            let rows: Vec<&[f32]> = raw.chunks_exact(2).take(num_points).collect();
            let points = PackedDescriptors::from_rows(&rows).unwrap();
            let mut km = KMeans::new(KMeansParams::default()).unwrap().with_seed(seed);
            let clustering = km.fit(&points, k).unwrap();

            prop_assert!(clustering.len() <= k);
            prop_assert!(clustering.cluster_sizes().iter().all(|&s| s > 0));
            prop_assert_eq!(km.assign_clusters(&points, &clustering.centroids), clustering.assignments);
        }
    }
}
