//! Partitioning of descriptor sets into clusters.
//!
//! The tree learner only needs "split these points into at most `k` groups",
//! so clustering is abstracted behind [`Clusterer`]. [`KMeans`] is the stock
//! implementation; any `FnMut(&PackedDescriptors, usize) -> Result<Clustering>`
//! also works.

pub mod kmeans;

pub use kmeans::{KMeans, KMeansParams};

use crate::packed::PackedDescriptors;
use crate::Result;

/// Output of one clustering call.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// One representative per cluster, in cluster-id order.
    pub centroids: PackedDescriptors,
    /// Cluster id for every input point, indexed like the input.
    pub assignments: Vec<usize>,
}

impl Clustering {
    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Number of points assigned to each cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.len()];
        for &a in &self.assignments {
            sizes[a] += 1;
        }
        sizes
    }
}

/// Clustering strategy used to split the points of a tree node.
pub trait Clusterer {
    /// Partition `points` into at most `k` clusters.
    ///
    /// Every assignment must be `< centroids.len()`.
    fn cluster(&mut self, points: &PackedDescriptors, k: usize) -> Result<Clustering>;
}

impl<F> Clusterer for F
where
    F: FnMut(&PackedDescriptors, usize) -> Result<Clustering>,
{
    fn cluster(&mut self, points: &PackedDescriptors, k: usize) -> Result<Clustering> {
        self(points, k)
    }
}
