//! Learning the structure of a vocabulary tree.
//!
//! Recursive hierarchical clustering:
//!
//! 1. Cluster the points of a node into at most `branch_factor` groups.
//! 2. Add one child per cluster (cluster id becomes the branch index), all
//!    siblings at once so their means are adjacent in memory.
//! 3. Stop at `maximum_levels`; otherwise split the points by assignment and
//!    recurse into every child holding more than `minimum_points_in_node` points.
//!
//! Children with too few points are frozen as leaves even if levels remain.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{HierarchicalVocabularyTree, ROOT};
use crate::packed::PackedDescriptors;
use crate::partitioning::{Clusterer, Clustering};
use crate::{Result, VocabError};

/// Tree learning parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnTreeParams {
    /// A branch with this many points or fewer is not split any further
    pub minimum_points_in_node: usize,
}

/// Builds a vocabulary tree from a set of training descriptors.
#[derive(Debug)]
pub struct LearnHierarchicalTree<C> {
    params: LearnTreeParams,
    clusterer: C,
}

impl<C: Clusterer> LearnHierarchicalTree<C> {
    pub fn new(clusterer: C, params: LearnTreeParams) -> Self {
        Self { params, clusterer }
    }

    pub fn params(&self) -> LearnTreeParams {
        self.params
    }

    pub fn clusterer(&self) -> &C {
        &self.clusterer
    }

    /// Replace `tree`'s contents with a hierarchy learned from `points`.
    ///
    /// Fails with [`VocabError::InvalidConfig`] if the tree's parameters are
    /// unset and [`VocabError::EmptyClustering`] if the root cannot be split.
    pub fn process<L>(&mut self, points: &PackedDescriptors, tree: &mut HierarchicalVocabularyTree<L>) -> Result<()> {
        tree.check_config()?;
        if points.dimension() != tree.dimension() {
            return Err(VocabError::DimensionMismatch {
                expected: tree.dimension(),
                actual: points.dimension(),
            });
        }
        tree.reset();

        if points.is_empty() {
            return Err(VocabError::EmptyClustering);
        }

        self.process_level(points, tree, 0, ROOT)?;

        let stats = tree.stats();
        info!(
            points = points.len(),
            nodes = stats.nodes,
            leaves = stats.leaves,
            depth = stats.depth,
            "learned vocabulary tree"
        );
        Ok(())
    }

    /// Cluster the points belonging to `parent` and create its children.
    fn process_level<L>(
        &mut self,
        points: &PackedDescriptors,
        tree: &mut HierarchicalVocabularyTree<L>,
        level: usize,
        parent: u32,
    ) -> Result<()> {
        let params = tree.params();
        let clustering = self.clusterer.cluster(points, params.branch_factor)?;
        check_clustering(&clustering, points.len(), params.branch_factor)?;

        if clustering.is_empty() {
            if level == 0 {
                return Err(VocabError::EmptyClustering);
            }
            return Ok(());
        }

        // Create the children all at once so their means are close in memory
        let mut children = Vec::with_capacity(clustering.len());
        for (label, mean) in clustering.centroids.iter().enumerate() {
            children.push(tree.add_node(parent, label as u32, mean)?);
        }
        debug!(level, parent, points = points.len(), clusters = children.len(), "split node");

        // Stop here if we are at the maximum number of levels
        if level + 1 >= params.maximum_levels {
            return Ok(());
        }

        let sizes = clustering.cluster_sizes();
        for (label, &child) in children.iter().enumerate() {
            // Too few points to be significant, leave it as a leaf
            if sizes[label] <= self.params.minimum_points_in_node {
                continue;
            }

            let mut in_branch = PackedDescriptors::new(points.dimension())?;
            in_branch.reserve(sizes[label]);
            for (point, &assigned) in points.iter().zip(&clustering.assignments) {
                if assigned == label {
                    in_branch.push(point)?;
                }
            }

            self.process_level(&in_branch, tree, level + 1, child)?;
        }
        Ok(())
    }
}

fn check_clustering(clustering: &Clustering, num_points: usize, branch_factor: usize) -> Result<()> {
    if clustering.len() > branch_factor {
        return Err(VocabError::InvalidConfig(format!(
            "clusterer returned {} clusters but the branch factor is {branch_factor}",
            clustering.len()
        )));
    }
    if clustering.assignments.len() != num_points {
        return Err(VocabError::InvalidConfig(format!(
            "clusterer returned {} assignments for {num_points} points",
            clustering.assignments.len()
        )));
    }
    if let Some(&bad) = clustering.assignments.iter().find(|&&a| a >= clustering.len()) {
        return Err(VocabError::InvalidConfig(format!(
            "clusterer assigned a point to cluster {bad} of {}",
            clustering.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::partitioning::{KMeans, KMeansParams};
    use crate::vocabtree::TreeParams;
    use proptest::prelude::*;

    fn learner(seed: u64, minimum_points_in_node: usize) -> LearnHierarchicalTree<KMeans> {
        let kmeans = KMeans::new(KMeansParams::default()).unwrap().with_seed(seed);
        LearnHierarchicalTree::new(kmeans, LearnTreeParams { minimum_points_in_node })
    }

    fn corners() -> PackedDescriptors {
        PackedDescriptors::from_rows(&[
            [0.0_f32, 0.0],
            [0.0, 1.0],
            [100.0, 100.0],
            [100.0, 101.0],
        ])
        .unwrap()
    }

    #[test]
    fn four_separated_points_fill_a_binary_tree() {
        let points = corners();
        let mut tree: HierarchicalVocabularyTree<()> =
            HierarchicalVocabularyTree::new(2, TreeParams::new(2, 2)).unwrap();
        learner(1, 0).process(&points, &mut tree).unwrap();

        let stats = tree.stats();
        assert_eq!(stats.nodes, 7);
        assert_eq!(stats.leaves, 4);
        assert_eq!(stats.depth, 2);

        // every training point lands in its own leaf
        let mut leaves: Vec<u32> = points
            .iter()
            .map(|p| tree.find_leaf(p, &DistanceMetric::L2).unwrap())
            .collect();
        leaves.sort_unstable();
        leaves.dedup();
        assert_eq!(leaves.len(), 4);
    }

    #[test]
    fn minimum_points_freezes_small_branches() {
        let points = corners();
        let mut tree: HierarchicalVocabularyTree<()> =
            HierarchicalVocabularyTree::new(2, TreeParams::new(2, 3)).unwrap();
        learner(1, 2).process(&points, &mut tree).unwrap();

        // both root clusters hold exactly two points, so neither is expanded
        let stats = tree.stats();
        assert_eq!(stats.nodes, 3);
        assert_eq!(stats.depth, 1);
    }

    #[test]
    fn single_point_chains_to_maximum_depth() {
        let points = PackedDescriptors::from_rows(&[[3.0_f32, 4.0]]).unwrap();
        let mut tree: HierarchicalVocabularyTree<()> =
            HierarchicalVocabularyTree::new(2, TreeParams::new(4, 3)).unwrap();
        learner(1, 0).process(&points, &mut tree).unwrap();
        assert_eq!(
            tree.stats(),
            crate::vocabtree::TreeStats {
                nodes: 4,
                leaves: 1,
                depth: 3
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        let empty = PackedDescriptors::new(2).unwrap();
        let mut tree: HierarchicalVocabularyTree<()> =
            HierarchicalVocabularyTree::new(2, TreeParams::new(2, 2)).unwrap();
        assert_eq!(learner(1, 0).process(&empty, &mut tree), Err(VocabError::EmptyClustering));

        let mut unset: HierarchicalVocabularyTree<()> =
            HierarchicalVocabularyTree::new(2, TreeParams::new(0, 2)).unwrap();
        assert!(matches!(
            learner(1, 0).process(&corners(), &mut unset),
            Err(VocabError::InvalidConfig(_))
        ));

        let mut wrong_dim: HierarchicalVocabularyTree<()> =
            HierarchicalVocabularyTree::new(3, TreeParams::new(2, 2)).unwrap();
        assert!(matches!(
            learner(1, 0).process(&corners(), &mut wrong_dim),
            Err(VocabError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn custom_clusterer_is_checked() {
        let points = corners();
        let mut tree: HierarchicalVocabularyTree<()> =
            HierarchicalVocabularyTree::new(2, TreeParams::new(2, 2)).unwrap();

        let nothing = |p: &PackedDescriptors, _k: usize| -> Result<Clustering> {
            Ok(Clustering {
                centroids: PackedDescriptors::new(p.dimension())?,
                assignments: Vec::new(),
            })
        };
        let mut learn = LearnHierarchicalTree::new(nothing, LearnTreeParams::default());
        assert!(learn.process(&points, &mut tree).is_err());

        // splits on the sign of the first coordinate
        let halves = |p: &PackedDescriptors, _k: usize| -> Result<Clustering> {
            let mut centroids = PackedDescriptors::new(p.dimension())?;
            centroids.push(&[0.0, 0.5])?;
            centroids.push(&[100.0, 100.5])?;
            let assignments = p.iter().map(|x| usize::from(x[0] > 50.0)).collect();
            Ok(Clustering {
                centroids,
                assignments,
            })
        };
        let mut learn = LearnHierarchicalTree::new(halves, LearnTreeParams::default());
        let mut flat: HierarchicalVocabularyTree<()> =
            HierarchicalVocabularyTree::new(2, TreeParams::new(2, 1)).unwrap();
        learn.process(&points, &mut flat).unwrap();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat.mean(2), Some(&[100.0_f32, 100.5][..]));
    }

    #[test]
    fn relearning_replaces_the_tree() {
        let mut tree: HierarchicalVocabularyTree<()> =
            HierarchicalVocabularyTree::new(2, TreeParams::new(2, 2)).unwrap();
        learner(1, 0).process(&corners(), &mut tree).unwrap();
        let single = PackedDescriptors::from_rows(&[[1.0_f32, 1.0]]).unwrap();
        learner(1, 0).process(&single, &mut tree).unwrap();
        assert_eq!(tree.len(), 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_learned_tree_is_well_formed(
            seed in any::<u64>(),
            branch_factor in 1usize..5,
            maximum_levels in 1usize..4,
            minimum_points_in_node in 0usize..3,
            raw in proptest::collection::vec(-10.0f32..10.0, 2..120),
        ) {
            let rows: Vec<&[f32]> = raw.chunks_exact(2).collect();
            let points = PackedDescriptors::from_rows(&rows).unwrap();
            let mut tree: HierarchicalVocabularyTree<()> =
                HierarchicalVocabularyTree::new(2, TreeParams::new(branch_factor, maximum_levels)).unwrap();
            learner(seed, minimum_points_in_node).process(&points, &mut tree).unwrap();

            for (index, node) in tree.nodes().iter().enumerate() {
                prop_assert_eq!(node.id as usize, index);
                prop_assert!(node.children.len() <= branch_factor);
                if let Some(parent) = node.parent {
                    let siblings = &tree.node(parent).unwrap().children;
                    prop_assert_eq!(siblings[node.branch as usize], node.id);
                }
            }

            let bound: usize = (0..=maximum_levels).map(|l| branch_factor.pow(l as u32)).sum();
            let stats = tree.stats();
            prop_assert!(stats.nodes <= bound);
            prop_assert!(stats.depth <= maximum_levels);

            // every training point can be quantized without hitting the depth limit
            for p in points.iter() {
                prop_assert!(tree.find_leaf(p, &DistanceMetric::L2).is_ok());
            }
        }
    }
}
