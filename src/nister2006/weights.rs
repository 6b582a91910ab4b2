//! Learning per-node weights from a training corpus.
//!
//! The weight of node `i` is `ln(N / N_i)` where `N` is the number of training
//! images and `N_i` the number of those images with at least one descriptor
//! passing through `i`. Nodes seen in every image get weight 0, rare nodes get
//! large weights.

use std::collections::HashSet;

use tracing::info;

use crate::distance::PointDistance;
use crate::vocabtree::HierarchicalVocabularyTree;
use crate::{Result, VocabError};

/// Computes inverse-document-frequency weights for every node in a learned tree.
///
/// Feed it the same images the tree was learned from; otherwise some nodes may
/// never be visited and [`fixate`](Self::fixate) fails.
#[derive(Debug)]
pub struct LearnNodeWeights<'t, L, D> {
    distance: D,
    tree: Option<&'t mut HierarchicalVocabularyTree<L>>,
    // Number of images that saw each node at least once, indexed by node id
    images_with_node: Vec<u32>,
    // Distinct nodes seen by the current image
    nodes_in_image: HashSet<u32>,
    total_images: u32,
}

impl<'t, L, D: PointDistance> LearnNodeWeights<'t, L, D> {
    pub fn new(distance: D) -> Self {
        Self {
            distance,
            tree: None,
            images_with_node: Vec::new(),
            nodes_in_image: HashSet::new(),
            total_images: 0,
        }
    }

    /// Start over with a new tree, zeroing every counter.
    pub fn initialize(&mut self, tree: &'t mut HierarchicalVocabularyTree<L>) {
        self.images_with_node.clear();
        self.images_with_node.resize(tree.len(), 0);
        self.total_images = 0;
        self.tree = Some(tree);
    }

    /// Number of images added since the last [`initialize`](Self::initialize).
    pub fn total_images(&self) -> u32 {
        self.total_images
    }

    /// Number of images that passed through `node` so far.
    pub fn occurrences(&self, node: u32) -> Option<u32> {
        self.images_with_node.get(node as usize).copied()
    }

    /// Count the distinct nodes visited by one image's descriptors.
    pub fn add_image<'a, I>(&mut self, descriptors: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let tree = self
            .tree
            .as_deref()
            .ok_or_else(|| VocabError::InvalidState("initialize must be called before add_image".to_string()))?;

        self.nodes_in_image.clear();
        let nodes_in_image = &mut self.nodes_in_image;
        for descriptor in descriptors {
            tree.find_path_to_leaf(descriptor, &self.distance, |node| {
                nodes_in_image.insert(node.id);
            })?;
        }

        self.total_images += 1;
        for &node in nodes_in_image.iter() {
            self.images_with_node[node as usize] += 1;
        }
        Ok(())
    }

    /// Write `ln(N / N_i)` into every node of the tree.
    ///
    /// Nothing is written if any node was never observed.
    pub fn fixate(&mut self) -> Result<()> {
        let tree = self
            .tree
            .as_deref_mut()
            .ok_or_else(|| VocabError::InvalidState("initialize must be called before fixate".to_string()))?;
        if self.total_images == 0 {
            return Err(VocabError::NoTrainingImages);
        }

        let total = f64::from(self.total_images);
        let mut weights = Vec::with_capacity(self.images_with_node.len());
        for (node, &count) in self.images_with_node.iter().enumerate() {
            if count == 0 {
                return Err(VocabError::UnobservedNode { node: node as u32 });
            }
            weights.push((total / f64::from(count)).ln());
        }

        for (node, weight) in tree.nodes_mut().iter_mut().zip(weights) {
            node.weight = weight;
        }
        info!(images = self.total_images, nodes = self.images_with_node.len(), "fixated node weights");
        Ok(())
    }
}
