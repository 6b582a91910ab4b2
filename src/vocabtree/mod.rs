//! Hierarchical vocabulary tree.
//!
//! A fixed-branching, fixed-depth tree over descriptor space. Every non-root
//! node owns a mean descriptor describing its region; a descriptor is
//! quantized by greedily descending to the child with the closest mean.
//!
//! ```text
//!                      root (no mean)
//!            /            |            \
//!        n1 (mean)     n2 (mean)     n3 (mean)      level 1
//!        /   \          /   \          |
//!      n4    n5       n6    n7        n8            level 2 (leaves)
//! ```
//!
//! Descent costs `O(branch_factor × maximum_levels)` distance evaluations and
//! never backtracks, so it is not guaranteed to find the globally closest
//! leaf. Ties go to the first child in branch order.
//!
//! Node ids equal their index in the node array; the root is always id 0.
//! Siblings are appended as a contiguous block by the learner, so their means
//! sit next to each other in the packed description store.
//!
//! Leaves can carry arbitrary data of type `L` (see [`HierarchicalVocabularyTree::add_data`]).

pub mod learn;

pub use learn::{LearnHierarchicalTree, LearnTreeParams};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::distance::PointDistance;
use crate::packed::PackedDescriptors;
use crate::{Result, VocabError};

/// Weight of a node before weight learning has run.
pub const UNSET_WEIGHT: f64 = -1.0;

/// Index of the root node.
pub const ROOT: u32 = 0;

/// Shape of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum number of children per node
    pub branch_factor: usize,

    /// Maximum number of levels below the root
    pub maximum_levels: usize,
}

impl TreeParams {
    pub fn new(branch_factor: usize, maximum_levels: usize) -> Self {
        Self {
            branch_factor,
            maximum_levels,
        }
    }

    /// Ensure both values have been set to something usable.
    pub fn validate(&self) -> Result<()> {
        if self.branch_factor == 0 {
            return Err(VocabError::InvalidConfig(
                "branch_factor must be greater than 0".to_string(),
            ));
        }
        if self.maximum_levels == 0 {
            return Err(VocabError::InvalidConfig(
                "maximum_levels must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Node in the vocabulary tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique id, equal to the node's index in the tree
    pub id: u32,
    /// Parent node. `None` only for the root
    pub parent: Option<u32>,
    /// Position among the parent's children
    pub branch: u32,
    /// Index of the mean descriptor. `None` only for the root
    pub description: Option<u32>,
    /// Child node ids in branch order. Empty for leaves
    pub children: SmallVec<[u32; 8]>,
    /// Index of the data attached to this node, if any
    pub data: Option<u32>,
    /// How informative passing through this node is. [`UNSET_WEIGHT`] until learned
    pub weight: f64,
}

impl Node {
    fn root() -> Self {
        Self {
            id: ROOT,
            parent: None,
            branch: 0,
            description: None,
            children: SmallVec::new(),
            data: None,
            weight: UNSET_WEIGHT,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// True once weight learning has assigned a weight.
    #[inline]
    pub fn has_weight(&self) -> bool {
        self.weight >= 0.0
    }
}

/// Summary of a tree's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Total number of nodes, root included
    pub nodes: usize,
    /// Nodes without children
    pub leaves: usize,
    /// Deepest level reached (root is level 0)
    pub depth: usize,
}

/// Hierarchical vocabulary tree with data of type `L` attached to nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchicalVocabularyTree<L> {
    params: TreeParams,
    // Mean descriptors for every non-root node
    descriptions: PackedDescriptors,
    // nodes[0] is the root
    nodes: Vec<Node>,
    data: Vec<L>,
}

impl<L> HierarchicalVocabularyTree<L> {
    /// Create a tree holding only the root.
    ///
    /// `params` is not validated here; [`check_config`](Self::check_config) runs
    /// when the tree is learned.
    pub fn new(dimension: usize, params: TreeParams) -> Result<Self> {
        Ok(Self {
            params,
            descriptions: PackedDescriptors::new(dimension)?,
            nodes: vec![Node::root()],
            data: Vec::new(),
        })
    }

    #[inline]
    pub fn params(&self) -> TreeParams {
        self.params
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.descriptions.dimension()
    }

    /// Number of nodes, root included.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root exists.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    #[inline]
    pub fn root(&self) -> &Node {
        &self.nodes[ROOT as usize]
    }

    #[inline]
    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Mean descriptor of a node. `None` for the root or an unknown id.
    pub fn mean(&self, id: u32) -> Option<&[f32]> {
        let description = self.node(id)?.description?;
        Some(self.descriptions.get(description as usize))
    }

    /// Ensure the tree has a valid configuration.
    pub fn check_config(&self) -> Result<()> {
        self.params.validate()
    }

    /// Drop every node but the root and all attached data. Configuration is kept.
    pub fn reset(&mut self) {
        self.descriptions.clear();
        self.nodes.clear();
        self.nodes.push(Node::root());
        self.data.clear();
    }

    /// Append a child to `parent` and return its id.
    ///
    /// `branch` must equal the parent's current child count, so children are
    /// always added left to right without gaps, and stay below `branch_factor`.
    /// A parent carrying leaf data cannot get children.
    pub fn add_node(&mut self, parent: u32, branch: u32, mean: &[f32]) -> Result<u32> {
        let parent_node = self
            .node(parent)
            .ok_or_else(|| VocabError::MalformedTree(format!("parent node {parent} does not exist")))?;
        if parent_node.data.is_some() {
            return Err(VocabError::MalformedTree(format!(
                "node {parent} carries leaf data and cannot get children"
            )));
        }
        if branch as usize >= self.params.branch_factor {
            return Err(VocabError::MalformedTree(format!(
                "branch {branch} exceeds the branch factor {}",
                self.params.branch_factor
            )));
        }
        let child_count = parent_node.children.len();
        if branch as usize != child_count {
            return Err(VocabError::MalformedTree(format!(
                "branch {branch} added to node {parent} which has {child_count} children"
            )));
        }

        let description = self.descriptions.len() as u32;
        self.descriptions.push(mean)?;

        let id = self.nodes.len() as u32;
        self.nodes.push(Node {
            id,
            parent: Some(parent),
            branch,
            description: Some(description),
            children: SmallVec::new(),
            data: None,
            weight: UNSET_WEIGHT,
        });
        self.nodes[parent as usize].children.push(id);
        Ok(id)
    }

    /// Descend from the root to the leaf that `point` falls into.
    pub fn find_leaf<D>(&self, point: &[f32], distance: &D) -> Result<u32>
    where
        D: PointDistance + ?Sized,
    {
        self.find_path_to_leaf(point, distance, |_| {})
    }

    /// Same descent as [`find_leaf`](Self::find_leaf), calling `visit` on every
    /// node along the way, root first and leaf last.
    ///
    /// Returns the leaf id. Fails with [`VocabError::MalformedTree`] if the
    /// descent passes `maximum_levels` without reaching a leaf.
    pub fn find_path_to_leaf<D, F>(&self, point: &[f32], distance: &D, mut visit: F) -> Result<u32>
    where
        D: PointDistance + ?Sized,
        F: FnMut(&Node),
    {
        if point.len() != self.dimension() {
            return Err(VocabError::DimensionMismatch {
                expected: self.dimension(),
                actual: point.len(),
            });
        }

        let mut node = self.root();
        let mut level = 0;
        loop {
            visit(node);
            if node.is_leaf() {
                return Ok(node.id);
            }
            if level >= self.params.maximum_levels {
                return Err(VocabError::MalformedTree(format!(
                    "maximum depth {} exceeded searching for a leaf",
                    self.params.maximum_levels
                )));
            }

            let mut best = node.children[0];
            let mut best_distance = f32::INFINITY;
            for &child in &node.children {
                let d = distance.distance(point, self.mean_unchecked(child));
                if d < best_distance {
                    best_distance = d;
                    best = child;
                }
            }

            node = &self.nodes[best as usize];
            level += 1;
        }
    }

    #[inline]
    fn mean_unchecked(&self, child: u32) -> &[f32] {
        // Only the root lacks a description and it is never anyone's child.
        let description = self.nodes[child as usize].description.unwrap_or(0);
        self.descriptions.get(description as usize)
    }

    /// Visit every node except the root, parents before children and siblings
    /// in branch order.
    pub fn traverse_depth_first<F>(&self, mut op: F)
    where
        F: FnMut(&Node),
    {
        // (node, next child to visit)
        let mut stack: Vec<(u32, usize)> = Vec::with_capacity(self.params.maximum_levels + 1);
        stack.push((ROOT, 0));

        while let Some(top) = stack.last_mut() {
            let node = &self.nodes[top.0 as usize];

            // No more children here, go back to the parent
            if top.1 >= node.children.len() {
                stack.pop();
                continue;
            }

            let child = node.children[top.1];
            top.1 += 1;

            let child_node = &self.nodes[child as usize];
            op(child_node);
            if !child_node.is_leaf() {
                stack.push((child, 0));
            }
        }
    }

    /// Attach `data` to a leaf and return its index in the data list.
    pub fn add_data(&mut self, id: u32, data: L) -> Result<u32> {
        let index = self.data.len() as u32;
        let node = self
            .nodes
            .get_mut(id as usize)
            .ok_or_else(|| VocabError::MalformedTree(format!("node {id} does not exist")))?;
        if !node.is_leaf() {
            return Err(VocabError::MalformedTree(format!("node {id} is not a leaf")));
        }
        if node.data.is_some() {
            return Err(VocabError::MalformedTree(format!("node {id} already has data")));
        }
        node.data = Some(index);
        self.data.push(data);
        Ok(index)
    }

    /// Data attached to a node.
    pub fn data(&self, id: u32) -> Option<&L> {
        let index = self.node(id)?.data?;
        self.data.get(index as usize)
    }

    pub fn data_mut(&mut self, id: u32) -> Option<&mut L> {
        let index = self.nodes.get(id as usize)?.data?;
        self.data.get_mut(index as usize)
    }

    /// Detach all node data, leaving the structure and weights untouched.
    pub fn clear_data(&mut self) {
        self.data.clear();
        for node in &mut self.nodes {
            node.data = None;
        }
    }

    /// Re-type the tree's data, dropping whatever was attached.
    pub fn with_data_type<M>(self) -> HierarchicalVocabularyTree<M> {
        let mut nodes = self.nodes;
        for node in &mut nodes {
            node.data = None;
        }
        HierarchicalVocabularyTree {
            params: self.params,
            descriptions: self.descriptions,
            nodes,
            data: Vec::new(),
        }
    }

    pub fn stats(&self) -> TreeStats {
        let mut leaves = 0;
        let mut depth = 0;
        let mut stack = vec![(ROOT, 0usize)];
        while let Some((id, level)) = stack.pop() {
            let node = &self.nodes[id as usize];
            depth = depth.max(level);
            if node.is_leaf() {
                leaves += 1;
            }
            stack.extend(node.children.iter().map(|&c| (c, level + 1)));
        }
        TreeStats {
            nodes: self.nodes.len(),
            leaves,
            depth,
        }
    }
}
