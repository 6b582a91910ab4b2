//! Inverted-index image database on top of a weighted vocabulary tree.
//!
//! Every image is described by a unit-length [`TermVector`]: each descriptor
//! descends the tree, and every node it passes through (or only the leaf, see
//! [`EncodingMode`]) adds that node's weight to the image's entry for it. The
//! sums are then L2-normalized.
//!
//! Each leaf keeps the list of images that reached it. A query only scores
//! images sharing at least one leaf with it, so its cost follows the number of
//! such candidates rather than the database size.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::term::TermVector;
use crate::distance::{DistanceMetric, PointDistance};
use crate::vocabtree::HierarchicalVocabularyTree;
use crate::{Result, VocabError};

/// Which nodes of a descriptor's path contribute to an image description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodingMode {
    /// Every node from the root to the leaf. Interior nodes act as coarser words.
    #[default]
    PathNodes,
    /// Only the leaf reached by the descriptor.
    LeafOnly,
}

/// Inverted-index entry stored on every leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafData {
    // Record indices in ascending order. Images are added one at a time with
    // increasing indices, so a duplicate can only ever be the last element.
    images: Vec<u32>,
}

impl LeafData {
    /// Indices of the records that reached this leaf.
    pub fn images(&self) -> &[u32] {
        &self.images
    }

    fn register(&mut self, record: u32) {
        if self.images.last() != Some(&record) {
            self.images.push(record);
        }
    }
}

/// An image stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord<P> {
    /// Caller supplied id
    pub image_id: u32,
    /// TF-IDF description of the image
    pub terms: TermVector,
    /// User data attached to the image
    pub payload: P,
}

/// A scored database image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub image_id: u32,
    /// `2 - 2 q·c`; lower is more similar
    pub score: f32,
}

/// Recognition database: image records plus an inverted index in the tree leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionDatabase<P = (), D = DistanceMetric> {
    tree: Option<HierarchicalVocabularyTree<LeafData>>,
    distance: D,
    encoding: EncodingMode,
    images: Vec<ImageRecord<P>>,
    index_of: HashMap<u32, u32>,
}

impl<P, D: PointDistance> RecognitionDatabase<P, D> {
    /// Create a database with no tree. Call [`initialize_tree`](Self::initialize_tree) before use.
    pub fn new(distance: D, encoding: EncodingMode) -> Self {
        Self {
            tree: None,
            distance,
            encoding,
            images: Vec::new(),
            index_of: HashMap::new(),
        }
    }

    /// Take ownership of a weighted tree and start an empty database on it.
    ///
    /// Every leaf gets a fresh inverted-index entry; any previous images are dropped.
    pub fn initialize_tree(&mut self, mut tree: HierarchicalVocabularyTree<LeafData>) -> Result<()> {
        if tree.is_empty() {
            return Err(VocabError::InvalidState("tree has not been learned".to_string()));
        }
        if let Some(node) = tree.nodes().iter().find(|n| !n.has_weight()) {
            return Err(VocabError::InvalidState(format!(
                "node {} has no weight; learn node weights first",
                node.id
            )));
        }

        tree.clear_data();
        let leaves: Vec<u32> = tree.nodes().iter().filter(|n| n.is_leaf()).map(|n| n.id).collect();
        for &leaf in &leaves {
            tree.add_data(leaf, LeafData::default())?;
        }
        info!(nodes = tree.len(), leaves = leaves.len(), "initialized recognition database");

        self.tree = Some(tree);
        self.images.clear();
        self.index_of.clear();
        Ok(())
    }

    pub fn tree(&self) -> Option<&HierarchicalVocabularyTree<LeafData>> {
        self.tree.as_ref()
    }

    pub fn encoding(&self) -> EncodingMode {
        self.encoding
    }

    pub fn distance(&self) -> &D {
        &self.distance
    }

    /// Number of images in the database.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// All image records in insertion order.
    pub fn images(&self) -> &[ImageRecord<P>] {
        &self.images
    }

    /// Look up an image by its caller supplied id.
    pub fn image(&self, image_id: u32) -> Option<&ImageRecord<P>> {
        let index = *self.index_of.get(&image_id)?;
        self.images.get(index as usize)
    }

    /// Ids of the images registered at a leaf.
    pub fn images_at_leaf(&self, leaf: u32) -> Option<Vec<u32>> {
        let data = self.tree.as_ref()?.data(leaf)?;
        Some(data.images().iter().map(|&i| self.images[i as usize].image_id).collect())
    }

    fn learned_tree(&self) -> Result<&HierarchicalVocabularyTree<LeafData>> {
        self.tree
            .as_ref()
            .ok_or_else(|| VocabError::InvalidState("database has no tree; call initialize_tree first".to_string()))
    }

    /// Describe an image without touching the database.
    pub fn encode<'a, I>(&self, descriptors: I) -> Result<TermVector>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        self.describe(self.learned_tree()?, descriptors, |_| {})
    }

    /// Build the TF-IDF vector for `descriptors`, passing every reached leaf to `on_leaf`.
    fn describe<'a, I, F>(&self, tree: &HierarchicalVocabularyTree<LeafData>, descriptors: I, mut on_leaf: F) -> Result<TermVector>
    where
        I: IntoIterator<Item = &'a [f32]>,
        F: FnMut(u32),
    {
        let encoding = self.encoding;
        let mut sums: BTreeMap<u32, f64> = BTreeMap::new();
        for descriptor in descriptors {
            let leaf = tree.find_path_to_leaf(descriptor, &self.distance, |node| {
                if encoding == EncodingMode::PathNodes || node.is_leaf() {
                    *sums.entry(node.id).or_insert(0.0) += node.weight;
                }
            })?;
            on_leaf(leaf);
        }
        TermVector::from_sums(&sums)
    }

    /// Add an image and register it at every leaf its descriptors reach.
    ///
    /// The database is unchanged if encoding fails.
    pub fn add<'a, I>(&mut self, image_id: u32, descriptors: I, payload: P) -> Result<()>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        if self.index_of.contains_key(&image_id) {
            return Err(VocabError::DuplicateImage(image_id));
        }

        let mut leaves = Vec::new();
        let terms = self.describe(self.learned_tree()?, descriptors, |leaf| leaves.push(leaf))?;

        let record = self.images.len() as u32;
        let tree = self
            .tree
            .as_mut()
            .ok_or_else(|| VocabError::InvalidState("database has no tree".to_string()))?;
        for &leaf in &leaves {
            tree.data_mut(leaf)
                .ok_or_else(|| VocabError::MalformedTree(format!("leaf {leaf} has no inverted index entry")))?
                .register(record);
        }

        debug!(image_id, words = terms.len(), descriptors = leaves.len(), "added image");
        self.images.push(ImageRecord {
            image_id,
            terms,
            payload,
        });
        self.index_of.insert(image_id, record);
        Ok(())
    }

    /// Score every image sharing a leaf with the query, best (lowest score) first.
    ///
    /// Returns an empty list when nothing shares a leaf with the query or the
    /// database is empty. Ties keep the order in which candidates were found.
    pub fn query<'a, I>(&self, descriptors: I) -> Result<Vec<Match>>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let tree = self.learned_tree()?;
        if self.images.is_empty() {
            return Ok(Vec::new());
        }

        let mut leaves = Vec::new();
        let query = self.describe(tree, descriptors, |leaf| leaves.push(leaf))?;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for &leaf in &leaves {
            let Some(data) = tree.data(leaf) else { continue };
            for &record in data.images() {
                if seen.insert(record) {
                    candidates.push(record);
                }
            }
        }

        let mut matches: Vec<Match> = candidates
            .into_iter()
            .map(|record| {
                let image = &self.images[record as usize];
                Match {
                    image_id: image.image_id,
                    score: query.distance_l2_norm(&image.terms),
                }
            })
            .collect();
        matches.sort_by(|a, b| a.score.total_cmp(&b.score));

        debug!(candidates = matches.len(), database = self.images.len(), "query scored");
        Ok(matches)
    }

    /// The single best match, if any image shares a leaf with the query.
    pub fn find_best_match<'a, I>(&self, descriptors: I) -> Result<Option<Match>>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        Ok(self.query(descriptors)?.into_iter().next())
    }
}
