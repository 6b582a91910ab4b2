//! Image recognition: learn a vocabulary, add images, find the best match.
//!
//! [`ImageRecognition`] wires the pieces together:
//!
//! ```text
//! training images ──describe──> descriptors ──k-means tree──> vocabulary tree
//!                                     └──────node weights──────────┘
//!                                                                   │
//! add_to_database(id, image) ──describe──> RecognitionDatabase <────┘
//! find_best_match(image)     ──describe──> query ──> ranked ids
//! ```
//!
//! The lifecycle is strictly ordered: [`Phase::Untrained`] until
//! [`learn_description`](ImageRecognition::learn_description) succeeds, then
//! [`Phase::Trained`], then [`Phase::Populated`] after the first image is added.

pub mod traits;

pub use traits::{DescribeImage, PrecomputedFeatures};

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::distance::DistanceMetric;
use crate::nister2006::{EncodingMode, LeafData, LearnNodeWeights, RecognitionDatabase};
use crate::packed::PackedDescriptors;
use crate::partitioning::{KMeans, KMeansParams};
use crate::vocabtree::{HierarchicalVocabularyTree, LearnHierarchicalTree, LearnTreeParams, TreeParams};
use crate::{Result, VocabError};

/// Configuration for [`ImageRecognition`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigImageRecognition {
    /// Shape of the vocabulary tree
    pub tree: TreeParams,

    /// Clustering used at every tree level. `kmeans.metric` is overridden by `distance`
    pub kmeans: KMeansParams,

    /// Tree learning parameters
    pub learn: LearnTreeParams,

    /// Which path nodes contribute to an image description
    pub encoding: EncodingMode,

    /// Descriptor distance for clustering and tree descent
    pub distance: DistanceMetric,
}

impl ConfigImageRecognition {
    pub fn new(branch_factor: usize, maximum_levels: usize) -> Self {
        Self {
            tree: TreeParams::new(branch_factor, maximum_levels),
            kmeans: KMeansParams::default(),
            learn: LearnTreeParams::default(),
            encoding: EncodingMode::default(),
            distance: DistanceMetric::default(),
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.kmeans.seed = Some(seed);
        self
    }
}

/// Where the recognizer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No vocabulary learned yet
    Untrained,
    /// Vocabulary learned, database empty
    Trained,
    /// At least one image added
    Populated,
}

/// A database image matched against a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMatch {
    /// Id given to [`ImageRecognition::add_to_database`]
    pub id: String,
    /// Lower is more similar, in `[0, 4]`
    pub score: f32,
}

/// Vocabulary-tree image recognizer over images of type `I`.
#[derive(Debug)]
pub struct ImageRecognition<I: ?Sized, X> {
    config: ConfigImageRecognition,
    extractor: X,
    database: RecognitionDatabase<(), DistanceMetric>,
    // External id of every database image, indexed by internal image id
    image_ids: Vec<String>,
    phase: Phase,
    // Features of the image currently being processed
    features: PackedDescriptors,
    _image: PhantomData<fn(&I)>,
}

impl<I: ?Sized, X: DescribeImage<I>> ImageRecognition<I, X> {
    pub fn new(config: ConfigImageRecognition, extractor: X) -> Result<Self> {
        config.tree.validate()?;
        let features = PackedDescriptors::new(extractor.dimension())?;
        Ok(Self {
            database: RecognitionDatabase::new(config.distance, config.encoding),
            config,
            extractor,
            image_ids: Vec::new(),
            phase: Phase::Untrained,
            features,
            _image: PhantomData,
        })
    }

    pub fn config(&self) -> &ConfigImageRecognition {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn extractor(&self) -> &X {
        &self.extractor
    }

    pub fn database(&self) -> &RecognitionDatabase<(), DistanceMetric> {
        &self.database
    }

    pub fn tree(&self) -> Option<&HierarchicalVocabularyTree<LeafData>> {
        self.database.tree()
    }

    /// Ids of all images added since the vocabulary was learned.
    pub fn image_ids(&self) -> &[String] {
        &self.image_ids
    }

    /// Learn the vocabulary tree and its node weights from training images.
    ///
    /// Replaces any previous vocabulary and empties the database.
    pub fn learn_description<'a, T>(&mut self, images: T) -> Result<()>
    where
        T: IntoIterator<Item = &'a I>,
        I: 'a,
    {
        self.phase = Phase::Untrained;
        self.image_ids.clear();
        self.database = RecognitionDatabase::new(self.config.distance, self.config.encoding);

        // Features from all images in one array; image k owns offsets[k]..offsets[k + 1]
        let dimension = self.extractor.dimension();
        let mut packed = PackedDescriptors::new(dimension)?;
        let mut offsets = vec![0usize];
        for image in images {
            self.extractor.describe(image, &mut packed)?;
            offsets.push(packed.len());
        }
        info!(
            images = offsets.len() - 1,
            descriptors = packed.len(),
            "extracted training features"
        );

        let mut tree = HierarchicalVocabularyTree::<LeafData>::new(dimension, self.config.tree)?;
        let kmeans = KMeans::new(KMeansParams {
            metric: self.config.distance,
            ..self.config.kmeans.clone()
        })?;
        LearnHierarchicalTree::new(kmeans, self.config.learn).process(&packed, &mut tree)?;

        {
            let mut weights = LearnNodeWeights::new(self.config.distance);
            weights.initialize(&mut tree);
            for window in offsets.windows(2) {
                weights.add_image(packed.iter_range(window[0]..window[1]))?;
            }
            weights.fixate()?;
        }

        self.database.initialize_tree(tree)?;
        self.phase = Phase::Trained;
        Ok(())
    }

    fn extract(&mut self, image: &I) -> Result<()> {
        self.features.clear();
        self.extractor.describe(image, &mut self.features)
    }

    /// Add an image to the database under `id`.
    pub fn add_to_database(&mut self, id: impl Into<String>, image: &I) -> Result<()> {
        if self.phase == Phase::Untrained {
            return Err(VocabError::InvalidState(
                "learn_description must be called before add_to_database".to_string(),
            ));
        }
        self.extract(image)?;

        let index = self.image_ids.len() as u32;
        self.database.add(index, self.features.iter(), ())?;
        self.image_ids.push(id.into());
        self.phase = Phase::Populated;
        Ok(())
    }

    /// Rank database images by similarity to `image`, best first, into `matches`.
    ///
    /// Returns `false` when no database image shares a word with the query.
    pub fn find_best_match(&mut self, image: &I, matches: &mut Vec<ImageMatch>) -> Result<bool> {
        if self.phase == Phase::Untrained {
            return Err(VocabError::InvalidState(
                "learn_description must be called before find_best_match".to_string(),
            ));
        }
        matches.clear();
        self.extract(image)?;
        self.rank(self.features.iter(), matches)
    }

    /// Same ranking as [`find_best_match`](Self::find_best_match) for
    /// descriptors that were already extracted.
    ///
    /// Takes `&self`, so any number of threads can query a populated recognizer at once.
    pub fn match_descriptors<'a, F>(&self, descriptors: F, matches: &mut Vec<ImageMatch>) -> Result<bool>
    where
        F: IntoIterator<Item = &'a [f32]>,
    {
        if self.phase == Phase::Untrained {
            return Err(VocabError::InvalidState(
                "learn_description must be called before match_descriptors".to_string(),
            ));
        }
        matches.clear();
        self.rank(descriptors, matches)
    }

    fn rank<'a, F>(&self, descriptors: F, matches: &mut Vec<ImageMatch>) -> Result<bool>
    where
        F: IntoIterator<Item = &'a [f32]>,
    {
        let found = self.database.query(descriptors)?;
        matches.extend(found.into_iter().map(|m| ImageMatch {
            id: self.image_ids[m.image_id as usize].clone(),
            score: m.score,
        }));
        Ok(!matches.is_empty())
    }
}
