//! vocabtree: image retrieval with a hierarchical vocabulary tree.
//!
//! Images are described by sets of local feature descriptors. A tree learned
//! by recursive k-means quantizes each descriptor into "visual words" (tree
//! nodes); every image becomes a sparse, entropy-weighted word histogram kept
//! in an inverted index, and queries are ranked by L2 distance between
//! normalized histograms.
//!
//! - [`packed`]: contiguous descriptor storage
//! - [`partitioning`]: clustering strategies (k-means)
//! - [`vocabtree`]: the tree and its learner
//! - [`nister2006`]: node weights, image descriptions and the database
//! - [`recognition`]: learn / add / find-best-match front end
//!
//! # Critical Nuances
//!
//! ## Greedy descent
//!
//! A descriptor follows the nearest child at every level and never
//! backtracks. Cost is `O(branch_factor × maximum_levels)` per descriptor
//! regardless of database size, but two nearby descriptors that straddle a
//! boundary high in the tree end up in unrelated leaves.
//!
//! ## Train on what you weight
//!
//! Node weights are `ln(N / N_i)`. A node no training image reached has no
//! defined weight, so weights must be learned from the same images (and the
//! same distance metric) the tree was built from.
//!
//! ## Interior nodes are words too
//!
//! By default every node on a descriptor's path contributes to the image
//! description, not only the leaf. Nodes near the root are seen by nearly
//! every image and get weights close to zero, so they matter little; switch
//! to [`nister2006::EncodingMode::LeafOnly`] for the classic flat vocabulary.
//!
//! # Example
//!
//! ```rust
//! use vocabtree::recognition::{ConfigImageRecognition, ImageRecognition, PrecomputedFeatures};
//!
//! let images: Vec<Vec<Vec<f32>>> = vec![
//!     vec![vec![0.0, 0.0], vec![0.1, 0.2]],
//!     vec![vec![9.0, 9.0], vec![9.2, 8.9]],
//! ];
//!
//! let config = ConfigImageRecognition::new(2, 2).with_seed(42);
//! let mut recognizer: ImageRecognition<[Vec<f32>], _> =
//!     ImageRecognition::new(config, PrecomputedFeatures::new(2)?)?;
//!
//! recognizer.learn_description(images.iter().map(Vec::as_slice))?;
//! recognizer.add_to_database("dark", &images[0])?;
//! recognizer.add_to_database("bright", &images[1])?;
//!
//! let mut matches = Vec::new();
//! assert!(recognizer.find_best_match(&images[1], &mut matches)?);
//! assert_eq!(matches[0].id, "bright");
//! # Ok::<(), vocabtree::VocabError>(())
//! ```

pub mod distance;
pub mod nister2006;
pub mod packed;
pub mod partitioning;
pub mod recognition;
pub mod vocabtree;

pub mod error;

// Re-exports
pub use error::{Result, VocabError};
pub use packed::PackedDescriptors;
pub use vocabtree::{HierarchicalVocabularyTree, TreeParams};
