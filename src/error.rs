//! Error types for vocabtree.

use thiserror::Error;

/// Errors that can occur while learning, populating or querying a vocabulary tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VocabError {
    /// Invalid parameter value (branch factor, depth, dimension, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation was called before the phase it depends on.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Descriptor length does not match the store or tree dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The same image id was added to the database twice.
    #[error("image {0} is already in the database")]
    DuplicateImage(u32),

    /// Clustering produced no usable clusters at the root.
    #[error("clustering produced no clusters; cannot build a tree from no data")]
    EmptyClustering,

    /// Node weights were fixated without any training image.
    #[error("no training images were added before computing node weights")]
    NoTrainingImages,

    /// A node was never reached by a training image, so its weight is undefined.
    #[error(
        "node {node} was not seen in any training image; lower minimum_points_in_node, \
         add training images or reduce the tree depth"
    )]
    UnobservedNode { node: u32 },

    /// Every descriptor of an image accumulated zero weight.
    #[error("encoded image has zero total weight")]
    ZeroNorm,

    /// The tree's shape disagrees with its own configuration.
    #[error("malformed tree: {0}")]
    MalformedTree(String),

    /// The external feature extractor failed.
    #[error("feature extraction failed: {0}")]
    Extraction(String),
}

pub type Result<T> = std::result::Result<T, VocabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let e = VocabError::DimensionMismatch {
            expected: 64,
            actual: 32,
        };
        assert_eq!(e.to_string(), "dimension mismatch: expected 64, got 32");

        let e = VocabError::UnobservedNode { node: 7 };
        assert!(e.to_string().starts_with("node 7 was not seen"));
    }
}
