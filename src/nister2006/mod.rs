//! Scalable recognition with a vocabulary tree.
//!
//! Node weighting and scoring after Nistér & Stewénius (2006), "Scalable
//! Recognition with a Vocabulary Tree":
//!
//! - [`LearnNodeWeights`]: entropy weight `ln(N / N_i)` per node
//! - [`TermVector`]: unit-length TF-IDF image description
//! - [`RecognitionDatabase`]: inverted index over tree leaves and scoring
//!
//! ## Scoring
//!
//! For unit vectors `q` and `c`, `||q - c||² = 2 - 2 q·c`, and the dot product
//! only needs the nodes both vectors share. Scores fall in `[0, 4]`; lower is
//! more similar.

pub mod database;
pub mod term;
pub mod weights;

pub use database::{EncodingMode, ImageRecord, LeafData, Match, RecognitionDatabase};
pub use term::TermVector;
pub use weights::LearnNodeWeights;
