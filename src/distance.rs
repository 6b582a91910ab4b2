//! Distance metrics for descriptors.
//!
//! Tree descent and clustering both go through [`PointDistance`], so the same
//! metric must be used to learn a tree and to search it. Otherwise training
//! descriptors may descend into branches they were never clustered into and
//! node weight learning will report unobserved nodes.
//!
//! [`DistanceMetric::L2`] is the default. Centroids are computed as arithmetic
//! means, which is only the right representative for (squared) Euclidean
//! distance; the other metrics are provided for descriptors that are already
//! L2-normalized.

use serde::{Deserialize, Serialize};

const NORM_EPSILON: f32 = 1e-9;

/// Something that measures how far apart two descriptors are.
///
/// Implementations must be symmetric, non-negative and zero for identical inputs.
pub trait PointDistance {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;
}

impl<F> PointDistance for F
where
    F: Fn(&[f32], &[f32]) -> f32,
{
    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self(a, b)
    }
}

/// Built-in distance metrics for dense descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean (L2) distance.
    #[default]
    L2,
    /// Squared Euclidean distance. Same ordering as `L2` without the square root.
    L2Squared,
    /// Cosine distance $1 - \cos(a,b)$.
    Cosine,
}

impl DistanceMetric {
    /// Compute distance between two vectors.
    ///
    /// If dimensions mismatch, this returns `f32::INFINITY` (so it is never selected as a
    /// nearest child).
    #[inline]
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => l2_distance(a, b),
            DistanceMetric::L2Squared => l2_distance_squared(a, b),
            DistanceMetric::Cosine => cosine_distance(a, b),
        }
    }
}

impl PointDistance for DistanceMetric {
    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        DistanceMetric::distance(*self, a, b)
    }
}

/// Dot product of two vectors.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm of a vector.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// L2 distance squared.
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// L2 (Euclidean) distance.
#[inline]
#[must_use]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    l2_distance_squared(a, b).sqrt()
}

/// Cosine distance $1 - \cos(a,b)$, clamped to `[0, 2]`.
///
/// A zero vector is treated as orthogonal to everything (distance 1).
#[inline]
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    let na = norm(a);
    let nb = norm(b);
    if na <= NORM_EPSILON || nb <= NORM_EPSILON {
        return 1.0;
    }
    1.0 - (dot(a, b) / (na * nb)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_matches_pythagoras() {
        let a = [0.0_f32, 0.0];
        let b = [3.0_f32, 4.0];
        assert!((l2_distance(&a, &b) - 5.0).abs() < 1e-6);
        assert!((l2_distance_squared(&a, &b) - 25.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_are_infinitely_far() {
        assert_eq!(DistanceMetric::L2.distance(&[1.0], &[1.0, 2.0]), f32::INFINITY);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 2.0]), f32::INFINITY);
    }

    #[test]
    fn cosine_distance_is_zero_for_parallel() {
        let a = [1.0_f32, 2.0, 3.0];
        let b = [2.0_f32, 4.0, 6.0];
        assert!(cosine_distance(&a, &b).abs() < 1e-6);
        assert!((cosine_distance(&a, &[0.0; 3]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn closures_are_distances() {
        let manhattan = |a: &[f32], b: &[f32]| -> f32 {
            a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
        };
        assert!((manhattan.distance(&[0.0, 0.0], &[1.0, 2.0]) - 3.0).abs() < 1e-6);
    }
}
