//! Sparse TF-IDF descriptions of images.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Result, VocabError};

/// Unit-length sparse vector over tree nodes, sorted by node id.
///
/// Missing nodes are implicitly zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermVector {
    entries: Vec<(u32, f32)>,
}

impl TermVector {
    /// L2-normalize accumulated per-node weight sums.
    ///
    /// Zero sums are dropped. Fails with [`VocabError::ZeroNorm`] if nothing
    /// is left, since a zero vector cannot be compared with the L2 score.
    pub fn from_sums(sums: &BTreeMap<u32, f64>) -> Result<Self> {
        let norm = sums.values().map(|s| s * s).sum::<f64>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(VocabError::ZeroNorm);
        }

        let entries = sums
            .iter()
            .filter(|&(_, &sum)| sum != 0.0)
            .map(|(&node, &sum)| (node, (sum / norm) as f32))
            .collect();
        Ok(Self { entries })
    }

    /// Number of non-zero entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value stored for `node`, if non-zero.
    pub fn get(&self, node: u32) -> Option<f32> {
        self.entries
            .binary_search_by_key(&node, |&(n, _)| n)
            .ok()
            .map(|i| self.entries[i].1)
    }

    /// `(node, value)` pairs in ascending node order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn norm(&self) -> f32 {
        self.entries.iter().map(|&(_, v)| v * v).sum::<f32>().sqrt()
    }

    /// Squared L2 distance between two unit vectors, `2 - 2 q·c`.
    ///
    /// Only nodes present in both vectors contribute, and only where the
    /// candidate's value is non-negative. 0 means identical, 4 opposite.
    pub fn distance_l2_norm(&self, candidate: &TermVector) -> f32 {
        let (a, b) = (&self.entries, &candidate.entries);
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0f32;
        while i < a.len() && j < b.len() {
            match a[i].0.cmp(&b[j].0) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    if b[j].1 >= 0.0 {
                        sum += a[i].1 * b[j].1;
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        2.0 - 2.0 * sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vector(pairs: &[(u32, f64)]) -> TermVector {
        let sums: BTreeMap<u32, f64> = pairs.iter().copied().collect();
        TermVector::from_sums(&sums).unwrap()
    }

    #[test]
    fn normalizes_to_unit_length() {
        let v = vector(&[(3, 3.0), (1, 4.0), (7, 0.0)]);
        assert_eq!(v.len(), 2);
        assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(v.get(1).unwrap(), 0.8, epsilon = 1e-6);
        assert_relative_eq!(v.get(3).unwrap(), 0.6, epsilon = 1e-6);
        assert_eq!(v.get(7), None);
        assert_eq!(v.iter().map(|(n, _)| n).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn zero_sums_cannot_be_normalized() {
        assert_eq!(TermVector::from_sums(&BTreeMap::new()), Err(VocabError::ZeroNorm));
        let zeros: BTreeMap<u32, f64> = [(0, 0.0), (4, 0.0)].into_iter().collect();
        assert_eq!(TermVector::from_sums(&zeros), Err(VocabError::ZeroNorm));
    }

    #[test]
    fn score_ranges_from_identical_to_disjoint() {
        let a = vector(&[(1, 1.0), (2, 2.0)]);
        let b = vector(&[(5, 1.0)]);
        let c = vector(&[(2, 1.0), (5, 1.0)]);

        assert_relative_eq!(a.distance_l2_norm(&a), 0.0, epsilon = 1e-6);
        assert_relative_eq!(a.distance_l2_norm(&b), 2.0);
        let ac = a.distance_l2_norm(&c);
        assert!(ac > 0.0 && ac < 2.0);
        assert_relative_eq!(ac, c.distance_l2_norm(&a), epsilon = 1e-6);
    }

    #[test]
    fn negative_candidate_entries_are_ignored() {
        let q = vector(&[(1, 1.0)]);
        let c = vector(&[(1, -1.0)]);
        assert_relative_eq!(q.distance_l2_norm(&c), 2.0);
    }
}
