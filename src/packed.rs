//! Contiguous storage for fixed-dimension descriptors.
//!
//! All descriptors live back to back in a single `Vec<f32>` (SoA-style, the
//! same layout the k-means and tree code index into), so appending millions
//! of descriptors costs one growing allocation instead of one per descriptor.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{Result, VocabError};

/// Append-only packed array of descriptors with a fixed dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedDescriptors {
    dimension: usize,
    data: Vec<f32>,
}

impl PackedDescriptors {
    /// Create an empty store for descriptors of length `dimension`.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VocabError::InvalidConfig(
                "descriptor dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    /// Build a store from a list of rows. All rows must share the same length.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let dimension = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut packed = Self::new(dimension)?;
        packed.reserve(rows.len());
        for row in rows {
            packed.push(row.as_ref())?;
        }
        Ok(packed)
    }

    /// Length of every descriptor in the store.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of descriptors stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reserve room for `additional` more descriptors.
    pub fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional * self.dimension);
    }

    /// Copy a descriptor onto the end of the store.
    pub fn push(&mut self, descriptor: &[f32]) -> Result<()> {
        if descriptor.len() != self.dimension {
            return Err(VocabError::DimensionMismatch {
                expected: self.dimension,
                actual: descriptor.len(),
            });
        }
        self.data.extend_from_slice(descriptor);
        Ok(())
    }

    /// Borrow descriptor `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[inline]
    pub fn get(&self, index: usize) -> &[f32] {
        let start = index * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// Copy descriptor `index` into `dst`, which must be exactly `dimension` long.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()` or `dst` has the wrong length.
    pub fn copy_to(&self, index: usize, dst: &mut [f32]) {
        dst.copy_from_slice(self.get(index));
    }

    /// Iterate over all descriptors in insertion order.
    pub fn iter(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dimension)
    }

    /// Iterate over the descriptors whose indices fall in `range`.
    ///
    /// # Panics
    ///
    /// Panics if the range extends past `self.len()`.
    pub fn iter_range(&self, range: Range<usize>) -> std::slice::ChunksExact<'_, f32> {
        let start = range.start * self.dimension;
        let end = range.end * self.dimension;
        self.data[start..end].chunks_exact(self.dimension)
    }

    /// Flat view of the underlying storage.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Remove every descriptor but keep the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl<'a> IntoIterator for &'a PackedDescriptors {
    type Item = &'a [f32];
    type IntoIter = std::slice::ChunksExact<'a, f32>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
