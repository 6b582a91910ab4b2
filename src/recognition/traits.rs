//! Boundary with feature extraction.

use crate::packed::PackedDescriptors;
use crate::{Result, VocabError};

/// Turns an image of type `I` into local feature descriptors.
///
/// Detection and description happen outside this crate; implement this for
/// whatever detector produces the descriptors.
pub trait DescribeImage<I: ?Sized> {
    /// Length of every descriptor produced.
    fn dimension(&self) -> usize;

    /// Append the descriptors of `image` to `features`. Order is irrelevant.
    fn describe(&mut self, image: &I, features: &mut PackedDescriptors) -> Result<()>;
}

/// Extractor for images that already are a list of descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecomputedFeatures {
    dimension: usize,
}

impl PrecomputedFeatures {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VocabError::InvalidConfig(
                "descriptor dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self { dimension })
    }
}

impl<R: AsRef<[f32]>> DescribeImage<[R]> for PrecomputedFeatures {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn describe(&mut self, image: &[R], features: &mut PackedDescriptors) -> Result<()> {
        features.reserve(image.len());
        for descriptor in image {
            features.push(descriptor.as_ref())?;
        }
        Ok(())
    }
}

impl DescribeImage<PackedDescriptors> for PrecomputedFeatures {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn describe(&mut self, image: &PackedDescriptors, features: &mut PackedDescriptors) -> Result<()> {
        features.reserve(image.len());
        for descriptor in image {
            features.push(descriptor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_rows_and_checks_dimension() {
        let mut extractor = PrecomputedFeatures::new(2).unwrap();
        let mut features = PackedDescriptors::new(2).unwrap();
        let image = vec![vec![1.0_f32, 2.0], vec![3.0, 4.0]];
        extractor.describe(image.as_slice(), &mut features).unwrap();
        assert_eq!(features.len(), 2);

        let bad = vec![vec![1.0_f32]];
        assert!(extractor.describe(bad.as_slice(), &mut features).is_err());
        assert!(PrecomputedFeatures::new(0).is_err());
    }
}
