//! Multi-resolution volume pyramid.

use crate::image::Volume;

use super::downsample::DownsampleFilter;
use super::gaussian::GaussianFilter;

/// Multi-resolution volume pyramid.
///
/// Generates a sequence of smoothed and shrunk versions of a volume,
/// ordered coarse to fine, for coarse-to-fine registration.
pub struct MultiResolutionPyramid {
    levels: Vec<Volume>,
}

impl MultiResolutionPyramid {
    /// Create a pyramid from a volume and per-level schedules.
    ///
    /// # Arguments
    /// * `input` - The original full-resolution volume.
    /// * `shrink_factors` - Isotropic shrink factor per level.
    /// * `smoothing_sigmas` - Gaussian sigma per level, in physical units.
    ///
    /// # Panics
    /// Panics if the schedules have different lengths.
    pub fn new(input: &Volume, shrink_factors: &[usize], smoothing_sigmas: &[f64]) -> Self {
        assert_eq!(
            shrink_factors.len(),
            smoothing_sigmas.len(),
            "schedule lengths must match"
        );

        let mut levels = Vec::with_capacity(shrink_factors.len());
        for (&factor, &sigma) in shrink_factors.iter().zip(smoothing_sigmas.iter()) {
            if factor <= 1 && sigma <= 1e-6 {
                levels.push(input.clone());
                continue;
            }

            let smoothed = if sigma > 1e-6 {
                GaussianFilter::isotropic(sigma).apply(input)
            } else {
                input.clone()
            };

            let level = if factor > 1 {
                DownsampleFilter::isotropic(factor).apply(&smoothed)
            } else {
                smoothed
            };
            levels.push(level);
        }

        Self { levels }
    }

    /// Volume at a specific level (0 = coarsest in a descending schedule).
    pub fn level(&self, level: usize) -> &Volume {
        &self.levels[level]
    }

    /// Number of levels.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pyramid_levels() {
        let volume = Volume::zeros([16, 16, 16]);
        let pyramid = MultiResolutionPyramid::new(&volume, &[4, 2, 1], &[2.0, 1.0, 0.0]);

        assert_eq!(pyramid.num_levels(), 3);
        assert_eq!(pyramid.level(0).size(), [4, 4, 4]);
        assert_eq!(pyramid.level(1).size(), [8, 8, 8]);
        assert_eq!(pyramid.level(2).size(), [16, 16, 16]);
    }

    #[test]
    fn test_identity_level_shares_content() {
        let volume = Volume::zeros([8, 8, 8]);
        let pyramid = MultiResolutionPyramid::new(&volume, &[1], &[0.0]);
        assert_eq!(pyramid.level(0).id(), volume.id());
    }
}
