//! Downsample filter.

use ndarray::s;

use crate::image::Volume;
use crate::spatial::Spacing3;

/// Downsample filter.
///
/// Reduces the volume size by an integer factor per axis by keeping every
/// Nth voxel. Spacing grows by the same factor; the origin is unchanged
/// since the physical location of voxel `(0, 0, 0)` is preserved.
pub struct DownsampleFilter {
    factors: [usize; 3],
}

impl DownsampleFilter {
    /// Create a new downsample filter.
    ///
    /// # Arguments
    /// * `factors` - Shrink factor per axis (must be >= 1).
    pub fn new(factors: [usize; 3]) -> Self {
        assert!(factors.iter().all(|&f| f >= 1), "shrink factors must be >= 1");
        Self { factors }
    }

    /// Create an isotropic downsample filter.
    pub fn isotropic(factor: usize) -> Self {
        Self::new([factor, factor, factor])
    }

    /// Apply the filter to a volume.
    pub fn apply(&self, volume: &Volume) -> Volume {
        let [fx, fy, fz] = self.factors;
        if fx == 1 && fy == 1 && fz == 1 {
            return volume.clone();
        }

        let data = volume
            .data()
            .slice(s![..;fz, ..;fy, ..;fx])
            .to_owned();
        let spacing = Spacing3::new(
            volume.spacing()[0] * fx as f64,
            volume.spacing()[1] * fy as f64,
            volume.spacing()[2] * fz as f64,
        );

        Volume::new(data, *volume.origin(), spacing, *volume.direction())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downsample_size_and_spacing() {
        let volume = Volume::zeros([10, 10, 10]);
        let small = DownsampleFilter::isotropic(2).apply(&volume);
        assert_eq!(small.size(), [5, 5, 5]);
        assert_eq!(small.spacing()[0], 2.0);
        assert_eq!(small.origin(), volume.origin());
    }

    #[test]
    fn test_downsample_keeps_strided_voxels() {
        let mut volume = Volume::zeros([6, 6, 6]);
        for z in 0..6 {
            for y in 0..6 {
                for x in 0..6 {
                    volume.set([x, y, z], (x + 10 * y + 100 * z) as f32);
                }
            }
        }
        let small = DownsampleFilter::isotropic(3).apply(&volume);
        assert_eq!(small.size(), [2, 2, 2]);
        assert_eq!(small.get([1, 1, 1]), volume.get([3, 3, 3]));
    }

    #[test]
    fn test_unit_factor_is_identity() {
        let volume = Volume::zeros([4, 5, 6]);
        let same = DownsampleFilter::isotropic(1).apply(&volume);
        assert_eq!(same.size(), volume.size());
        assert_eq!(same.id(), volume.id());
    }
}
