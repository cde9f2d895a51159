//! Fixed-image sample selection.
//!
//! Samples are drawn once per pyramid level and reused for every metric
//! evaluation at that level. They reference the fixed image exclusively;
//! mapping into moving space happens on demand through the current
//! transform.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use voxreg_core::spatial::{Index3, Point3};
use voxreg_core::Volume;

/// Spatial mask predicate: `true` when a physical point is inside.
pub type MaskFn = dyn Fn(&Point3) -> bool + Send + Sync;

/// A fixed-image sample with its pre-fetched descriptor vector.
#[derive(Debug, Clone)]
pub struct SamplePoint {
    /// Physical position in fixed-image space.
    pub fixed_point: Point3,
    /// Voxel index in the fixed image.
    pub fixed_index: Index3,
    /// Fixed-image descriptor values at the index, one per channel.
    pub fixed_descriptor: Vec<f32>,
}

/// Draws fixed-image samples for metric evaluation.
#[derive(Debug, Clone)]
pub struct Sampler {
    /// Fraction of fixed-image voxels to target, in `(0, 1]`.
    pub sampling_percentage: f64,
    /// Stratified (uniform-stride) versus seeded random sampling.
    pub stratified: bool,
    /// Seed for the random strategy.
    pub seed: u64,
    /// Boundary padding in voxels; no sample lies closer to the border.
    pub padding: usize,
}

impl Sampler {
    /// Draw samples from the fixed volume.
    ///
    /// Each accepted sample caches the descriptor vector of `descriptors`
    /// at its index. Points rejected by `mask` are skipped.
    pub fn sample(
        &self,
        fixed: &Volume,
        descriptors: &[Volume],
        mask: Option<&MaskFn>,
    ) -> Vec<SamplePoint> {
        let samples = if self.stratified {
            self.sample_stratified(fixed, descriptors, mask)
        } else {
            self.sample_random(fixed, descriptors, mask)
        };
        debug!(
            strategy = if self.stratified { "stratified" } else { "random" },
            count = samples.len(),
            "drew fixed-image samples"
        );
        samples
    }

    fn target_count(&self, fixed: &Volume) -> usize {
        (fixed.num_voxels() as f64 * self.sampling_percentage) as usize
    }

    fn sample_stratified(
        &self,
        fixed: &Volume,
        descriptors: &[Volume],
        mask: Option<&MaskFn>,
    ) -> Vec<SamplePoint> {
        let size = fixed.size();
        let target = self.target_count(fixed);
        if target == 0 {
            return Vec::new();
        }

        let step = (fixed.num_voxels() as f64 / target as f64).cbrt().max(1.0) as usize;
        let pad = self.padding;

        let mut samples = Vec::with_capacity(target);
        'scan: for z in (pad..size[2].saturating_sub(pad)).step_by(step) {
            for y in (pad..size[1].saturating_sub(pad)).step_by(step) {
                for x in (pad..size[0].saturating_sub(pad)).step_by(step) {
                    if samples.len() >= target {
                        break 'scan;
                    }
                    let index = [x, y, z];
                    let point = fixed.index_to_physical(index);
                    if let Some(mask) = mask {
                        if !mask(&point) {
                            continue;
                        }
                    }
                    samples.push(make_sample(point, index, descriptors));
                }
            }
        }
        samples
    }

    fn sample_random(
        &self,
        fixed: &Volume,
        descriptors: &[Volume],
        mask: Option<&MaskFn>,
    ) -> Vec<SamplePoint> {
        let size = fixed.size();
        let target = self.target_count(fixed);
        let pad = self.padding;
        if target == 0 || size.iter().any(|&s| s <= 2 * pad) {
            return Vec::new();
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut samples = Vec::with_capacity(target);
        let max_attempts = target * 3;
        let mut attempts = 0;

        while samples.len() < target && attempts < max_attempts {
            attempts += 1;
            let index = [
                rng.gen_range(pad..size[0] - pad),
                rng.gen_range(pad..size[1] - pad),
                rng.gen_range(pad..size[2] - pad),
            ];
            let point = fixed.index_to_physical(index);
            if let Some(mask) = mask {
                if !mask(&point) {
                    continue;
                }
            }
            samples.push(make_sample(point, index, descriptors));
        }
        samples
    }
}

fn make_sample(point: Point3, index: Index3, descriptors: &[Volume]) -> SamplePoint {
    let fixed_descriptor = descriptors.iter().map(|d| d.get(index)).collect();
    SamplePoint {
        fixed_point: point,
        fixed_index: index,
        fixed_descriptor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_stack(volume: &Volume) -> Vec<Volume> {
        vec![volume.clone(), volume.clone()]
    }

    fn sampler(stratified: bool, percentage: f64) -> Sampler {
        Sampler {
            sampling_percentage: percentage,
            stratified,
            seed: 121212,
            padding: 2,
        }
    }

    #[test]
    fn test_stratified_respects_padding_and_target() {
        let volume = Volume::zeros([32, 32, 32]);
        let descriptors = descriptor_stack(&volume);
        let samples = sampler(true, 0.1).sample(&volume, &descriptors, None);

        let target = (32.0f64 * 32.0 * 32.0 * 0.1) as usize;
        assert!(!samples.is_empty());
        assert!(samples.len() <= target);
        for sample in &samples {
            for axis in 0..3 {
                assert!(sample.fixed_index[axis] >= 2);
                assert!(sample.fixed_index[axis] < 30);
            }
            assert_eq!(sample.fixed_descriptor.len(), 2);
        }
    }

    #[test]
    fn test_random_is_deterministic_for_fixed_seed() {
        let volume = Volume::zeros([16, 16, 16]);
        let descriptors = descriptor_stack(&volume);
        let a = sampler(false, 0.05).sample(&volume, &descriptors, None);
        let b = sampler(false, 0.05).sample(&volume, &descriptors, None);

        assert_eq!(a.len(), b.len());
        for (left, right) in a.iter().zip(b.iter()) {
            assert_eq!(left.fixed_index, right.fixed_index);
        }
    }

    #[test]
    fn test_mask_restricts_samples() {
        let volume = Volume::zeros([64, 64, 64]);
        let descriptors = descriptor_stack(&volume);

        // A 16^3 cube centered in the volume (unit spacing, zero origin).
        let inside = |p: &Point3| (0..3).all(|axis| p[axis] >= 24.0 && p[axis] < 40.0);
        let mask: Box<MaskFn> = Box::new(inside);

        let samples = Sampler {
            sampling_percentage: 0.2,
            stratified: true,
            seed: 121212,
            padding: 2,
        }
        .sample(&volume, &descriptors, Some(mask.as_ref()));

        assert!(!samples.is_empty());
        for sample in &samples {
            assert!(inside(&sample.fixed_point));
        }
    }

    #[test]
    fn test_random_gives_up_under_restrictive_mask() {
        let volume = Volume::zeros([16, 16, 16]);
        let descriptors = descriptor_stack(&volume);
        let mask: Box<MaskFn> = Box::new(|_: &Point3| false);

        let samples = sampler(false, 0.5).sample(&volume, &descriptors, Some(mask.as_ref()));
        assert!(samples.is_empty());
    }

    #[test]
    fn test_tiny_volume_yields_no_samples() {
        let volume = Volume::zeros([4, 4, 4]);
        let descriptors = descriptor_stack(&volume);
        let samples = sampler(false, 0.5).sample(&volume, &descriptors, None);
        assert!(samples.is_empty());
    }
}
