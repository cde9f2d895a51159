//! Gaussian smoothing filter.

use ndarray::Array3;

use crate::image::Volume;

/// Gaussian smoothing filter using separable 1D convolutions.
///
/// Sigmas are given in physical units and converted to voxel units through
/// the volume spacing, so smoothing strength is independent of resolution.
pub struct GaussianFilter {
    sigmas: [f64; 3],
    max_kernel_width: usize,
}

impl GaussianFilter {
    /// Create a new Gaussian filter.
    ///
    /// # Arguments
    /// * `sigmas` - Standard deviation per axis in physical units.
    pub fn new(sigmas: [f64; 3]) -> Self {
        Self {
            sigmas,
            max_kernel_width: 32,
        }
    }

    /// Create an isotropic Gaussian filter.
    pub fn isotropic(sigma: f64) -> Self {
        Self::new([sigma, sigma, sigma])
    }

    /// Apply the filter to a volume.
    pub fn apply(&self, volume: &Volume) -> Volume {
        let spacing = *volume.spacing();
        let mut data = volume.data().clone();

        for axis in 0..3 {
            let sigma = self.sigmas[axis];
            if sigma <= 1e-6 {
                continue;
            }

            let pixel_sigma = sigma / spacing[axis];
            let radius = (3.0 * pixel_sigma).ceil() as usize;
            let width = (2 * radius + 1).min(self.max_kernel_width);
            let radius = (width - 1) / 2;

            let kernel = generate_kernel(pixel_sigma, radius);
            data = convolve_axis(&data, &kernel, axis);
        }

        volume.with_data(data)
    }
}

fn generate_kernel(sigma: f64, radius: usize) -> Vec<f64> {
    let two_sigma2 = 2.0 * sigma * sigma;
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    let mut sum = 0.0;
    for i in 0..=(2 * radius) {
        let x = i as f64 - radius as f64;
        let value = (-x * x / two_sigma2).exp();
        kernel.push(value);
        sum += value;
    }
    for value in &mut kernel {
        *value /= sum;
    }
    kernel
}

/// Convolve along a spatial axis (0 = x, 1 = y, 2 = z) with replicated
/// borders.
fn convolve_axis(data: &Array3<f32>, kernel: &[f64], axis: usize) -> Array3<f32> {
    let (sz, sy, sx) = data.dim();
    let extent = [sx, sy, sz][axis];
    let radius = (kernel.len() - 1) / 2;

    let mut output = Array3::zeros((sz, sy, sx));
    for z in 0..sz {
        for y in 0..sy {
            for x in 0..sx {
                let center = [x, y, z][axis] as isize;
                let mut accumulator = 0.0f64;
                for (tap, &weight) in kernel.iter().enumerate() {
                    let offset = tap as isize - radius as isize;
                    let clamped = (center + offset).clamp(0, extent as isize - 1) as usize;
                    let mut index = [x, y, z];
                    index[axis] = clamped;
                    accumulator += weight * data[[index[2], index[1], index[0]]] as f64;
                }
                output[[z, y, x]] = accumulator as f32;
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_is_normalized() {
        let kernel = generate_kernel(1.5, 4);
        let sum: f64 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert_eq!(kernel.len(), 9);
    }

    #[test]
    fn test_constant_volume_unchanged() {
        let mut volume = Volume::zeros([8, 8, 8]);
        volume.data_mut().fill(2.5);
        let smoothed = GaussianFilter::isotropic(1.0).apply(&volume);
        for &v in smoothed.data().iter() {
            assert!((v - 2.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_smoothing_reduces_peak() {
        let mut volume = Volume::zeros([9, 9, 9]);
        volume.set([4, 4, 4], 100.0);
        let smoothed = GaussianFilter::isotropic(1.0).apply(&volume);
        let peak = smoothed.get([4, 4, 4]);
        assert!(peak > 0.0 && peak < 100.0);

        // Mass is approximately preserved away from the borders.
        let total: f32 = smoothed.data().iter().sum();
        assert!((total - 100.0).abs() < 1.0);
    }

    #[test]
    fn test_zero_sigma_is_identity() {
        let mut volume = Volume::zeros([5, 5, 5]);
        volume.set([2, 2, 2], 1.0);
        let smoothed = GaussianFilter::isotropic(0.0).apply(&volume);
        assert_eq!(smoothed.get([2, 2, 2]), 1.0);
    }
}
