//! Trilinear interpolation.

use crate::image::Volume;
use crate::spatial::Point3;

use super::trait_::Interpolator;

/// Trilinear interpolator.
///
/// Gathers the eight voxels surrounding the continuous index of a physical
/// point and blends them with per-axis linear weights. Corner indices are
/// clamped to the buffer, so evaluation at the exact boundary is well
/// defined.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl Interpolator for LinearInterpolator {
    fn is_inside(&self, volume: &Volume, point: &Point3) -> bool {
        let index = volume.physical_to_continuous_index(point);
        let size = volume.size();
        (0..3).all(|axis| index[axis] >= 0.0 && index[axis] <= (size[axis] - 1) as f64)
    }

    fn evaluate(&self, volume: &Volume, point: &Point3) -> f64 {
        let index = volume.physical_to_continuous_index(point);
        let size = volume.size();

        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for axis in 0..3 {
            let max = (size[axis] - 1) as f64;
            let clamped = index[axis].clamp(0.0, max);
            let floor = clamped.floor();
            lo[axis] = floor as usize;
            hi[axis] = (floor + 1.0).min(max) as usize;
            frac[axis] = clamped - floor;
        }

        let data = volume.data();
        let sample = |x: usize, y: usize, z: usize| data[[z, y, x]] as f64;

        let v000 = sample(lo[0], lo[1], lo[2]);
        let v100 = sample(hi[0], lo[1], lo[2]);
        let v010 = sample(lo[0], hi[1], lo[2]);
        let v110 = sample(hi[0], hi[1], lo[2]);
        let v001 = sample(lo[0], lo[1], hi[2]);
        let v101 = sample(hi[0], lo[1], hi[2]);
        let v011 = sample(lo[0], hi[1], hi[2]);
        let v111 = sample(hi[0], hi[1], hi[2]);

        // Blend along x, then y, then z.
        let c00 = v000 * (1.0 - frac[0]) + v100 * frac[0];
        let c10 = v010 * (1.0 - frac[0]) + v110 * frac[0];
        let c01 = v001 * (1.0 - frac[0]) + v101 * frac[0];
        let c11 = v011 * (1.0 - frac[0]) + v111 * frac[0];

        let c0 = c00 * (1.0 - frac[1]) + c10 * frac[1];
        let c1 = c01 * (1.0 - frac[1]) + c11 * frac[1];

        c0 * (1.0 - frac[2]) + c1 * frac[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction3, Point3, Spacing3};
    use ndarray::Array3;

    fn ramp_volume() -> Volume {
        // 2x2x2 with value x + 10y + 100z.
        let mut data = Array3::zeros((2, 2, 2));
        for z in 0..2 {
            for y in 0..2 {
                for x in 0..2 {
                    data[[z, y, x]] = (x + 10 * y + 100 * z) as f32;
                }
            }
        }
        Volume::new(
            data,
            Point3::origin(),
            Spacing3::new(1.0, 1.0, 1.0),
            Direction3::identity(),
        )
    }

    #[test]
    fn test_grid_points_are_exact() {
        let volume = ramp_volume();
        let interpolator = LinearInterpolator::new();

        assert_eq!(interpolator.evaluate(&volume, &Point3::new(0.0, 0.0, 0.0)), 0.0);
        assert_eq!(interpolator.evaluate(&volume, &Point3::new(1.0, 0.0, 0.0)), 1.0);
        assert_eq!(interpolator.evaluate(&volume, &Point3::new(0.0, 1.0, 0.0)), 10.0);
        assert_eq!(interpolator.evaluate(&volume, &Point3::new(0.0, 0.0, 1.0)), 100.0);
    }

    #[test]
    fn test_center_is_corner_average() {
        let volume = ramp_volume();
        let interpolator = LinearInterpolator::new();

        let center = interpolator.evaluate(&volume, &Point3::new(0.5, 0.5, 0.5));
        let expected = (0.0 + 1.0 + 10.0 + 11.0 + 100.0 + 101.0 + 110.0 + 111.0) / 8.0;
        assert!((center - expected).abs() < 1e-9);
    }

    #[test]
    fn test_is_inside_boundary() {
        let volume = ramp_volume();
        let interpolator = LinearInterpolator::new();

        assert!(interpolator.is_inside(&volume, &Point3::new(0.0, 0.0, 0.0)));
        assert!(interpolator.is_inside(&volume, &Point3::new(1.0, 1.0, 1.0)));
        assert!(!interpolator.is_inside(&volume, &Point3::new(1.01, 0.5, 0.5)));
        assert!(!interpolator.is_inside(&volume, &Point3::new(-0.01, 0.5, 0.5)));
    }

    #[test]
    fn test_respects_spacing() {
        let data = Array3::from_shape_fn((1, 1, 4), |(_, _, x)| x as f32);
        let volume = Volume::new(
            data,
            Point3::origin(),
            Spacing3::new(2.0, 1.0, 1.0),
            Direction3::identity(),
        );
        let interpolator = LinearInterpolator::new();

        // Physical x = 3.0 is continuous index 1.5.
        let value = interpolator.evaluate(&volume, &Point3::new(3.0, 0.0, 0.0));
        assert!((value - 1.5).abs() < 1e-9);
    }
}
