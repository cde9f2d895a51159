//! Elementwise and neighbourhood image kernels.
//!
//! These are the primitive operations of the descriptor pipeline: shifted
//! resampling, pointwise arithmetic, box-mean patch averaging and the
//! finite-difference spatial gradient. All of them preserve the input
//! geometry (size, spacing, origin, direction).

use ndarray::Array3;

use crate::image::Volume;
use crate::interpolation::{Interpolator, LinearInterpolator};
use crate::spatial::Vector3;

/// Resample `volume` translated by an integer voxel offset.
///
/// The output voxel at index `i` holds the input sampled at the physical
/// point `p(i) − spacing ∘ offset` with trilinear interpolation; points
/// outside the input buffer produce `0`. The translation is applied in
/// physical coordinates, so the operation stays correct for oblique
/// direction matrices.
pub fn shift(volume: &Volume, offset: [i32; 3]) -> Volume {
    let interpolator = LinearInterpolator::new();
    let spacing = volume.spacing();
    let delta = Vector3::new(
        offset[0] as f64 * spacing[0],
        offset[1] as f64 * spacing[1],
        offset[2] as f64 * spacing[2],
    );

    let [sx, sy, sz] = volume.size();
    let mut data = Array3::zeros((sz, sy, sx));
    for z in 0..sz {
        for y in 0..sy {
            for x in 0..sx {
                let point = volume.index_to_physical([x, y, z]) - delta;
                if interpolator.is_inside(volume, &point) {
                    data[[z, y, x]] = interpolator.evaluate(volume, &point) as f32;
                }
            }
        }
    }
    volume.with_data(data)
}

/// Pointwise `a − b`.
pub fn subtract(a: &Volume, b: &Volume) -> Volume {
    debug_assert_eq!(a.size(), b.size());
    a.with_data(a.data() - b.data())
}

/// Pointwise `a + b`.
pub fn add(a: &Volume, b: &Volume) -> Volume {
    debug_assert_eq!(a.size(), b.size());
    a.with_data(a.data() + b.data())
}

/// Pointwise `a²`.
pub fn square(a: &Volume) -> Volume {
    a.with_data(a.data().mapv(|v| v * v))
}

/// Pointwise `s · a`.
pub fn scale(a: &Volume, s: f32) -> Volume {
    a.with_data(a.data().mapv(|v| v * s))
}

/// Mean filter over the axis-aligned cube of side `2·radius + 1`.
///
/// Voxels outside the buffer are excluded from both the sum and the count,
/// so border patches average over their in-buffer portion only.
pub fn box_mean(volume: &Volume, radius: usize) -> Volume {
    let [sx, sy, sz] = volume.size();
    let r = radius as isize;
    let src = volume.data();
    let mut data = Array3::zeros((sz, sy, sx));

    for z in 0..sz as isize {
        let z0 = (z - r).max(0) as usize;
        let z1 = ((z + r) as usize).min(sz - 1);
        for y in 0..sy as isize {
            let y0 = (y - r).max(0) as usize;
            let y1 = ((y + r) as usize).min(sy - 1);
            for x in 0..sx as isize {
                let x0 = (x - r).max(0) as usize;
                let x1 = ((x + r) as usize).min(sx - 1);

                let mut sum = 0.0f64;
                for wz in z0..=z1 {
                    for wy in y0..=y1 {
                        for wx in x0..=x1 {
                            sum += src[[wz, wy, wx]] as f64;
                        }
                    }
                }
                let count = (z1 - z0 + 1) * (y1 - y0 + 1) * (x1 - x0 + 1);
                data[[z as usize, y as usize, x as usize]] = (sum / count as f64) as f32;
            }
        }
    }
    volume.with_data(data)
}

/// Spatial gradient in physical units.
///
/// Returns one volume per axis holding `∂V/∂x`, `∂V/∂y`, `∂V/∂z`: central
/// differences in the interior, forward/backward differences at the
/// borders, each divided by the spacing of its axis.
pub fn gradient(volume: &Volume) -> [Volume; 3] {
    let [sx, sy, sz] = volume.size();
    let src = volume.data();
    let spacing = volume.spacing();

    let mut components = [
        Array3::zeros((sz, sy, sx)),
        Array3::zeros((sz, sy, sx)),
        Array3::zeros((sz, sy, sx)),
    ];

    let diff = |center: usize, extent: usize| -> (usize, usize, f64) {
        if extent == 1 {
            (center, center, 1.0)
        } else if center == 0 {
            (0, 1, 1.0)
        } else if center == extent - 1 {
            (extent - 2, extent - 1, 1.0)
        } else {
            (center - 1, center + 1, 2.0)
        }
    };

    for z in 0..sz {
        for y in 0..sy {
            for x in 0..sx {
                let (xl, xh, dx) = diff(x, sx);
                let (yl, yh, dy) = diff(y, sy);
                let (zl, zh, dz) = diff(z, sz);

                components[0][[z, y, x]] =
                    ((src[[z, y, xh]] - src[[z, y, xl]]) as f64 / (dx * spacing[0])) as f32;
                components[1][[z, y, x]] =
                    ((src[[z, yh, x]] - src[[z, yl, x]]) as f64 / (dy * spacing[1])) as f32;
                components[2][[z, y, x]] =
                    ((src[[zh, y, x]] - src[[zl, y, x]]) as f64 / (dz * spacing[2])) as f32;
            }
        }
    }

    let [gx, gy, gz] = components;
    [
        volume.with_data(gx),
        volume.with_data(gy),
        volume.with_data(gz),
    ]
}
