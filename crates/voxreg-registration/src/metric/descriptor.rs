//! MIND descriptor pipeline.
//!
//! The MIND (Modality-Independent Neighbourhood Descriptor) of Heinrich
//! et al. (Medical Image Analysis, 2012) encodes the local self-similarity
//! pattern of a volume as one channel per neighbourhood direction. Because
//! the descriptor depends only on intra-image patch distances, comparing
//! MIND channels across modalities reduces multi-modal registration to a
//! sum-of-squared-differences problem.
//!
//! For each offset `o` in the neighbourhood set:
//!
//! 1. `D_o = BoxMean((V − Shift(V, o))², r)`: the mean squared difference
//!    between the patch at `x` and the patch at `x + o`;
//! 2. `W = mean_o(D_o) + ε`: a local variance estimate;
//! 3. `R_o = exp(−D_o / W)`;
//! 4. `M_o = R_o / (max_o R_o + ε)`: per-voxel max normalization, so the
//!    strongest direction is 1 at every voxel.

use voxreg_core::filter::kernels;
use voxreg_core::Volume;

/// Guards the variance and max-normalization denominators.
const EPSILON: f32 = 1e-10;

/// Neighbourhood offset set used to build the descriptor channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborhoodType {
    /// The six axis unit offsets: ±x, ±y, ±z.
    SixConnected,
    /// All 26 non-zero offsets of the 3×3×3 cube.
    TwentySixConnected,
}

impl NeighborhoodType {
    /// Parse a configuration name. Anything mentioning "26" or "twenty"
    /// selects the 26-neighbourhood; everything else falls back to 6.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("26") || lower.contains("twenty") {
            Self::TwentySixConnected
        } else {
            Self::SixConnected
        }
    }

    /// Canonical configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SixConnected => "6-connected",
            Self::TwentySixConnected => "26-connected",
        }
    }

    /// Number of descriptor channels, `|N|`.
    pub fn channel_count(&self) -> usize {
        match self {
            Self::SixConnected => 6,
            Self::TwentySixConnected => 26,
        }
    }

    /// The integer voxel offsets, in channel order.
    pub fn offsets(&self) -> Vec<[i32; 3]> {
        match self {
            Self::SixConnected => vec![
                [1, 0, 0],
                [-1, 0, 0],
                [0, 1, 0],
                [0, -1, 0],
                [0, 0, 1],
                [0, 0, -1],
            ],
            Self::TwentySixConnected => {
                let mut offsets = Vec::with_capacity(26);
                for dz in -1..=1 {
                    for dy in -1..=1 {
                        for dx in -1..=1 {
                            if dx != 0 || dy != 0 || dz != 0 {
                                offsets.push([dx, dy, dz]);
                            }
                        }
                    }
                }
                offsets
            }
        }
    }
}

impl Default for NeighborhoodType {
    fn default() -> Self {
        Self::SixConnected
    }
}

/// Compute the per-direction patch distances `D_o`.
///
/// One volume per offset, where `D_o[x]` is the mean squared intensity
/// difference between the patch of radius `radius` at `x` and the patch at
/// `x + o`. Exposed separately so callers can dump the intermediate stack
/// for visual inspection.
pub fn patch_distances(volume: &Volume, offsets: &[[i32; 3]], radius: usize) -> Vec<Volume> {
    offsets
        .iter()
        .map(|&offset| {
            let shifted = kernels::shift(volume, offset);
            let difference = kernels::subtract(volume, &shifted);
            kernels::box_mean(&kernels::square(&difference), radius)
        })
        .collect()
}

/// Compute the normalized MIND descriptor channels of a volume.
///
/// Returns `|N|` volumes with the same geometry as the input; channel order
/// matches [`NeighborhoodType::offsets`]. Every voxel's maximum across
/// channels is 1 up to the `ε` guard, and all values lie in `(0, 1]`.
pub fn mind_descriptors(volume: &Volume, neighborhood: NeighborhoodType, radius: usize) -> Vec<Volume> {
    let offsets = neighborhood.offsets();
    let dp = patch_distances(volume, &offsets, radius);

    // Local variance estimate: across-direction mean of the patch distances.
    let mut variance = dp[0].data().clone();
    for d in dp.iter().skip(1) {
        variance += d.data();
    }
    let num_directions = offsets.len() as f32;
    variance.mapv_inplace(|sum| sum / num_directions + EPSILON);

    // Raw descriptor: exp(-D_o / W).
    let mut channels: Vec<Volume> = dp
        .iter()
        .map(|d| {
            let mut data = d.data().clone();
            data.zip_mut_with(&variance, |dp_value, &w| {
                *dp_value = (-*dp_value / w).exp();
            });
            volume.with_data(data)
        })
        .collect();

    // Per-voxel max normalization.
    let mut max = channels[0].data().clone();
    for channel in channels.iter().skip(1) {
        max.zip_mut_with(channel.data(), |m, &v| {
            if v > *m {
                *m = v;
            }
        });
    }
    max.mapv_inplace(|m| m + EPSILON);

    for channel in &mut channels {
        channel.data_mut().zip_mut_with(&max, |v, &m| {
            *v /= m;
        });
    }

    channels
}
