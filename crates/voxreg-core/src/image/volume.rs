//! Volume type with physical metadata and coordinate transformations.
//!
//! A [`Volume`] combines a dense 3D voxel array with the physical-space
//! metadata (origin, spacing, direction) that maps voxel indices to
//! physical coordinates.

use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::Array3;

use crate::spatial::{Direction3, Index3, Point3, Spacing3, Vector3};

static NEXT_VOLUME_ID: AtomicU64 = AtomicU64::new(1);

/// Dense 3D image of 32-bit floats with physical metadata.
///
/// # Coordinate systems
/// * **Index space**: discrete voxel indices, ordered `(x, y, z)`.
/// * **Physical space**: continuous coordinates in physical units.
///
/// The mapping is `p = origin + direction · diag(spacing) · index`.
///
/// Voxel data is stored in `[z, y, x]` memory order; all public index
/// arguments use `(x, y, z)` ordering.
///
/// Every freshly constructed volume carries a unique identity token (see
/// [`Volume::id`]) that downstream caches use to detect image changes
/// without comparing voxel data. Clones share the identity of the original,
/// since their content is the same.
#[derive(Debug, Clone)]
pub struct Volume {
    data: Array3<f32>,
    origin: Point3,
    spacing: Spacing3,
    direction: Direction3,
    inv_direction: Direction3,
    id: u64,
}

impl Volume {
    /// Create a new volume with the given data and metadata.
    ///
    /// # Arguments
    /// * `data` - Voxel data in `[z, y, x]` memory order
    /// * `origin` - Physical coordinate of voxel `(0, 0, 0)`
    /// * `spacing` - Physical distance between adjacent voxels along each axis
    /// * `direction` - Orientation matrix of the index axes
    ///
    /// # Panics
    /// Panics if the direction matrix is not invertible.
    pub fn new(data: Array3<f32>, origin: Point3, spacing: Spacing3, direction: Direction3) -> Self {
        let inv_direction = direction
            .try_inverse()
            .expect("direction matrix must be invertible");
        Self {
            data,
            origin,
            spacing,
            direction,
            inv_direction,
            id: NEXT_VOLUME_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Create a zero-filled volume with default geometry (unit spacing,
    /// zero origin, identity direction).
    pub fn zeros(size: Index3) -> Self {
        Self::new(
            Array3::zeros((size[2], size[1], size[0])),
            Point3::origin(),
            Spacing3::new(1.0, 1.0, 1.0),
            Direction3::identity(),
        )
    }

    /// Create a new volume holding `data` with the same geometry as `self`.
    pub fn with_data(&self, data: Array3<f32>) -> Self {
        debug_assert_eq!(data.dim(), self.data.dim());
        Self::new(data, self.origin, self.spacing, self.direction)
    }

    /// Identity token of this volume.
    ///
    /// Two volumes report the same id only when one is a clone of the other;
    /// any newly built volume gets a fresh token.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Voxel data in `[z, y, x]` memory order.
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Mutable voxel data in `[z, y, x]` memory order.
    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    /// Volume size as `[Sx, Sy, Sz]`.
    pub fn size(&self) -> Index3 {
        let (sz, sy, sx) = self.data.dim();
        [sx, sy, sz]
    }

    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.data.len()
    }

    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing3 {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction3 {
        &self.direction
    }

    /// Voxel value at index `(x, y, z)`.
    pub fn get(&self, index: Index3) -> f32 {
        self.data[[index[2], index[1], index[0]]]
    }

    /// Set the voxel value at index `(x, y, z)`.
    pub fn set(&mut self, index: Index3, value: f32) {
        self.data[[index[2], index[1], index[0]]] = value;
    }

    /// Convert a discrete index to a physical point.
    pub fn index_to_physical(&self, index: Index3) -> Point3 {
        self.continuous_index_to_physical(&Vector3::new(
            index[0] as f64,
            index[1] as f64,
            index[2] as f64,
        ))
    }

    /// Convert a continuous index to a physical point.
    ///
    /// `point = origin + direction · (index ∘ spacing)`
    pub fn continuous_index_to_physical(&self, index: &Vector3) -> Point3 {
        let scaled = Vector3::new(
            index[0] * self.spacing[0],
            index[1] * self.spacing[1],
            index[2] * self.spacing[2],
        );
        self.origin + self.direction * scaled
    }

    /// Convert a physical point to a continuous index.
    ///
    /// `index = (direction⁻¹ · (point − origin)) / spacing`
    pub fn physical_to_continuous_index(&self, point: &Point3) -> Vector3 {
        let rotated = self.inv_direction * (point - self.origin);
        Vector3::new(
            rotated[0] / self.spacing[0],
            rotated[1] / self.spacing[1],
            rotated[2] / self.spacing[2],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_creation() {
        let volume = Volume::zeros([10, 12, 14]);
        assert_eq!(volume.size(), [10, 12, 14]);
        assert_eq!(volume.num_voxels(), 10 * 12 * 14);
    }

    #[test]
    fn test_identity_tokens_are_unique() {
        let a = Volume::zeros([4, 4, 4]);
        let b = Volume::zeros([4, 4, 4]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_index_physical_roundtrip() {
        let volume = Volume::new(
            Array3::zeros((10, 10, 10)),
            Point3::new(10.0, 20.0, 30.0),
            Spacing3::new(2.0, 1.0, 0.5),
            Direction3::identity(),
        );

        let point = volume.index_to_physical([5, 5, 5]);
        assert!((point[0] - 20.0).abs() < 1e-12);
        assert!((point[1] - 25.0).abs() < 1e-12);
        assert!((point[2] - 32.5).abs() < 1e-12);

        let index = volume.physical_to_continuous_index(&point);
        assert!((index[0] - 5.0).abs() < 1e-12);
        assert!((index[1] - 5.0).abs() < 1e-12);
        assert!((index[2] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_get_set_use_xyz_order() {
        let mut volume = Volume::zeros([3, 4, 5]);
        volume.set([2, 1, 0], 7.0);
        assert_eq!(volume.get([2, 1, 0]), 7.0);
        assert_eq!(volume.data()[[0, 1, 2]], 7.0);
    }
}
