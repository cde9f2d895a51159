//! Spatial types for physical coordinates.
//!
//! Positions, displacements and orientations live in continuous physical
//! space (millimetres by convention); voxel indices are always ordered
//! `(x, y, z)` regardless of the in-memory array layout.

/// A position in physical space.
pub type Point3 = nalgebra::Point3<f64>;

/// A displacement in physical space.
pub type Vector3 = nalgebra::Vector3<f64>;

/// Physical distance between adjacent voxels along each axis.
pub type Spacing3 = nalgebra::Vector3<f64>;

/// Orientation of the voxel axes: columns are the physical directions of the
/// `x`, `y` and `z` index axes.
pub type Direction3 = nalgebra::Matrix3<f64>;

/// A discrete voxel index, ordered `(x, y, z)`.
pub type Index3 = [usize; 3];
