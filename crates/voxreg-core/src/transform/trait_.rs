//! Spatial transform trait.

use crate::spatial::{Point3, Vector3};

/// A parametric spatial transform.
///
/// Transforms map fixed-image physical points into moving-image physical
/// space. The parameter vector is the optimizer's search space; the
/// parameter Jacobian supplies the partial derivatives `∂T/∂qₚ` the metric
/// needs to chain spatial gradients back to parameter space.
///
/// Implementations must be `Send + Sync`: metric evaluation reads
/// `transform_point` concurrently from worker threads while the parameters
/// are held fixed.
pub trait SpatialTransform: Send + Sync {
    /// Number of parameters (6 for rigid, 12 for affine).
    fn parameter_count(&self) -> usize;

    /// Current parameter vector.
    fn parameters(&self) -> Vec<f64>;

    /// Replace the parameter vector.
    ///
    /// # Panics
    /// Panics if `parameters.len()` differs from [`Self::parameter_count`].
    fn set_parameters(&mut self, parameters: &[f64]);

    /// Map a fixed-space point into moving space.
    fn transform_point(&self, point: &Point3) -> Point3;

    /// Partial derivatives of the transformed point with respect to each
    /// parameter, evaluated at the fixed-space `point`.
    ///
    /// Clears `jacobian` and fills it with [`Self::parameter_count`] rows;
    /// row `p` holds `∂T(point)/∂qₚ`.
    fn parameter_jacobian(&self, point: &Point3, jacobian: &mut Vec<Vector3>);
}
