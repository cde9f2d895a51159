//! Affine transform.

use crate::spatial::{Direction3, Point3, Vector3};

use super::rigid::RigidTransform;
use super::trait_::SpatialTransform;

/// Affine transform with a fixed center.
///
/// `T(x) = A(x − c) + c + t` with a full 3×3 matrix `A`.
///
/// Parameters are ordered row-major matrix first, then translation:
/// `[a00, a01, a02, a10, …, a22, tx, ty, tz]` (12 parameters).
#[derive(Debug, Clone)]
pub struct AffineTransform {
    matrix: Direction3,
    translation: Vector3,
    center: Point3,
}

impl AffineTransform {
    /// Create an affine transform from a matrix and a translation.
    pub fn new(matrix: Direction3, translation: Vector3, center: Point3) -> Self {
        Self {
            matrix,
            translation,
            center,
        }
    }

    /// Identity transform centered at `center`.
    pub fn identity(center: Point3) -> Self {
        Self::new(Direction3::identity(), Vector3::zeros(), center)
    }

    /// Seed an affine transform from a converged rigid stage.
    ///
    /// The affine matrix starts at the rigid rotation and the translation
    /// and center carry over, so the affine search begins exactly where the
    /// rigid fit ended.
    pub fn from_rigid(rigid: &RigidTransform) -> Self {
        Self::new(*rigid.matrix(), *rigid.translation(), *rigid.center())
    }

    pub fn matrix(&self) -> &Direction3 {
        &self.matrix
    }

    pub fn translation(&self) -> &Vector3 {
        &self.translation
    }

    pub fn center(&self) -> &Point3 {
        &self.center
    }
}

impl SpatialTransform for AffineTransform {
    fn parameter_count(&self) -> usize {
        12
    }

    fn parameters(&self) -> Vec<f64> {
        let mut parameters = Vec::with_capacity(12);
        for row in 0..3 {
            for col in 0..3 {
                parameters.push(self.matrix[(row, col)]);
            }
        }
        parameters.extend_from_slice(&[
            self.translation[0],
            self.translation[1],
            self.translation[2],
        ]);
        parameters
    }

    fn set_parameters(&mut self, parameters: &[f64]) {
        assert_eq!(parameters.len(), 12, "affine transform expects 12 parameters");
        for row in 0..3 {
            for col in 0..3 {
                self.matrix[(row, col)] = parameters[3 * row + col];
            }
        }
        self.translation = Vector3::new(parameters[9], parameters[10], parameters[11]);
    }

    fn transform_point(&self, point: &Point3) -> Point3 {
        self.center + self.matrix * (point - self.center) + self.translation
    }

    fn parameter_jacobian(&self, point: &Point3, jacobian: &mut Vec<Vector3>) {
        jacobian.clear();
        let centered = point - self.center;
        // ∂T/∂a_rc has (x − c)_c in component r and zeros elsewhere.
        for row in 0..3 {
            for col in 0..3 {
                let mut partial = Vector3::zeros();
                partial[row] = centered[col];
                jacobian.push(partial);
            }
        }
        jacobian.push(Vector3::x());
        jacobian.push(Vector3::y());
        jacobian.push(Vector3::z());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_roundtrips_parameters() {
        let transform = AffineTransform::identity(Point3::origin());
        let parameters = transform.parameters();
        assert_eq!(parameters.len(), 12);
        assert_relative_eq!(parameters[0], 1.0);
        assert_relative_eq!(parameters[4], 1.0);
        assert_relative_eq!(parameters[8], 1.0);
        assert!(parameters[9..].iter().all(|&t| t == 0.0));
    }

    #[test]
    fn test_anisotropic_scaling() {
        let mut transform = AffineTransform::identity(Point3::origin());
        let mut parameters = transform.parameters();
        parameters[0] = 1.1; // scale x
        transform.set_parameters(&parameters);

        let mapped = transform.transform_point(&Point3::new(2.0, 3.0, 4.0));
        assert_relative_eq!(mapped[0], 2.2);
        assert_relative_eq!(mapped[1], 3.0);
        assert_relative_eq!(mapped[2], 4.0);
    }

    #[test]
    fn test_from_rigid_matches_rigid_mapping() {
        let mut rigid = RigidTransform::identity(Point3::new(1.0, 2.0, 3.0));
        rigid.set_parameters(&[0.2, -0.1, 0.4, 5.0, -3.0, 1.0]);
        let affine = AffineTransform::from_rigid(&rigid);

        let point = Point3::new(-2.0, 4.0, 0.0);
        let via_rigid = rigid.transform_point(&point);
        let via_affine = affine.transform_point(&point);
        for axis in 0..3 {
            assert_relative_eq!(via_rigid[axis], via_affine[axis], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let mut transform = AffineTransform::identity(Point3::new(0.5, -0.5, 1.0));
        let mut params = transform.parameters();
        params[1] = 0.2;
        params[3] = -0.1;
        params[10] = 2.0;
        transform.set_parameters(&params);

        let point = Point3::new(3.0, -1.0, 2.0);
        let mut jacobian = Vec::new();
        transform.parameter_jacobian(&point, &mut jacobian);
        assert_eq!(jacobian.len(), 12);

        let h = 1e-6;
        for p in 0..12 {
            let mut plus = params.clone();
            plus[p] += h;
            let mut minus = params.clone();
            minus[p] -= h;

            let mut t = transform.clone();
            t.set_parameters(&plus);
            let fp = t.transform_point(&point);
            t.set_parameters(&minus);
            let fm = t.transform_point(&point);

            for axis in 0..3 {
                let numeric = (fp[axis] - fm[axis]) / (2.0 * h);
                assert_relative_eq!(jacobian[p][axis], numeric, epsilon = 1e-6);
            }
        }
    }
}
